use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StylistConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub identity: IdentityConfig,
    pub rate_limits: RateLimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Base URL clients use to reach this server; presigned URLs are built on it.
    pub public_url: String,
    /// Origins allowed by CORS. `"*"` allows any origin.
    pub cors_allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub name: String,
    pub model_dir: String,
    pub prompt_template: String,
    pub batch_size: usize,
    pub intra_threads: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub root: String,
    pub catalog_db: String,
    pub signing_key: String,
    pub presign_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Shared secret for `hmac` mode.
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Overrides `{issuer}/.well-known/jwks.json` in `jwks` mode.
    pub jwks_url: Option<String>,
}

/// How bearer tokens are verified.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// RS256 tokens checked against the issuer's published JWKS.
    #[default]
    Jwks,
    /// HS256 tokens checked against `auth.secret`.
    Hmac,
}

impl AuthConfig {
    pub fn resolved_jwks_url(&self) -> String {
        match &self.jwks_url {
            Some(url) => url.clone(),
            None => format!("{}/.well-known/jwks.json", self.issuer.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    pub region: String,
    pub client_id: String,
    /// Overrides the regional Cognito endpoint (used for local stacks).
    pub endpoint: Option<String>,
}

/// A quota of `requests` per `per_secs` seconds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Quota {
    pub requests: u32,
    pub per_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub enabled: bool,
    pub default: Quota,
    /// Per-route quotas keyed by the route path (e.g. `"/predict"`).
    pub routes: HashMap<String, Quota>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            log_level: "info".into(),
            public_url: "http://127.0.0.1:5000".into(),
            cors_allowed_origins: vec!["*".into()],
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let model_dir = default_stylist_dir()
            .join("models")
            .join("clip-vit-base-patch32")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "clip".into(),
            name: "openai/clip-vit-base-patch32".into(),
            model_dir,
            prompt_template: crate::scoring::DEFAULT_PROMPT_TEMPLATE.into(),
            batch_size: 16,
            intra_threads: 4,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_stylist_dir();
        Self {
            root: dir.join("objects").to_string_lossy().into_owned(),
            catalog_db: dir.join("catalog.db").to_string_lossy().into_owned(),
            signing_key: String::new(),
            presign_ttl_secs: 3600,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            client_id: String::new(),
            endpoint: None,
        }
    }
}

impl Quota {
    pub const fn per_minute(requests: u32) -> Self {
        Self {
            requests,
            per_secs: 60,
        }
    }

    pub const fn per_hour(requests: u32) -> Self {
        Self {
            requests,
            per_secs: 3600,
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        let mut routes = HashMap::new();
        routes.insert("/".to_string(), Quota::per_minute(5));
        for route in ["/signup", "/confirm", "/login", "/upload", "/predict"] {
            routes.insert(route.to_string(), Quota::per_minute(2));
        }
        routes.insert("/images".to_string(), Quota::per_minute(10));
        routes.insert("/objects/{*key}".to_string(), Quota::per_minute(120));
        Self {
            enabled: true,
            default: Quota::per_hour(10),
            routes,
        }
    }
}

impl RateLimitsConfig {
    /// Quota for a route, falling back to the default quota.
    pub fn quota_for(&self, route: &str) -> Quota {
        self.routes.get(route).copied().unwrap_or(self.default)
    }
}

/// Returns `~/.stylist/`
pub fn default_stylist_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stylist")
}

/// Returns the default config file path: `~/.stylist/config.toml`
pub fn default_config_path() -> PathBuf {
    default_stylist_dir().join("config.toml")
}

impl StylistConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StylistConfig::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `STYLIST_*` environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("STYLIST_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("STYLIST_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("STYLIST_PORT") {
            self.server.port = val
                .parse()
                .with_context(|| format!("STYLIST_PORT is not a valid port: {val}"))?;
        }
        if let Ok(val) = std::env::var("STYLIST_PUBLIC_URL") {
            self.server.public_url = val;
        }
        if let Ok(val) = std::env::var("STYLIST_MODEL_DIR") {
            self.model.model_dir = val;
        }
        if let Ok(val) = std::env::var("STYLIST_STORAGE_ROOT") {
            self.storage.root = val;
        }
        if let Ok(val) = std::env::var("STYLIST_CATALOG_DB") {
            self.storage.catalog_db = val;
        }
        if let Ok(val) = std::env::var("STYLIST_SIGNING_KEY") {
            self.storage.signing_key = val;
        }
        if let Ok(val) = std::env::var("STYLIST_AUTH_MODE") {
            self.auth.mode = match val.to_ascii_lowercase().as_str() {
                "jwks" => AuthMode::Jwks,
                "hmac" => AuthMode::Hmac,
                _ => anyhow::bail!("STYLIST_AUTH_MODE must be `jwks` or `hmac`, got {val}"),
            };
        }
        if let Ok(val) = std::env::var("STYLIST_AUTH_JWKS_URL") {
            self.auth.jwks_url = Some(val);
        }
        if let Ok(val) = std::env::var("STYLIST_AUTH_SECRET") {
            self.auth.secret = val;
        }
        if let Ok(val) = std::env::var("STYLIST_AUTH_ISSUER") {
            self.auth.issuer = val;
        }
        if let Ok(val) = std::env::var("STYLIST_AUTH_AUDIENCE") {
            self.auth.audience = val;
        }
        if let Ok(val) = std::env::var("STYLIST_COGNITO_REGION") {
            self.identity.region = val;
        }
        if let Ok(val) = std::env::var("STYLIST_COGNITO_CLIENT_ID") {
            self.identity.client_id = val;
        }
        Ok(())
    }

    pub fn resolved_model_dir(&self) -> PathBuf {
        expand_tilde(&self.model.model_dir)
    }

    pub fn resolved_storage_root(&self) -> PathBuf {
        expand_tilde(&self.storage.root)
    }

    pub fn resolved_catalog_db(&self) -> PathBuf {
        expand_tilde(&self.storage.catalog_db)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
