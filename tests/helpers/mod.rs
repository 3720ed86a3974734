#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};

use rusqlite::Connection;
use stylist::auth::{issue_token, Audience, Claims, HmacTokenVerifier, TokenVerifier};
use stylist::candidate::{CandidateImage, CANDIDATE_SIZE};
use stylist::config::{AuthMode, RateLimitsConfig, StylistConfig};
use stylist::db;
use stylist::identity::{IdentityError, IdentityProvider};
use stylist::ratelimit::RateLimiter;
use stylist::scoring::{ScoreError, Scorer};
use stylist::server::{self, AppState};
use stylist::storage::LocalObjectStore;

pub const SECRET: &str = "integration-secret";
pub const ISSUER: &str = "https://issuer.test";
pub const AUDIENCE: &str = "stylist-tests";

/// A 224x224 candidate filled with one color.
pub fn solid(rgb: [u8; 3]) -> CandidateImage {
    CandidateImage::from_image(&image::DynamicImage::ImageRgb8(RgbImage::from_pixel(
        CANDIDATE_SIZE,
        CANDIDATE_SIZE,
        Rgb(rgb),
    )))
}

/// PNG bytes of a small image filled with one color.
pub fn png_bytes(rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 16, Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Scores a candidate by looking up the color of its top-left pixel.
/// Unknown colors score 0. Counts how many images it has scored.
pub struct ColorScorer {
    scores: HashMap<[u8; 3], f32>,
    pub calls: AtomicUsize,
}

impl ColorScorer {
    pub fn new(scores: &[([u8; 3], f32)]) -> Self {
        Self {
            scores: scores.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Scorer for ColorScorer {
    fn score(&self, image: &CandidateImage, _prompt: &str) -> Result<f32, ScoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Rgb(rgb) = *image.pixels().get_pixel(0, 0);
        Ok(self.scores.get(&rgb).copied().unwrap_or(0.0))
    }
}

/// Scores by the red channel, and remembers every prompt it was given.
#[derive(Default)]
pub struct RedScorer {
    pub prompts: Mutex<Vec<String>>,
}

impl Scorer for RedScorer {
    fn score(&self, image: &CandidateImage, prompt: &str) -> Result<f32, ScoreError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(f32::from(image.pixels().get_pixel(0, 0)[0]))
    }
}

pub struct FailingScorer;

impl Scorer for FailingScorer {
    fn score(&self, _image: &CandidateImage, _prompt: &str) -> Result<f32, ScoreError> {
        Err(ScoreError::Inference(anyhow::anyhow!("model unavailable")))
    }
}

/// Returns one score fewer than it was asked for.
pub struct ShortScorer;

impl Scorer for ShortScorer {
    fn score(&self, _image: &CandidateImage, _prompt: &str) -> Result<f32, ScoreError> {
        Ok(1.0)
    }

    fn score_batch(&self, images: &[CandidateImage], _prompt: &str) -> Result<Vec<f32>, ScoreError> {
        Ok(vec![1.0; images.len().saturating_sub(1)])
    }
}

/// Identity provider that accepts everything and echoes the call back.
pub struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<Value, IdentityError> {
        if email == "taken@example.com" {
            return Err(IdentityError::Rejected {
                kind: "UsernameExistsException".into(),
                message: "User already exists".into(),
            });
        }
        Ok(json!({ "UserConfirmed": false, "UserSub": format!("sub-{email}") }))
    }

    async fn confirm_sign_up(&self, _email: &str, _code: &str) -> Result<Value, IdentityError> {
        Ok(json!({}))
    }

    async fn initiate_auth(&self, email: &str, _password: &str) -> Result<Value, IdentityError> {
        Ok(json!({ "AuthenticationResult": { "IdToken": token_for(email) } }))
    }
}

/// A valid bearer token for `email`, good for an hour.
pub fn token_for(email: &str) -> String {
    let claims = Claims {
        iss: ISSUER.into(),
        aud: Audience::One(AUDIENCE.into()),
        exp: chrono::Utc::now().timestamp() + 3600,
        sub: Some(format!("sub-{email}")),
        email: Some(email.into()),
    };
    issue_token(&claims, SECRET.as_bytes()).unwrap()
}

/// Test config with rate limiting off unless `limits` is given.
pub fn test_config(limits: Option<RateLimitsConfig>) -> StylistConfig {
    let mut config = StylistConfig::default();
    config.auth.mode = AuthMode::Hmac;
    config.auth.secret = SECRET.into();
    config.auth.issuer = ISSUER.into();
    config.auth.audience = AUDIENCE.into();
    config.storage.signing_key = "signing-key".into();
    config.rate_limits = limits.unwrap_or(RateLimitsConfig {
        enabled: false,
        ..RateLimitsConfig::default()
    });
    config
}

/// A server running on an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub catalog: Arc<Mutex<Connection>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn upload(&self, email: &str, filename: &str, bytes: Vec<u8>) -> reqwest::Response {
        self.upload_with_token(&token_for(email), filename, bytes).await
    }

    pub async fn upload_with_token(
        &self,
        token: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/png")
            .unwrap();
        // send the filename verbatim so `#`, `%` and `?` reach the server as typed
        let form = reqwest::multipart::Form::new()
            .percent_encode_noop()
            .part("image", part);
        self.client
            .post(self.url("/upload"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    pub async fn predict(&self, email: &str, prompt: &str) -> reqwest::Response {
        self.client
            .post(self.url("/predict"))
            .bearer_auth(token_for(email))
            .form(&[("user_prompt", prompt)])
            .send()
            .await
            .unwrap()
    }
}

/// Start the full router over `scorer` with in-memory catalog and a temp object store.
pub async fn spawn_server(scorer: Arc<dyn Scorer>, config: StylistConfig) -> TestServer {
    let verifier = HmacTokenVerifier::from_config(&config.auth).unwrap();
    spawn_server_with(scorer, config, Arc::new(verifier)).await
}

/// Like [`spawn_server`], with a caller-supplied token verifier.
pub async fn spawn_server_with(
    scorer: Arc<dyn Scorer>,
    mut config: StylistConfig,
    verifier: Arc<dyn TokenVerifier>,
) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    config.server.public_url = base_url.clone();

    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(
        dir.path().join("objects"),
        config.storage.signing_key.as_bytes(),
        &base_url,
    );
    let catalog = Arc::new(Mutex::new(db::open_memory_database().unwrap()));

    let state = AppState {
        scorer,
        store: Arc::new(store),
        catalog: Arc::clone(&catalog),
        verifier,
        identity: Arc::new(FakeIdentity),
        limiter: Arc::new(RateLimiter::new(config.rate_limits.clone())),
        config: Arc::new(config),
    };

    let app = server::router(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url,
        client: reqwest::Client::new(),
        catalog,
        _dir: dir,
    }
}
