//! Bearer-token verification.
//!
//! Two [`TokenVerifier`]s are available, chosen by `auth.mode`:
//!
//! - [`JwksTokenVerifier`] checks RS256 ID tokens against the keys the issuer
//!   publishes at its JWKS endpoint. This is what the user pool behind
//!   `/login` hands out.
//! - [`HmacTokenVerifier`] checks HS256 tokens against a shared secret.
//!
//! Both validate signature, issuer, audience and expiry, and require an
//! `email` claim, which becomes the request principal.

use std::collections::HashMap;

use anyhow::Context;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AuthConfig, AuthMode};

const MAX_TOKEN_LEN: usize = 8192;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingHeader,
    #[error("authorization header is not a bearer token")]
    MalformedHeader,
    #[error("token is malformed: {0}")]
    MalformedToken(String),
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token was signed with an unknown key: {0}")]
    UnknownKey(String),
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token issuer does not match")]
    WrongIssuer,
    #[error("token audience does not match")]
    WrongAudience,
    #[error("token has expired")]
    Expired,
    #[error("token has no email claim")]
    MissingEmail,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidIssuer => Self::WrongIssuer,
            ErrorKind::InvalidAudience => Self::WrongAudience,
            ErrorKind::InvalidAlgorithm => Self::UnsupportedAlgorithm(err.to_string()),
            _ => Self::MalformedToken(err.to_string()),
        }
    }
}

/// The verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub subject: Option<String>,
}

/// `aud` may be a single string or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Claims {
    fn into_principal(self) -> Result<Principal, AuthError> {
        let email = self.email.ok_or(AuthError::MissingEmail)?;
        Ok(Principal {
            email,
            subject: self.sub,
        })
    }
}

/// Verifies a bearer token and returns who it belongs to.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Build the verifier selected by `auth.mode`. `jwks` fetches the key set.
pub async fn create_verifier(config: &AuthConfig) -> anyhow::Result<Box<dyn TokenVerifier>> {
    match config.mode {
        AuthMode::Jwks => Ok(Box::new(JwksTokenVerifier::from_config(config).await?)),
        AuthMode::Hmac => Ok(Box::new(HmacTokenVerifier::from_config(config)?)),
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

fn validation(algorithm: Algorithm, issuer: &str, audience: &str) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);
    validation.leeway = 0;
    validation
}

fn check_length(token: &str) -> Result<(), AuthError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(AuthError::MalformedToken("token exceeds max length".into()));
    }
    Ok(())
}

/// RS256 verification against a JSON Web Key Set, keyed by `kid`.
pub struct JwksTokenVerifier {
    keys: HashMap<String, DecodingKey>,
    validation: Validation,
}

impl JwksTokenVerifier {
    /// Keep every key in `jwks` that has a `kid` and decodes as an RSA key.
    pub fn from_jwks(jwks: &JwkSet, issuer: &str, audience: &str) -> anyhow::Result<Self> {
        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                tracing::warn!("skipping jwk without kid");
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(e) => tracing::warn!(kid = %kid, error = %e, "skipping unusable jwk"),
            }
        }
        anyhow::ensure!(!keys.is_empty(), "key set contains no usable signing keys");

        Ok(Self {
            keys,
            validation: validation(Algorithm::RS256, issuer, audience),
        })
    }

    /// Fetch the key set from `url` once.
    pub async fn fetch(url: &str, issuer: &str, audience: &str) -> anyhow::Result<Self> {
        let jwks: JwkSet = reqwest::get(url)
            .await
            .with_context(|| format!("failed to fetch JWKS from {url}"))?
            .error_for_status()
            .with_context(|| format!("JWKS endpoint {url} returned an error"))?
            .json()
            .await
            .context("failed to parse JWKS")?;

        let verifier = Self::from_jwks(&jwks, issuer, audience)?;
        tracing::info!(url, keys = verifier.keys.len(), "JWKS loaded");
        Ok(verifier)
    }

    pub async fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !config.issuer.is_empty(),
            "auth.issuer is empty; set it in config.toml or STYLIST_AUTH_ISSUER"
        );
        Self::fetch(&config.resolved_jwks_url(), &config.issuer, &config.audience).await
    }
}

impl TokenVerifier for JwksTokenVerifier {
    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        check_length(token)?;
        let header = jsonwebtoken::decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::MalformedToken("token header has no kid".into()))?;
        let key = self.keys.get(&kid).ok_or(AuthError::UnknownKey(kid))?;

        let data = jsonwebtoken::decode::<Claims>(token, key, &self.validation)?;
        data.claims.into_principal()
    }
}

/// HS256 verification against a shared secret.
pub struct HmacTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl HmacTokenVerifier {
    pub fn new(secret: &[u8], issuer: &str, audience: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: validation(Algorithm::HS256, issuer, audience),
        }
    }

    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !config.secret.is_empty(),
            "auth.secret is empty; set it in config.toml or STYLIST_AUTH_SECRET"
        );
        Ok(Self::new(
            config.secret.as_bytes(),
            &config.issuer,
            &config.audience,
        ))
    }
}

impl TokenVerifier for HmacTokenVerifier {
    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        check_length(token)?;
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)?;
        data.claims.into_principal()
    }
}

/// Sign `claims` as an HS256 JWT.
pub fn issue_token(claims: &Claims, secret: &[u8]) -> Result<String, AuthError> {
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )?)
}
