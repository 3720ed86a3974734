//! Pass-through calls to the user-pool identity provider.
//!
//! Sign-up, confirmation and login are forwarded unchanged; the provider's JSON
//! response is handed back to the caller as-is.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::IdentityConfig;

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider refused the request (existing user, bad code, bad password...).
    #[error("{kind}: {message}")]
    Rejected { kind: String, message: String },
    #[error("identity provider returned HTTP {status}")]
    Unexpected { status: u16 },
    #[error("identity provider request failed")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Value, IdentityError>;

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<Value, IdentityError>;

    /// Username/password login; the response carries the issued tokens.
    async fn initiate_auth(&self, email: &str, password: &str) -> Result<Value, IdentityError>;
}

/// Cognito user-pool client speaking the JSON 1.1 API.
///
/// These operations are public client calls keyed by the app client id, so no
/// request signing is involved.
pub struct CognitoIdentityProvider {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
}

impl CognitoIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://cognito-idp.{}.amazonaws.com/", config.region));
        Self {
            http: reqwest::Client::new(),
            endpoint,
            client_id: config.client_id.clone(),
        }
    }

    async fn call(&self, operation: &str, body: Value) -> Result<Value, IdentityError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let payload: Value = response.json().await.unwrap_or(Value::Null);
        match rejection(&payload) {
            Some((kind, message)) if status.is_client_error() => {
                tracing::warn!(operation, %kind, "identity provider rejected request");
                Err(IdentityError::Rejected { kind, message })
            }
            _ => Err(IdentityError::Unexpected {
                status: status.as_u16(),
            }),
        }
    }
}

/// Pull `(kind, message)` from a Cognito error body.
fn rejection(payload: &Value) -> Option<(String, String)> {
    let kind = payload.get("__type")?.as_str()?;
    // "__type" may carry a namespace: "prefix#UsernameExistsException"
    let kind = kind.rsplit('#').next().unwrap_or(kind).to_string();
    let message = payload
        .get("message")
        .or_else(|| payload.get("Message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((kind, message))
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Value, IdentityError> {
        self.call(
            "SignUp",
            json!({
                "ClientId": self.client_id,
                "Username": email,
                "Password": password,
                "UserAttributes": [{ "Name": "email", "Value": email }],
            }),
        )
        .await
    }

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<Value, IdentityError> {
        self.call(
            "ConfirmSignUp",
            json!({
                "ClientId": self.client_id,
                "Username": email,
                "ConfirmationCode": code,
            }),
        )
        .await
    }

    async fn initiate_auth(&self, email: &str, password: &str) -> Result<Value, IdentityError> {
        self.call(
            "InitiateAuth",
            json!({
                "ClientId": self.client_id,
                "AuthFlow": "USER_PASSWORD_AUTH",
                "AuthParameters": { "USERNAME": email, "PASSWORD": password },
            }),
        )
        .await
    }
}
