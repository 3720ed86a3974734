//! Route handlers.
//!
//! Identity routes forward to the [`IdentityProvider`](crate::identity::IdentityProvider).
//! `/upload` and `/predict` authenticate the bearer token first; catalog access
//! and inference run on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::auth::{bearer_token, AuthError, Principal};
use crate::candidate::CandidateImage;
use crate::catalog::{self, CatalogItem, IMAGE_ITEM_TYPE};
use crate::outfit;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Confirmation {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct PredictForm {
    pub user_prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct PresignedQuery {
    pub expires: i64,
    pub signature: String,
}

pub async fn home() -> &'static str {
    "Hello, World!"
}

pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<Credentials>,
) -> Result<Json<Value>, ApiError> {
    let response = state.identity.sign_up(&form.email, &form.password).await?;
    tracing::info!(email = %form.email, "user signed up");
    Ok(Json(json!({
        "message": "User created successfully!",
        "response": response,
    })))
}

pub async fn confirm(
    State(state): State<AppState>,
    Form(form): Form<Confirmation>,
) -> Result<Json<Value>, ApiError> {
    let response = state.identity.confirm_sign_up(&form.email, &form.code).await?;
    tracing::info!(email = %form.email, "user confirmed");
    Ok(Json(json!({
        "message": "User confirmed successfully!",
        "response": response,
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<Credentials>,
) -> Result<Json<Value>, ApiError> {
    let response = state.identity.initiate_auth(&form.email, &form.password).await?;
    Ok(Json(json!({
        "message": "User logged in successfully!",
        "response": response,
    })))
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let principal = authenticate(&state, &headers)?;

    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("image field has no filename".into()))?;
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read image: {e}")))?;
        image = Some((filename, content_type, bytes));
        break;
    }

    let (filename, content_type, bytes) =
        image.ok_or_else(|| ApiError::BadRequest("missing image field".into()))?;
    if image::guess_format(&bytes).is_err() {
        return Err(ApiError::BadRequest(format!("{filename} is not a supported image")));
    }

    let key = format!("{}/{}", principal.email, filename);
    state.store.put(&key, &bytes, &content_type).await?;

    let item = CatalogItem::new_image(&principal.email, &key);
    let db = Arc::clone(&state.catalog);
    let record = item.clone();
    let recorded = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("catalog lock poisoned: {e}"))?;
        catalog::append_item(&conn, &record)
    })
    .await
    .map_err(ApiError::from_join)
    .and_then(|res| res.map_err(ApiError::from));

    // an object without a catalog record would block every retry with 409
    if let Err(err) = recorded {
        if let Err(cleanup) = state.store.delete(&key).await {
            tracing::error!(key = %key, error = %cleanup, "failed to remove orphaned object");
        }
        return Err(err);
    }

    tracing::info!(
        owner = %principal.email,
        key = %key,
        item_id = %item.item_id,
        size = bytes.len(),
        "image uploaded"
    );

    Ok(Json(json!({
        "message": "Image uploaded successfully!",
        "item": item,
    })))
}

pub async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<PredictForm>,
) -> Result<Json<Value>, ApiError> {
    let principal = authenticate(&state, &headers)?;
    let prompt = form.user_prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("user_prompt must not be empty".into()));
    }

    // 1. Owner's images from the catalog
    let db = Arc::clone(&state.catalog);
    let owner = principal.email.clone();
    let items = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("catalog lock poisoned: {e}"))?;
        catalog::list_items(&conn, &owner, IMAGE_ITEM_TYPE)
    })
    .await
    .map_err(ApiError::from_join)??;

    // 2. Fetch bytes
    let mut encoded = Vec::with_capacity(items.len());
    for item in &items {
        let object = state.store.get(&item.storage_key).await?;
        encoded.push((item.storage_key.clone(), object.bytes));
    }

    // 3. Decode and select (CPU-heavy → spawn_blocking)
    let scorer = Arc::clone(&state.scorer);
    let candidates = encoded.len();
    let winner = tokio::task::spawn_blocking(move || -> Result<CandidateImage, ApiError> {
        let images = encoded
            .iter()
            .map(|(key, bytes)| {
                CandidateImage::decode(bytes).map_err(|source| ApiError::UnreadableImage {
                    key: key.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        outfit::select_outfit(scorer.as_ref(), &prompt, images)?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("selection returned no image")))
    })
    .await
    .map_err(ApiError::from_join)??;

    let jpeg = winner
        .to_jpeg()
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("jpeg encoding failed")))?;

    tracing::info!(owner = %principal.email, candidates, "outfit selected");

    Ok(Json(json!({ "image": STANDARD.encode(jpeg) })))
}

/// Serve an object through a presigned URL.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PresignedQuery>,
) -> Result<Response, ApiError> {
    state
        .store
        .verify_presigned(&key, query.expires, &query.signature)?;
    let object = state.store.get(&key).await?;

    let content_type = HeaderValue::from_str(&object.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], Bytes::from(object.bytes)).into_response())
}

/// Presigned GET URL for one of the caller's items, valid for the configured TTL.
fn presign(state: &AppState, item: &CatalogItem) -> Result<String, ApiError> {
    let ttl = Duration::from_secs(state.config.storage.presign_ttl_secs);
    Ok(state.store.presigned_get(&item.storage_key, ttl)?)
}

/// List the caller's uploaded images with presigned URLs.
pub async fn list_images(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let principal = authenticate(&state, &headers)?;

    let db = Arc::clone(&state.catalog);
    let owner = principal.email.clone();
    let items = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("catalog lock poisoned: {e}"))?;
        catalog::list_items(&conn, &owner, IMAGE_ITEM_TYPE)
    })
    .await
    .map_err(ApiError::from_join)??;

    let images = items
        .iter()
        .map(|item| {
            Ok(json!({
                "item_id": item.item_id,
                "key": item.storage_key,
                "uploaded_at": item.uploaded_at,
                "url": presign(&state, item)?,
            }))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Json(json!({ "images": images })))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let header = match headers.get(header::AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::MalformedHeader)?),
        None => None,
    };
    let token = bearer_token(header)?;
    Ok(state.verifier.verify(token)?)
}
