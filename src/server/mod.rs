//! HTTP service.
//!
//! [`serve`] loads the model and opens the catalog and object store once at
//! startup, then serves the routes built by [`router`] until ctrl-c.

pub mod error;
pub mod handlers;
pub mod middleware;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use rusqlite::Connection;

use crate::auth::{self, TokenVerifier};
use crate::config::StylistConfig;
use crate::db;
use crate::identity::{CognitoIdentityProvider, IdentityProvider};
use crate::ratelimit::RateLimiter;
use crate::scoring::{self, Scorer};
use crate::storage::{LocalObjectStore, ObjectStore};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub scorer: Arc<dyn Scorer>,
    pub store: Arc<dyn ObjectStore>,
    pub catalog: Arc<Mutex<Connection>>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub identity: Arc<dyn IdentityProvider>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<StylistConfig>,
}

/// Open the catalog and store, load the scorer, and build the collaborators.
async fn setup_shared_state(config: StylistConfig) -> Result<AppState> {
    let db_path = config.resolved_catalog_db();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "catalog ready");

    anyhow::ensure!(
        !config.storage.signing_key.is_empty(),
        "storage.signing_key is empty; set it in config.toml or STYLIST_SIGNING_KEY"
    );
    let root = config.resolved_storage_root();
    std::fs::create_dir_all(&root)
        .with_context(|| format!("failed to create storage root {}", root.display()))?;
    let store = LocalObjectStore::new(
        root,
        config.storage.signing_key.as_bytes(),
        &config.server.public_url,
    );
    tracing::info!(root = %store.root().display(), "object store ready");

    let scorer: Arc<dyn Scorer> = Arc::from(scoring::create_scorer(&config)?);
    tracing::info!(provider = %config.model.provider, "scorer ready");

    let verifier: Arc<dyn TokenVerifier> = Arc::from(auth::create_verifier(&config.auth).await?);
    tracing::info!(mode = ?config.auth.mode, "token verifier ready");
    let identity = CognitoIdentityProvider::new(&config.identity);
    let limiter = RateLimiter::new(config.rate_limits.clone());

    Ok(AppState {
        scorer,
        store: Arc::new(store),
        catalog: Arc::new(Mutex::new(conn)),
        verifier,
        identity: Arc::new(identity),
        limiter: Arc::new(limiter),
        config: Arc::new(config),
    })
}

/// All routes, rate limited per matched route and wrapped in CORS handling.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::home))
        .route("/signup", post(handlers::signup))
        .route("/confirm", post(handlers::confirm))
        .route("/login", post(handlers::login))
        .route("/upload", post(handlers::upload))
        .route("/predict", post(handlers::predict))
        .route("/images", get(handlers::list_images))
        .route("/objects/{*key}", get(handlers::get_object))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn_with_state(state.clone(), middleware::cors_middleware))
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: StylistConfig) -> Result<()> {
    let bind_addr = config.bind_addr();
    tracing::info!(addr = %bind_addr, "starting stylist server");

    let state = setup_shared_state(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down server");
    })
    .await?;

    Ok(())
}
