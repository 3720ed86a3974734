use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath, State};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::ApiError;
use super::AppState;

/// Reject the request with 429 once the client's quota for the matched route is spent.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let client = client_ip(&req);

    if !state.limiter.allow(&route, client).await {
        tracing::warn!(route = %route, client = %client, "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }
    next.run(req).await
}

fn client_ip(req: &Request<Body>) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn cors_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let allowed = req
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .and_then(|origin| allowed_origin(&state.config.server.cors_allowed_origins, origin));

    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        if let Some(origin) = allowed {
            let headers = resp.headers_mut();
            headers.insert("access-control-allow-origin", origin);
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static("GET,POST,OPTIONS"),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static("authorization,content-type"),
            );
        }
        return resp;
    }

    let mut resp = next.run(req).await;
    if let Some(origin) = allowed {
        resp.headers_mut().insert("access-control-allow-origin", origin);
    }
    resp
}

/// The `access-control-allow-origin` value for `origin`, if it is allowed.
fn allowed_origin(allowed: &[String], origin: &str) -> Option<HeaderValue> {
    if allowed.iter().any(|a| a == "*") {
        Some(HeaderValue::from_static("*"))
    } else if allowed.iter().any(|a| a == origin) {
        HeaderValue::from_str(origin).ok()
    } else {
        None
    }
}
