use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;

use lid_core::LidClient;
use lid_core::error::LockError;
use lid_core::infrastructure::{LockService, LockServiceExt};
use lid_core::types::{
    CheckResponse, LockOptions, LockRequest, LockResponse, UnlockRequest, UnlockResponse,
    duration_from_millis, duration_from_secs,
};

use crate::handlers::*;

#[derive(Clone)]
pub struct AppState {
    pub client: LidClient,
    pub api_key: Option<Arc<str>>,
    pub backend: Arc<str>,
    /// Bounds service calls running on the blocking pool
    pub in_flight: Arc<Semaphore>,
}

pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub max_in_flight: usize,
    pub backend: String,
}

pub fn router(state: AppState) -> Router {
    // NOTE: Rate limiting should be handled at the infrastructure level
    // (nginx, envoy, cloud load balancer) for production deployments.
    Router::new()
        .route("/health", get(health))
        .route(
            "/locks/{signature}",
            put(acquire_lock).delete(release_lock).get(check_lock),
        )
        .route("/purge", post(purge_expired))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(client: LidClient, settings: ServerSettings) -> std::io::Result<()> {
    if settings.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("No LID_API_KEY set, server is open (dev mode)");
    }

    let state = AppState {
        client,
        api_key: settings.api_key.map(Arc::from),
        backend: Arc::from(settings.backend),
        in_flight: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
    };
    let app = router(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("lid server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected_key) = state.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// Run a blocking service call off the async workers, at most
/// `max_in_flight` at a time.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, LockError> + Send + 'static,
    T: Send + 'static,
{
    let permit = Arc::clone(&state.in_flight)
        .acquire_owned()
        .await
        .map_err(|e| ApiError::internal(format!("server shutting down: {e}")))?;
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        f()
    })
    .await
    .map_err(|e| ApiError::internal(format!("lock task failed: {e}")))?
    .map_err(ApiError::from)
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        backend: state.backend.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn acquire_lock(
    State(state): State<AppState>,
    Path(signature): Path<String>,
    Json(body): Json<LockBody>,
) -> Result<Json<ApiResponse<LockResponse>>, ApiError> {
    let req = LockRequest::new(signature, body.signee, body.level);
    let mut opts = LockOptions::default();
    if let Some(ms) = body.duration_ms {
        opts = opts.with_duration(duration_from_millis(ms)?);
    }
    if let Some(secs) = body.ttl_secs {
        opts = opts.with_time_to_live(duration_from_secs(secs)?);
    }

    let client = state.client.clone();
    let (req, resp) =
        blocking(&state, move || client.lock(&req, Some(&opts)).map(|resp| (req, resp))).await?;
    tracing::info!(
        signature = %req.signature,
        signee = %req.signee,
        status = ?resp.status,
        "Lock granted"
    );
    Ok(Json(ApiResponse::ok(resp)))
}

async fn release_lock(
    State(state): State<AppState>,
    Path(signature): Path<String>,
    Json(body): Json<UnlockBody>,
) -> Result<Json<ApiResponse<UnlockResponse>>, ApiError> {
    let req = UnlockRequest::new(signature, body.signee);
    tracing::debug!(signature = %req.signature, signee = %req.signee, "Unlock requested");

    let client = state.client.clone();
    let resp = blocking(&state, move || client.unlock(&req, None)).await?;
    Ok(Json(ApiResponse::ok(resp)))
}

async fn check_lock(
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> Result<Json<ApiResponse<CheckResponse>>, ApiError> {
    let client = state.client.clone();
    #[allow(deprecated)]
    let resp = blocking(&state, move || client.check(&signature)).await?;
    Ok(Json(ApiResponse::ok(resp)))
}

async fn purge_expired(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PurgeResponse>>, ApiError> {
    let client = state.client.clone();
    let purged = blocking(&state, move || client.purge_expired()).await?;
    tracing::info!(purged, "Expired locks purged");
    Ok(Json(ApiResponse::ok(PurgeResponse { purged })))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use chrono::TimeDelta;
    use lid_core::types::ServiceOptions;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn app(api_key: Option<&str>) -> Router {
        let state = AppState {
            client: LidClient::in_memory(ServiceOptions::new(TimeDelta::seconds(10))),
            api_key: api_key.map(Arc::from),
            backend: Arc::from("memory"),
            in_flight: Arc::new(Semaphore::new(16)),
        };
        router(state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_lock_lifecycle_over_http() {
        let app = app(None);

        let (status, body) = send(&app, Method::PUT, "/locks/a", Some(json!({"signee": "0"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "OK");

        let (status, body) =
            send(&app, Method::PUT, "/locks/a", Some(json!({"signee": "1", "level": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "TRANSFERRED");
        assert_eq!(body["data"]["previous_signee"], "0");

        let (status, body) = send(&app, Method::GET, "/locks/a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"signee": "1", "level": 1}));

        let (status, body) = send(&app, Method::DELETE, "/locks/a", Some(json!({"signee": "0"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "FORBIDDEN");

        let (status, body) = send(&app, Method::DELETE, "/locks/a", Some(json!({"signee": "1"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "OK");

        let (status, body) = send(&app, Method::GET, "/locks/a", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_bad_request_maps_to_400() {
        let app = app(None);
        let (status, body) = send(&app, Method::PUT, "/locks/a", Some(json!({"signee": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_out_of_range_durations_map_to_400() {
        let app = app(None);
        let huge_ttl = json!({"signee": "0", "ttl_secs": 9_223_372_036_854_776_i64});
        let (status, body) = send(&app, Method::PUT, "/locks/a", Some(huge_ttl)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "BAD_REQUEST");

        let negative = json!({"signee": "0", "duration_ms": i64::MIN});
        let (status, _) = send(&app, Method::PUT, "/locks/a", Some(negative)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::GET, "/locks/a", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_auth_guards_everything_but_health() {
        let app = app(Some("secret"));

        let (status, _) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::POST, "/purge", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/purge")
            .header("authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
