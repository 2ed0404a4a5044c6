//! HTTP API for predictions, model information, health checks and metrics

use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{rejection::JsonRejection, MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serving_lib::{ModelInfoResponse, PredictionRequest, PredictionResponse, PredictionService};
use std::future::Future;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Path excluded from request metrics
const METRICS_PATH: &str = "/metrics";

/// Endpoint label for requests that matched no route
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>) -> Self {
        Self { service }
    }
}

/// Landing page
async fn index() -> Html<&'static str> {
    Html(
        r#"<html>
    <head>
        <title>ML Model API</title>
        <style>
            body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
            h1 { color: #333; }
            a { color: #0066cc; }
        </style>
    </head>
    <body>
        <h1>ML Model API</h1>
        <p>API for serving machine learning models</p>
        <ul>
            <li><a href="/health">/health</a> - service health</li>
            <li><a href="/model/info">/model/info</a> - loaded model</li>
            <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
            <li>POST /predict - make a prediction</li>
        </ul>
    </body>
</html>"#,
    )
}

/// Liveness: always 200, reports whether a model is loaded
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.health().await)
}

/// Readiness: 200 once the startup model is loaded, 503 before
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.service.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> ApiResult<Json<PredictionResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let response = state.service.predict(request).await?;
    Ok(Json(response))
}

async fn model_info(State(state): State<Arc<AppState>>) -> ApiResult<Json<ModelInfoResponse>> {
    Ok(Json(state.service.model_info().await?))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let metrics = state.service.metrics();
    match metrics.snapshot() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Count and time every request except metrics scrapes
///
/// Requests are labelled by route template. Requests matching no route
/// share the [`UNMATCHED_ENDPOINT`] label.
async fn track_requests(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());
    if path == METRICS_PATH {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let metrics = state.service.metrics();
    let start = metrics.record_request_start(&method, &path);
    let response = next.run(req).await;
    metrics.record_request_end(start, &method, &path, response.status().as_u16());
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/predict", post(predict))
        .route("/model/info", get(model_info))
        .route(METRICS_PATH, get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve<F>(addr: &str, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
