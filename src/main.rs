// Main entry point for the architectural rendering gateway

use arch_gateway::{
    core::{config::mask_key, types::*, Config},
    orchestration::Gateway,
    utils::{inline_images_from_inputs, Metrics},
    GatewayError, HeavyFailure,
};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    gateway: Arc<Gateway>,
    metrics: Metrics,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "arch_gateway={},tower_http=warn",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== ARCH GATEWAY ===");
    if config.api_keys().is_empty() {
        warn!("GOOGLE_API_KEY: Not Set");
    } else {
        let masked: Vec<String> = config.api_keys().iter().map(|k| mask_key(k)).collect();
        info!("GOOGLE_API_KEY: {} key(s) [{}]", masked.len(), masked.join(", "));
    }
    match config.text.api_key.as_deref() {
        Some(key) => info!("QWEN_API_KEY: Found ({})", mask_key(key)),
        None => warn!("QWEN_API_KEY: Not Set"),
    }
    info!(
        "Models: image={} fallback={} vision={} text={}",
        config.gemini.image_model,
        config.image_fallback_model().unwrap_or("none"),
        config.gemini.vision_model,
        config.text.model
    );

    // Initialize metrics
    let metrics = Metrics::new();

    let gateway = Arc::new(Gateway::from_config(&config, metrics.clone())?);
    let app = router(AppState {
        config: config.clone(),
        gateway,
        metrics,
    });

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                    - Root endpoint");
    info!("  GET  /health              - Health check");
    info!("  GET  /health/api-keys     - Key pool status");
    info!("  GET  /metrics             - Prometheus metrics");
    info!("  GET  /stats               - Detailed statistics");
    info!("  POST /api/optimize-prompt - Rewrite a prompt");
    info!("  POST /api/generate-image  - Generate an image (JSON)");
    info!("  POST /api/analyze-image   - Describe an image (multipart/form-data)");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let max_upload_bytes = state.config.server.max_upload_bytes;

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/api-keys", get(health_api_keys))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/api/optimize-prompt", post(optimize_prompt))
        .route("/api/generate-image", post(generate_image))
        .route("/api/analyze-image", post(analyze_image))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "ArchGemini Backend is running!",
        "status": "ok",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Key pool status; suffixes only
async fn health_api_keys(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pool = state.gateway.api_key_pool();
    Json(serde_json::json!({
        "status": if pool.is_empty() { "unconfigured" } else { "healthy" },
        "total_keys": pool.total_keys(),
        "keys": pool.masked_keys(),
        "text_provider_configured": state.config.text.api_key.is_some(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = serde_json::to_value(state.metrics.snapshot()).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })?;

    let limiter = state.gateway.limiter();
    let logged = match state.gateway.logger().count().await {
        Ok(count) => serde_json::json!(count),
        Err(e) => {
            warn!("Failed to count request log rows: {}", e);
            serde_json::Value::Null
        }
    };

    Ok(Json(serde_json::json!({
        "metrics": snapshot,
        "concurrency": {
            "capacity": limiter.capacity(),
            "in_flight": limiter.in_flight(),
            "available": limiter.available(),
        },
        "request_log_rows": logged,
    })))
}

async fn optimize_prompt(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    state.metrics.record_endpoint_request("/api/optimize-prompt");
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;

    let optimized_prompt = state
        .gateway
        .optimize(&req.text, &client_ip(&headers, peer))
        .await
        .map_err(failure_response)?;

    Ok(Json(OptimizeResponse { optimized_prompt }))
}

async fn generate_image(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    state.metrics.record_endpoint_request("/api/generate-image");
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;

    info!(
        "Generate request: aspect_ratio={} resolution={} images={}",
        req.aspect_ratio,
        req.resolution,
        req.images.len()
    );

    let request = GenerationRequest {
        prompt: req.prompt,
        aspect_ratio: req.aspect_ratio,
        resolution: req.resolution,
        images: inline_images_from_inputs(&req.images),
    };

    let image = state
        .gateway
        .generate(request, &client_ip(&headers, peer))
        .await
        .map_err(failure_response)?;

    Ok(Json(GenerateResponse {
        image_base64: image.image_base64,
        mime_type: image.mime_type,
        model_used: image.model_used,
    }))
}

/// Describe an uploaded image
///
/// # Request Format:
/// - multipart/form-data
/// - Field "file": the image (content type defaults to image/png)
/// - Field "prompt" (optional): overrides the preset prompt
/// - Field "analysis_type" (optional): general, scene or facade
async fn analyze_image(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    state.metrics.record_endpoint_request("/api/analyze-image");

    let mut file: Option<(Vec<u8>, String)> = None;
    let mut prompt: Option<String> = None;
    let mut analysis_type = AnalysisType::General;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let mime_type = field
                    .content_type()
                    .filter(|m| !m.is_empty())
                    .unwrap_or("image/png")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Read error: {}", e)))?;
                file = Some((data.to_vec(), mime_type));
            }
            "prompt" => {
                prompt = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("Prompt read error: {}", e)))?,
                );
            }
            "analysis_type" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Analysis type read error: {}", e)))?;
                analysis_type = AnalysisType::from_form(&value);
            }
            _ => {}
        }
    }

    let Some((bytes, mime_type)) = file else {
        return Err(bad_request("No file provided".to_string()));
    };

    let description = state
        .gateway
        .analyze(
            &bytes,
            &mime_type,
            prompt.as_deref(),
            analysis_type,
            &client_ip(&headers, peer),
        )
        .await
        .map_err(failure_response)?;

    Ok(Json(AnalyzeResponse { description }))
}

/// First hop of X-Forwarded-For, else the socket peer
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

fn bad_request(detail: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { detail }))
}

/// Bad input maps to 400, every provider failure to 500
fn failure_response(failure: HeavyFailure) -> ApiError {
    let status = match failure.source {
        GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            detail: failure.message,
        }),
    )
}
