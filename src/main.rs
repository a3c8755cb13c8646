use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use menurec::{init_tracing, AppState, Config, EngineError, ProductId};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    n: Option<usize>,
    apply_rules: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColdStartQuery {
    n: Option<usize>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimilarityQuery {
    username: Option<String>,
}

struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label) = match &self.0 {
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "Invalid parameter"),
            EngineError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": label, "message": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.serving.health();
    Json(json!({
        "status": "healthy",
        "service": "menurec-content-based-recommender",
        "version": env!("CARGO_PKG_VERSION"),
        "phase": stats.phase,
        "cached_products": stats.cached_products,
        "cached_user_profiles": stats.cached_profiles,
        "vector_dimensions": stats.vector_dimensions,
        "requests": state.serving.get_serving_stats(),
    }))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<RecommendationQuery>,
) -> ApiResult {
    let apply_rules = params
        .apply_rules
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(true);

    let recommendations = state
        .serving
        .serve_recommendations(&username, params.n, apply_rules)
        .await?;

    if recommendations.is_empty() {
        return Ok(Json(json!({
            "username": username,
            "recommendations": [],
            "message": "No recommendations available. User may not have order history.",
            "recommendation_type": "empty",
        })));
    }

    Ok(Json(json!({
        "username": username,
        "count": recommendations.len(),
        "recommendation_type": "personalized",
        "features_used": {
            "category_encoding": true,
            "tfidf_text": true,
            "normalized_price": true,
            "business_rules": apply_rules,
        },
        "recommendations": recommendations,
    })))
}

async fn get_cold_start(State(state): State<AppState>, Query(params): Query<ColdStartQuery>) -> ApiResult {
    let recommendations = state
        .serving
        .serve_cold_start(params.n, params.category.as_deref())
        .await?;

    Ok(Json(json!({
        "count": recommendations.len(),
        "recommendation_type": "cold_start",
        "category_filter": params.category,
        "recommendations": recommendations,
    })))
}

async fn get_user_vector(State(state): State<AppState>, Path(username): Path<String>) -> ApiResult {
    match state.serving.user_vector_info(&username).await? {
        Some(summary) => Ok(Json(json!({
            "username": username,
            "has_profile": true,
            "vector_dimensions": summary.vector_dimensions,
            "statistics": {
                "mean": summary.mean,
                "std": summary.std,
                "min": summary.min,
                "max": summary.max,
                "non_zero_features": summary.non_zero_features,
            },
            "feature_breakdown": summary.breakdown,
        }))),
        None => Ok(Json(json!({
            "username": username,
            "has_profile": false,
            "message": "User has no order history",
        }))),
    }
}

async fn rebuild_cache(State(state): State<AppState>) -> ApiResult {
    let stats = state.serving.rebuild().await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Cache rebuilt successfully",
        "cached_products": stats.cached_products,
        "vector_dimensions": stats.vector_dimensions,
        "generation": stats.generation,
    })))
}

async fn get_similarity(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Query(params): Query<SimilarityQuery>,
) -> ApiResult {
    let username = params.username.unwrap_or_default();
    let report = state.serving.product_similarity(product_id, &username).await?;
    Ok(Json(json!(report)))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/recommendations/advanced/:username", get(get_recommendations))
        .route("/api/recommendations/cold-start", get(get_cold_start))
        .route("/api/recommendations/user-vector/:username", get(get_user_vector))
        .route("/api/recommendations/rebuild-cache", post(rebuild_cache))
        .route("/api/recommendations/similarity/:product_id", get(get_similarity))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", &args.log_level);
    }
    init_tracing();

    let config = Config::load_or_default(&args.config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.server.socket_addr()?;
    info!("Starting Menurec recommendation server with config: {:?}", config.server);

    let state = AppState::new(config).await?;
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    match state.engine.persist() {
        Ok(()) | Err(EngineError::NotReady) => {}
        Err(e) => error!(error = %e, "Failed to persist profile cache on shutdown"),
    }

    Ok(())
}
