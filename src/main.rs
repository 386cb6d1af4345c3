use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use quillrec::services::worker::WorkerStatus;
use quillrec::utils::clamp_limit;
use quillrec::{
    init_tracing, AppState, BehaviorSummary, Config, ContentItem, DiscoveryResult, EngineError,
    EngineResult, RecommendationCategory, RecommendationResponse, RecommendationStats,
    SimilarContent, UserAction, UserInterest, UserRecommendation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Serve requests without the background maintenance loop.
    #[arg(long)]
    no_worker: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, EngineError>;

#[derive(Debug, Deserialize)]
struct TrackRequest {
    user_id: Uuid,
    content_id: Uuid,
    action: String,
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct NewItem {
    title: String,
    body: String,
    author_id: Uuid,
    #[serde(default)]
    tags: Vec<String>,
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "quillrec".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
    status.insert("items".to_string(), state.store.item_count().to_string());

    Json(ApiResponse::success(status))
}

async fn track_action(
    State(state): State<AppState>,
    Json(request): Json<TrackRequest>,
) -> ApiResult<UserAction> {
    let action = state
        .tracker
        .track(request.user_id, request.content_id, &request.action)
        .await?;
    Ok(Json(ApiResponse::success(action)))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<RecommendationQuery>,
) -> ApiResult<RecommendationResponse> {
    let settings = &state.config.recommendation;
    let limit = clamp_limit(params.limit, settings.default_limit, settings.max_limit);
    let category = params
        .category
        .as_deref()
        .unwrap_or("")
        .parse::<RecommendationCategory>()
        .map_err(EngineError::InvalidInput)?;

    let response = state
        .recommendation_service
        .get_recommendations(user_id, limit, category)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

async fn mark_viewed(
    State(state): State<AppState>,
    Path(recommendation_id): Path<Uuid>,
) -> ApiResult<UserRecommendation> {
    let row = state.recommendation_service.mark_viewed(recommendation_id).await?;
    Ok(Json(ApiResponse::success(row)))
}

async fn similar_content(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(params): Query<LimitQuery>,
) -> ApiResult<Vec<SimilarContent>> {
    let settings = &state.config.recommendation;
    let limit = clamp_limit(params.limit, settings.similar_default_limit, settings.similar_max_limit);
    let similar = state.similarity.find_similar(item_id, limit).await?;
    Ok(Json(ApiResponse::success(similar)))
}

async fn discover(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> ApiResult<DiscoveryResult> {
    let settings = &state.config.recommendation;
    let limit = clamp_limit(params.limit, settings.default_limit, settings.max_limit);
    let result = state.discovery.discover(limit).await?;
    Ok(Json(ApiResponse::success(result)))
}

async fn user_interests(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<UserInterest>> {
    let interests = state.profiler.interest_profile(user_id).await?;
    Ok(Json(ApiResponse::success(interests)))
}

async fn behavior_summary(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<BehaviorSummary> {
    let summary = state.tracker.behavior_summary(user_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn recommendation_stats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<RecommendationStats> {
    let stats = state.recommendation_service.recommendation_stats(user_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}

async fn add_item(State(state): State<AppState>, Json(new_item): Json<NewItem>) -> ApiResult<ContentItem> {
    if new_item.title.trim().is_empty() {
        return Err(EngineError::InvalidInput("Title cannot be empty".to_string()));
    }
    let item = ContentItem::new(&new_item.title, &new_item.body, new_item.author_id, new_item.tags);
    state.store.insert_item(item.clone());
    Ok(Json(ApiResponse::success(item)))
}

async fn worker_status(State(state): State<AppState>) -> Json<ApiResponse<WorkerStatus>> {
    Json(ApiResponse::success(state.worker.status()))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/actions", post(track_action))
        .route("/recommendations/:user_id", get(get_recommendations))
        .route("/recommendations/:recommendation_id/viewed", post(mark_viewed))
        .route("/items", post(add_item))
        .route("/items/:item_id/similar", get(similar_content))
        .route("/discover", get(discover))
        .route("/users/:user_id/interests", get(user_interests))
        .route("/users/:user_id/behavior", get(behavior_summary))
        .route("/users/:user_id/stats", get(recommendation_stats))
        .route("/worker/status", get(worker_status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn stop_worker(state: &AppState) -> EngineResult<()> {
    if state.worker.is_running() {
        state.worker.stop().await?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads())
        .enable_all()
        .build()?;
    runtime.block_on(serve(args, config))
}

async fn serve(args: Args, config: Config) -> anyhow::Result<()> {
    info!("Starting quillrec server with config: {:?}", config.server);

    let state = AppState::new(config.clone()).await?;

    if config.worker.enabled && !args.no_worker {
        state.worker.start()?;
    } else {
        info!("Background worker disabled");
    }

    let app = create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(config.server.socket_addr()).await?;
    info!("Server listening on {}", config.server.socket_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop_worker(&state).await?;
    info!("Shutdown complete");
    Ok(())
}
