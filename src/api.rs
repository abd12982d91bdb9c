//! HTTP API Server for Recommendations
//!
//! Provides REST endpoints for the frontend to fetch personalized
//! recommendations, preference profiles, and explanations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::ApiConfig;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::recommendation::{
    engine::{ProfileSummary, Recommendation, RecommendationEngine},
    explain::{Explanation, ExplanationService},
};

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub engine: RecommendationEngine,
    pub explainer: Arc<ExplanationService>,
}

/// Query params for the recommendations endpoint
#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub limit: Option<usize>,
    #[serde(default = "default_true")]
    pub exclude_rated: bool,
}

fn default_true() -> bool {
    true
}

/// Response for the recommendations endpoint
#[derive(Debug, Serialize)]
pub struct RecommendationListResponse {
    pub reviewer_id: String,
    pub recommendations: Vec<Recommendation>,
    pub count: usize,
}

/// Response for a single explanation
#[derive(Debug, Serialize)]
pub struct ExplanationResponse {
    pub reviewer_id: String,
    pub fragrance_id: String,
    pub recommendation: Recommendation,
    pub explanation: Explanation,
}

/// Response for the profile summary text endpoint
#[derive(Debug, Serialize)]
pub struct ProfileTextResponse {
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub summary: Explanation,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the application router
pub fn router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Recommendations
        .route(
            "/api/v1/recommendations/:reviewer_id",
            get(get_recommendations),
        )
        .route(
            "/api/v1/recommendations/:reviewer_id/profile",
            get(get_profile_summary),
        )
        .route(
            "/api/v1/recommendations/:reviewer_id/summary",
            get(get_profile_text),
        )
        .route(
            "/api/v1/recommendations/:reviewer_id/explanations/:fragrance_id",
            get(get_explanation),
        )
        // Explanation cache management
        .route("/api/v1/explanations/cache", delete(clear_explanation_cache))
        .route(
            "/api/v1/explanations/cache/:reviewer_id",
            delete(invalidate_reviewer_cache),
        )
        .with_state(state);

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Start the API server
pub async fn start_server(state: Arc<AppState>, config: &ApiConfig) -> Result<()> {
    let app = router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting recommendation API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::internal(e))?;

    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = match state.db.health_check().await {
        Ok(()) => "healthy",
        Err(_) => "degraded",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get personalized recommendations for a reviewer
async fn get_recommendations(
    State(state): State<Arc<AppState>>,
    Path(reviewer_id): Path<String>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<RecommendationListResponse>> {
    let recommendations = state
        .engine
        .recommendations(&reviewer_id, query.limit, query.exclude_rated)
        .await?;

    let count = recommendations.len();
    Ok(Json(RecommendationListResponse {
        reviewer_id,
        recommendations,
        count,
    }))
}

/// Get a reviewer's preference profile summary
async fn get_profile_summary(
    State(state): State<Arc<AppState>>,
    Path(reviewer_id): Path<String>,
) -> Result<Json<ProfileSummary>> {
    let summary = state.engine.profile_summary(&reviewer_id).await?;
    Ok(Json(summary))
}

/// Get a natural-language summary of a reviewer's preferences
async fn get_profile_text(
    State(state): State<Arc<AppState>>,
    Path(reviewer_id): Path<String>,
) -> Result<Json<ProfileTextResponse>> {
    let reviewer = state.engine.reviewer(&reviewer_id).await?;
    let profile = state.engine.build_profile(&reviewer_id).await?;
    let summary = state.explainer.summarize_profile(&profile, &reviewer.name).await;

    Ok(Json(ProfileTextResponse {
        reviewer_id,
        reviewer_name: reviewer.name,
        summary,
    }))
}

/// Explain how a specific fragrance matches a reviewer's preferences
async fn get_explanation(
    State(state): State<Arc<AppState>>,
    Path((reviewer_id, fragrance_id)): Path<(String, String)>,
) -> Result<Json<ExplanationResponse>> {
    let (recommendation, profile, fragrance) =
        state.engine.match_for(&reviewer_id, &fragrance_id).await?;
    let explanation = state
        .explainer
        .explain_recommendation(&recommendation, &profile, &fragrance)
        .await;

    Ok(Json(ExplanationResponse {
        reviewer_id,
        fragrance_id,
        recommendation,
        explanation,
    }))
}

/// Drop every cached explanation
async fn clear_explanation_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    state.explainer.clear_cache();
    StatusCode::NO_CONTENT
}

/// Drop cached explanations for one reviewer (call after new evaluations)
async fn invalidate_reviewer_cache(
    State(state): State<Arc<AppState>>,
    Path(reviewer_id): Path<String>,
) -> StatusCode {
    state.explainer.invalidate_reviewer(&reviewer_id);
    StatusCode::NO_CONTENT
}
