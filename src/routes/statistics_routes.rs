// src/routes/statistics_routes.rs

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;

use super::ApiOk;
use crate::{
    error::ApiError,
    models::AppState,
    services::statistics::{self, AvailableRange, ChartPoint, StatisticsSnapshot},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_statistics))
        .route("/available-range", get(get_available_range))
        .route("/chart", get(get_chart))
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub view: Option<String>,
    pub target: Option<String>,
}

pub async fn get_statistics(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<StatisticsSnapshot>>, ApiError> {
    let snapshot = statistics::trends(
        state.store.as_ref(),
        &state.stats_cache,
        state.clock.as_ref(),
    )
    .await?;
    Ok(Json(ApiOk::new(StatisticsSnapshot::clone(&snapshot))))
}

pub async fn get_available_range(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<AvailableRange>>, ApiError> {
    let range = statistics::available_range(state.store.as_ref(), state.clock.as_ref()).await?;
    Ok(Json(ApiOk::new(range)))
}

pub async fn get_chart(
    State(state): State<AppState>,
    Query(q): Query<ChartQuery>,
) -> Result<Json<ApiOk<Vec<ChartPoint>>>, ApiError> {
    let view = q.view.as_deref().unwrap_or("year");
    let target = q.target.as_deref().unwrap_or_default();
    let points = statistics::chart(state.store.as_ref(), view, target).await?;
    Ok(Json(ApiOk::new(points)))
}
