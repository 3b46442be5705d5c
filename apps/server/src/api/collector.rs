use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use holdwatch_core::collector::{CollectorStatus, CycleReport, UnitOutcome};
use holdwatch_filings::FilingPeriod;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Debug, Default, Deserialize)]
struct CollectUnitQuery {
    #[serde(default)]
    force: bool,
}

pub(crate) fn parse_period(raw: &str) -> ApiResult<FilingPeriod> {
    raw.parse::<FilingPeriod>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn run_cycle(State(state): State<Arc<AppState>>) -> ApiResult<Json<CycleReport>> {
    let report = state.orchestrator.run_cycle().await?;
    Ok(Json(report))
}

async fn stop(State(state): State<Arc<AppState>>) -> Json<CollectorStatus> {
    state.orchestrator.request_stop();
    Json(state.orchestrator.status())
}

async fn status(State(state): State<Arc<AppState>>) -> Json<CollectorStatus> {
    Json(state.orchestrator.status())
}

async fn collect_unit(
    Path((investor_id, period)): Path<(String, String)>,
    Query(query): Query<CollectUnitQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<UnitOutcome>> {
    let period = parse_period(&period)?;
    let outcome = state
        .orchestrator
        .collect_unit(&investor_id, period, query.force)
        .await?;
    Ok(Json(outcome))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/collector/run", post(run_cycle))
        .route("/collector/stop", post(stop))
        .route("/collector/status", get(status))
        .route(
            "/collector/units/{investor_id}/{period}",
            post(collect_unit),
        )
}
