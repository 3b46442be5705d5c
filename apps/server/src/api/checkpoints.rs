use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use holdwatch_core::checkpoints::{Checkpoint, CheckpointFilter, CheckpointStatus};
use holdwatch_core::WorkUnitKey;

use super::collector::parse_period;
use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    status: Option<String>,
    investor_id: Option<String>,
    period: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> ApiResult<CheckpointFilter> {
        Ok(CheckpointFilter {
            status: self
                .status
                .map(|s| s.parse::<CheckpointStatus>().map_err(ApiError::BadRequest))
                .transpose()?,
            investor_id: self.investor_id,
            period: self.period.as_deref().map(parse_period).transpose()?,
        })
    }
}

async fn list_checkpoints(
    Query(query): Query<ListQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Checkpoint>>> {
    let filter = query.into_filter()?;
    Ok(Json(state.checkpoints.list(&filter)?))
}

async fn list_exhausted(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Checkpoint>>> {
    let max_retries = state.orchestrator.config().max_retries;
    Ok(Json(state.checkpoints.list_exhausted(max_retries)?))
}

async fn reset_checkpoint(
    Path((investor_id, period)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Checkpoint>> {
    let key = WorkUnitKey::new(investor_id, parse_period(&period)?);
    let checkpoint = state.checkpoints.reset(&key).await?;
    tracing::info!("Checkpoint {} reset by operator", key);
    Ok(Json(checkpoint))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkpoints", get(list_checkpoints))
        .route("/checkpoints/exhausted", get(list_exhausted))
        .route(
            "/checkpoints/{investor_id}/{period}/reset",
            post(reset_checkpoint),
        )
}
