use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use holdwatch_core::holdings::{Holding, HoldingSnapshot};
use holdwatch_core::investors::InvestorProfile;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

async fn list_investors(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<InvestorProfile>>> {
    Ok(Json(state.investors.list_investors()?))
}

async fn latest_holdings(
    Path(investor_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<HoldingSnapshot>> {
    if state.investors.get_investor(&investor_id)?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Investor not found: {}",
            investor_id
        )));
    }
    state
        .holdings
        .latest_snapshot(&investor_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No holdings collected for {}", investor_id)))
}

async fn ticker_holders(
    Path(ticker): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Holding>>> {
    Ok(Json(state.holdings.holders_of(&ticker)?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/investors", get(list_investors))
        .route(
            "/investors/{investor_id}/holdings/latest",
            get(latest_holdings),
        )
        .route("/tickers/{ticker}/investors", get(ticker_holders))
}
