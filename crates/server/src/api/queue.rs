//! Queue view handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use triage_core::{Lane, QueueStats};

use super::tickets::{ApiErrorResponse, TicketResponse};
use crate::state::AppState;

/// Response for the combined queue view.
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub stats: QueueStats,
    /// Tickets in cross-lane dispatch order.
    pub tickets: Vec<TicketResponse>,
}

/// Response for a single lane view.
#[derive(Debug, Serialize)]
pub struct LaneResponse {
    pub lane: Lane,
    pub tickets: Vec<TicketResponse>,
}

/// Combined queue view: stats plus both lanes merged into dispatch order.
pub async fn get_queue(State(state): State<Arc<AppState>>) -> Json<QueueResponse> {
    let engine = state.engine();
    Json(QueueResponse {
        stats: engine.stats(),
        tickets: engine
            .dispatch_order()
            .into_iter()
            .map(TicketResponse::from)
            .collect(),
    })
}

/// Ordered snapshot of one lane.
pub async fn get_lane(
    State(state): State<Arc<AppState>>,
    Path(lane): Path<String>,
) -> Result<Json<LaneResponse>, (StatusCode, Json<ApiErrorResponse>)> {
    let lane: Lane = lane.parse().map_err(|e: String| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiErrorResponse {
                error: e,
                kind: "validation".to_string(),
            }),
        )
    })?;

    Ok(Json(LaneResponse {
        lane,
        tickets: state
            .engine()
            .lane_snapshot(lane)
            .into_iter()
            .map(TicketResponse::from)
            .collect(),
    }))
}
