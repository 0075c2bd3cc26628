//! Ticket API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use triage_core::{
    Lane, PatientRef, Priority, Ticket, TicketDraft, TicketStatus, TicketView, TriageError,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Patient reference in request bodies
#[derive(Debug, Deserialize)]
pub struct PatientBody {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Request body for creating a ticket
#[derive(Debug, Deserialize)]
pub struct CreateTicketBody {
    pub patient: PatientBody,
    pub title: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub created_by: Option<String>,
}

/// Request body for assigning a ticket to a staff member
#[derive(Debug, Deserialize)]
pub struct AssignTicketBody {
    pub staff_id: String,
}

/// Request body for reporting a successful contact
#[derive(Debug, Deserialize)]
pub struct CompleteTicketBody {
    pub resolved_by: String,
    pub call_record_id: Option<String>,
}

/// Request body for reporting a failed contact
#[derive(Debug, Default, Deserialize)]
pub struct FailTicketBody {
    pub call_record_id: Option<String>,
}

/// Request body for cancelling a ticket
#[derive(Debug, Deserialize)]
pub struct CancelTicketBody {
    pub cancelled_by: Option<String>,
}

/// Query parameters for listing tickets
#[derive(Debug, Deserialize)]
pub struct ListTicketsParams {
    /// Filter by status type ("open", "in_progress")
    pub status: Option<String>,
    /// Filter by lane ("primary", "retry")
    pub lane: Option<String>,
}

/// Response for ticket operations
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub id: String,
    pub patient: PatientRef,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: String,
    pub status: TicketStatus,
    pub lane: Lane,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_record_id: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

impl From<TicketView> for TicketResponse {
    fn from(view: TicketView) -> Self {
        let Ticket {
            id,
            patient,
            title,
            description,
            priority,
            category,
            status,
            lane,
            retry_count,
            call_record_id,
            created_by,
            created_at,
            updated_at,
        } = view.ticket;
        Self {
            id,
            patient,
            title,
            description,
            priority,
            category,
            status,
            lane,
            retry_count,
            call_record_id,
            created_by,
            created_at: created_at.to_rfc3339(),
            updated_at: updated_at.to_rfc3339(),
            queue_position: view.queue_position,
        }
    }
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<TicketResponse>,
    pub total: usize,
}

/// Error response carrying the distinguishable error kind
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub kind: String,
}

/// Map an engine error to an HTTP response.
pub fn error_response(err: TriageError) -> (StatusCode, Json<ApiErrorResponse>) {
    let status = match &err {
        TriageError::Validation(_) => StatusCode::BAD_REQUEST,
        TriageError::NotFound(_) => StatusCode::NOT_FOUND,
        TriageError::InvalidState { .. } | TriageError::Conflict { .. } => StatusCode::CONFLICT,
        TriageError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ApiErrorResponse {
        error: err.to_string(),
        kind: err.kind().to_string(),
    };
    (status, Json(body))
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new ticket (intake)
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTicketBody>,
) -> Result<(StatusCode, Json<TicketResponse>), (StatusCode, Json<ApiErrorResponse>)> {
    let draft = TicketDraft {
        patient_id: body.patient.id,
        patient_name: body.patient.name,
        patient_phone: body.patient.phone,
        title: body.title,
        description: body.description,
        priority: body.priority,
        category: body.category.unwrap_or_else(|| "consultation".to_string()),
        created_by: body.created_by.unwrap_or_else(|| "anonymous".to_string()),
    };

    match state.engine().intake(draft) {
        Ok(view) => Ok((StatusCode::CREATED, Json(TicketResponse::from(view)))),
        Err(e) => Err(error_response(e)),
    }
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TicketResponse>, (StatusCode, Json<ApiErrorResponse>)> {
    match state.engine().get(&id) {
        Ok(Some(view)) => Ok(Json(TicketResponse::from(view))),
        Ok(None) => Err(error_response(TriageError::NotFound(id))),
        Err(e) => Err(error_response(e)),
    }
}

/// List active tickets with optional filters
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTicketsParams>,
) -> Json<ListTicketsResponse> {
    let mut views = state.engine().active_tickets();

    if let Some(ref status) = params.status {
        views.retain(|v| v.ticket.status.status_type() == status);
    }
    if let Some(ref lane) = params.lane {
        views.retain(|v| v.queue_position.is_some() && v.ticket.lane.as_str() == lane);
    }

    let tickets: Vec<TicketResponse> = views.into_iter().map(TicketResponse::from).collect();
    let total = tickets.len();
    Json(ListTicketsResponse { tickets, total })
}

/// Assign an open ticket to a staff member
pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AssignTicketBody>,
) -> Result<Json<TicketResponse>, (StatusCode, Json<ApiErrorResponse>)> {
    match state.engine().assign(&id, &body.staff_id) {
        Ok(view) => Ok(Json(TicketResponse::from(view))),
        Err(e) => Err(error_response(e)),
    }
}

/// Report a successful contact; closes the ticket as resolved
pub async fn complete_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CompleteTicketBody>,
) -> Result<Json<TicketResponse>, (StatusCode, Json<ApiErrorResponse>)> {
    match state
        .engine()
        .complete(&id, &body.resolved_by, body.call_record_id)
    {
        Ok(view) => Ok(Json(TicketResponse::from(view))),
        Err(e) => Err(error_response(e)),
    }
}

/// Report a failed contact; the ticket re-enters the retry lane or
/// escalates once the attempt budget is exhausted
pub async fn fail_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<FailTicketBody>>,
) -> Result<Json<TicketResponse>, (StatusCode, Json<ApiErrorResponse>)> {
    let call_record_id = body.and_then(|b| b.0.call_record_id);
    match state.engine().mark_failed(&id, call_record_id) {
        Ok(view) => Ok(Json(TicketResponse::from(view))),
        Err(e) => Err(error_response(e)),
    }
}

/// Cancel a ticket (DELETE endpoint)
pub async fn cancel_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<CancelTicketBody>>,
) -> Result<Json<TicketResponse>, (StatusCode, Json<ApiErrorResponse>)> {
    let cancelled_by = body.and_then(|b| b.0.cancelled_by);
    match state.engine().cancel(&id, cancelled_by) {
        Ok(view) => Ok(Json(TicketResponse::from(view))),
        Err(e) => Err(error_response(e)),
    }
}
