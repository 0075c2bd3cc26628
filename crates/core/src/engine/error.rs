//! Error taxonomy for lifecycle transitions.

use thiserror::Error;

use crate::ticket::RepositoryError;

/// Errors that can occur while driving a ticket through its lifecycle.
///
/// Every variant carries a distinguishable kind so the ingress layer can
/// map it to an external response (bad-request vs not-found vs conflict).
/// None of these are retried internally.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Malformed intake draft.
    #[error("invalid ticket draft: {0}")]
    Validation(String),

    /// Unknown ticket id.
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// Transition not legal from the ticket's current status.
    #[error("cannot {operation} ticket {ticket_id}: current status is {status}")]
    InvalidState {
        ticket_id: String,
        status: String,
        operation: String,
    },

    /// The exact same terminal transition was replayed on a closed ticket.
    #[error("{operation} already applied to ticket {ticket_id}")]
    Conflict {
        ticket_id: String,
        operation: String,
    },

    /// The durable repository failed on a path that needs it.
    #[error("repository error: {0}")]
    Storage(String),
}

impl TriageError {
    /// Stable kind string for response mapping and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            TriageError::Validation(_) => "validation",
            TriageError::NotFound(_) => "not_found",
            TriageError::InvalidState { .. } => "invalid_state",
            TriageError::Conflict { .. } => "conflict",
            TriageError::Storage(_) => "storage",
        }
    }
}

impl From<RepositoryError> for TriageError {
    fn from(e: RepositoryError) -> Self {
        TriageError::Storage(e.to_string())
    }
}
