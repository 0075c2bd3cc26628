//! Durable ticket repository contract.
//!
//! Every committed transition is forwarded here for long-term storage; on
//! restart the engine rebuilds its in-memory queue from `load_active`. The
//! repository is a collaborator, not the source of truth for ordering —
//! the queue store is.

use thiserror::Error;

use super::Ticket;

/// Error type for repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Underlying storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Trait for durable ticket storage backends, keyed by ticket id.
pub trait TicketRepository: Send + Sync {
    /// Insert or replace the stored state of a ticket.
    fn upsert(&self, ticket: &Ticket) -> Result<(), RepositoryError>;

    /// Fetch a ticket by id, terminal ones included.
    fn get(&self, id: &str) -> Result<Option<Ticket>, RepositoryError>;

    /// All non-terminal tickets, ordered by `(priority, created_at)` —
    /// the replay order used to rebuild the queue after a restart.
    fn load_active(&self) -> Result<Vec<Ticket>, RepositoryError>;
}
