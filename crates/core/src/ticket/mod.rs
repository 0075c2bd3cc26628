//! Ticket data model and durable repository.

mod repository;
mod sqlite;
mod types;

pub use repository::{RepositoryError, TicketRepository};
pub use sqlite::SqliteTicketRepository;
pub use types::{CloseOutcome, Lane, PatientRef, Priority, Ticket, TicketDraft, TicketStatus};
