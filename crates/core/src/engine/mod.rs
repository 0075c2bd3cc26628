//! Ticket lifecycle engine and its error taxonomy.

#[allow(clippy::module_inception)]
mod engine;
mod error;

pub use engine::{QueueStats, TicketView, TriageEngine};
pub use error::TriageError;
