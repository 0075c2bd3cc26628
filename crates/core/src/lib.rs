pub mod config;
pub mod dispatch;
pub mod engine;
pub mod metrics;
pub mod queue;
pub mod ticket;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    DispatchConfig, QueueConfig, ServerConfig,
};
pub use dispatch::{
    create_dispatch_system, DispatchWorker, Dispatcher, QueueAction, QueueUpdateMessage, Topic,
    TransportError, UpdateTransport,
};
pub use engine::{QueueStats, TicketView, TriageEngine, TriageError};
pub use queue::{position_in, shifted, PositionShift, QueueError, QueueStore};
pub use ticket::{
    CloseOutcome, Lane, PatientRef, Priority, RepositoryError, SqliteTicketRepository, Ticket,
    TicketDraft, TicketRepository, TicketStatus,
};
