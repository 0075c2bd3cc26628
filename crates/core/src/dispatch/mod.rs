//! Real-time dispatch of committed queue mutations.

mod dispatcher;
mod message;

pub use dispatcher::{
    create_dispatch_system, DispatchWorker, Dispatcher, TransportError, UpdateTransport,
};
pub use message::{QueueAction, QueueUpdateMessage, Topic};
