//! Two-lane priority queue index and position derivation.

mod position;
mod store;

pub use position::{position_in, shifted, PositionShift};
pub use store::{QueueError, QueueStore};
