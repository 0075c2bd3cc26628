//! In-memory ordered index of queued tickets.
//!
//! One structure owns both lanes so single-lane occupancy is enforced in
//! one place instead of at every call site. Ordering within a lane is
//! `(priority rank, entry sequence)`: higher priority first, FIFO within
//! the same priority. The entry sequence comes from one globally monotonic
//! counter, so re-entering a lane always lands behind earlier entries of
//! the same priority in that lane.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::ticket::{Lane, Priority};

/// Errors from queue index operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Ticket is already present in a lane.
    #[error("ticket already queued: {0}")]
    AlreadyQueued(String),

    /// Ticket is not present in any lane.
    #[error("ticket not queued: {0}")]
    NotQueued(String),
}

/// Sort key within a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    rank: u8,
    seq: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    lane: Lane,
    key: OrderKey,
}

/// The authoritative in-memory ordering of all active tickets.
///
/// Mutated only by the lifecycle engine, under its critical section.
#[derive(Debug)]
pub struct QueueStore {
    next_seq: u64,
    primary: BTreeMap<OrderKey, String>,
    retry: BTreeMap<OrderKey, String>,
    entries: HashMap<String, Entry>,
    retry_precedence: bool,
}

impl QueueStore {
    /// Create an empty store.
    ///
    /// With `retry_precedence` enabled (the product default), retry-lane
    /// tickets outrank same-priority primary-lane tickets in cross-lane
    /// dispatch order.
    pub fn new(retry_precedence: bool) -> Self {
        Self {
            next_seq: 0,
            primary: BTreeMap::new(),
            retry: BTreeMap::new(),
            entries: HashMap::new(),
            retry_precedence,
        }
    }

    fn lane_index(&self, lane: Lane) -> &BTreeMap<OrderKey, String> {
        match lane {
            Lane::Primary => &self.primary,
            Lane::Retry => &self.retry,
        }
    }

    fn lane_index_mut(&mut self, lane: Lane) -> &mut BTreeMap<OrderKey, String> {
        match lane {
            Lane::Primary => &mut self.primary,
            Lane::Retry => &mut self.retry,
        }
    }

    fn next_key(&mut self, rank: u8) -> OrderKey {
        let key = OrderKey {
            rank,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        key
    }

    /// Add a ticket to a lane. Returns its 1-based position in that lane.
    pub fn insert(
        &mut self,
        ticket_id: &str,
        priority: Priority,
        lane: Lane,
    ) -> Result<usize, QueueError> {
        if self.entries.contains_key(ticket_id) {
            return Err(QueueError::AlreadyQueued(ticket_id.to_string()));
        }
        let key = self.next_key(priority.rank());
        self.lane_index_mut(lane).insert(key, ticket_id.to_string());
        self.entries
            .insert(ticket_id.to_string(), Entry { lane, key });
        Ok(self.rank_of(lane, key))
    }

    /// Remove a ticket from whichever lane it occupies.
    pub fn remove(&mut self, ticket_id: &str) -> Result<Lane, QueueError> {
        let entry = self
            .entries
            .remove(ticket_id)
            .ok_or_else(|| QueueError::NotQueued(ticket_id.to_string()))?;
        self.lane_index_mut(entry.lane).remove(&entry.key);
        Ok(entry.lane)
    }

    /// Move a ticket to another lane with a fresh sequence number.
    ///
    /// Remove and reinsert happen under the caller's lock, so no reader
    /// ever observes the ticket in zero or two lanes.
    pub fn move_lane(&mut self, ticket_id: &str, to: Lane) -> Result<usize, QueueError> {
        let entry = self
            .entries
            .get(ticket_id)
            .cloned()
            .ok_or_else(|| QueueError::NotQueued(ticket_id.to_string()))?;
        self.lane_index_mut(entry.lane).remove(&entry.key);

        let key = self.next_key(entry.key.rank);
        self.lane_index_mut(to).insert(key, ticket_id.to_string());
        self.entries
            .insert(ticket_id.to_string(), Entry { lane: to, key });
        Ok(self.rank_of(to, key))
    }

    /// The lane a ticket currently occupies.
    pub fn lane_of(&self, ticket_id: &str) -> Option<Lane> {
        self.entries.get(ticket_id).map(|e| e.lane)
    }

    /// 1-based rank of a ticket within its lane.
    pub fn position_of(&self, ticket_id: &str) -> Option<usize> {
        let entry = self.entries.get(ticket_id)?;
        Some(self.rank_of(entry.lane, entry.key))
    }

    fn rank_of(&self, lane: Lane, key: OrderKey) -> usize {
        1 + self.lane_index(lane).range(..key).count()
    }

    /// Ordered ticket ids in a lane at this instant.
    pub fn snapshot(&self, lane: Lane) -> Vec<String> {
        self.lane_index(lane).values().cloned().collect()
    }

    /// Number of tickets in a lane.
    pub fn len(&self, lane: Lane) -> usize {
        self.lane_index(lane).len()
    }

    /// Total number of queued tickets across both lanes.
    pub fn total_len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when both lanes are empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All queued tickets merged into cross-lane dispatch order.
    ///
    /// With retry precedence enabled a retry-lane ticket at priority P
    /// ranks ahead of every primary-lane ticket at priority P; without it
    /// the lanes merge purely on `(priority rank, entry sequence)`.
    pub fn dispatch_order(&self) -> Vec<String> {
        let mut merged: Vec<(&OrderKey, Lane, &String)> = self
            .primary
            .iter()
            .map(|(k, id)| (k, Lane::Primary, id))
            .chain(self.retry.iter().map(|(k, id)| (k, Lane::Retry, id)))
            .collect();

        if self.retry_precedence {
            merged.sort_by_key(|(key, lane, _)| {
                let lane_weight = match lane {
                    Lane::Retry => 0u8,
                    Lane::Primary => 1u8,
                };
                (key.rank, lane_weight, key.seq)
            });
        } else {
            merged.sort_by_key(|(key, _, _)| (key.rank, key.seq));
        }

        merged.into_iter().map(|(_, _, id)| id.clone()).collect()
    }

    /// The next ticket a free doctor should take, if any.
    pub fn peek(&self) -> Option<String> {
        self.dispatch_order().into_iter().next()
    }
}
