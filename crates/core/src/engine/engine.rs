//! The ticket lifecycle engine.
//!
//! Sole mutator of ticket state and lane membership. Every mutation runs
//! inside one critical section covering the queue mutation and message
//! construction; nothing inside the lock touches disk or network. The
//! committed messages are handed to the dispatch channel from within the
//! lock (an in-memory send, so commit order is preserved) and the durable
//! repository write happens after release. A committed transition is never
//! rolled back because persistence or publishing failed downstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::dispatch::{Dispatcher, QueueAction, QueueUpdateMessage};
use crate::metrics::{REPOSITORY_FAILURES, TICKET_TRANSITIONS, TRANSITION_REJECTIONS};
use crate::queue::{position_in, shifted, QueueStore};
use crate::ticket::{
    CloseOutcome, Lane, PatientRef, Priority, Ticket, TicketDraft, TicketRepository, TicketStatus,
};

use super::error::TriageError;

/// A ticket together with its live queue position, when it has one.
#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    pub ticket: Ticket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

/// Live queue counters for status endpoints and metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub primary_depth: usize,
    pub retry_depth: usize,
    pub in_progress: usize,
    /// Id of the ticket a free doctor should take next.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_ticket: Option<String>,
}

struct EngineInner {
    queue: QueueStore,
    /// Active (non-closed) tickets. Closed tickets live only in the
    /// durable repository.
    tickets: HashMap<String, Ticket>,
    seq: u64,
}

impl EngineInner {
    fn next_seq(&mut self) -> u64 {
        let s = self.seq;
        self.seq += 1;
        s
    }
}

/// The ticket lifecycle engine.
///
/// Shared across staff API handlers and telephony callbacks; all methods
/// take `&self`.
pub struct TriageEngine {
    config: QueueConfig,
    dispatcher: Dispatcher,
    repository: Arc<dyn TicketRepository>,
    inner: Mutex<EngineInner>,
}

impl TriageEngine {
    /// Create an engine. The dispatcher is constructed first and passed in
    /// here, so there is no post-construction wiring step.
    pub fn new(
        config: QueueConfig,
        dispatcher: Dispatcher,
        repository: Arc<dyn TicketRepository>,
    ) -> Self {
        Self {
            dispatcher,
            repository,
            inner: Mutex::new(EngineInner {
                queue: QueueStore::new(config.retry_precedence),
                tickets: HashMap::new(),
                seq: 0,
            }),
            config,
        }
    }

    /// Rebuild the in-memory queue from the durable repository.
    ///
    /// Open tickets re-enter their recorded lane in `(priority,
    /// created_at)` order; in-progress tickets become addressable again
    /// without lane membership. No events are published.
    pub fn recover(&self) -> Result<usize, TriageError> {
        let stored = self.repository.load_active()?;
        let mut inner = self.inner.lock().unwrap();
        let mut restored = 0;

        for ticket in stored {
            match &ticket.status {
                TicketStatus::Open => {
                    inner
                        .queue
                        .insert(&ticket.id, ticket.priority, ticket.lane)
                        .map_err(|e| TriageError::Storage(e.to_string()))?;
                }
                TicketStatus::InProgress { .. } => {}
                TicketStatus::Closed { .. } => {
                    warn!(ticket_id = %ticket.id, "Repository returned a closed ticket as active, skipping");
                    continue;
                }
            }
            inner.tickets.insert(ticket.id.clone(), ticket);
            restored += 1;
        }

        if restored > 0 {
            info!("Recovered {} active tickets", restored);
        }
        Ok(restored)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Intake a new ticket. It enters the primary lane as `Open`.
    pub fn intake(&self, draft: TicketDraft) -> Result<TicketView, TriageError> {
        let priority = validate_draft(&draft).map_err(reject)?;
        let now = Utc::now();

        let mut patient = PatientRef::new(draft.patient_id, draft.patient_name);
        patient.phone = draft.patient_phone;

        let ticket = Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            patient,
            title: draft.title,
            description: draft.description,
            priority,
            category: draft.category,
            status: TicketStatus::Open,
            lane: Lane::Primary,
            retry_count: 0,
            call_record_id: None,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
        };

        let view = {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.queue.snapshot(Lane::Primary);
            inner
                .queue
                .insert(&ticket.id, ticket.priority, Lane::Primary)
                .map_err(|e| TriageError::Storage(e.to_string()))?;
            let after = inner.queue.snapshot(Lane::Primary);
            let position = position_in(&after, &ticket.id);
            inner.tickets.insert(ticket.id.clone(), ticket.clone());

            let seq = inner.next_seq();
            self.dispatcher.publish(QueueUpdateMessage::from_ticket(
                seq,
                &ticket,
                QueueAction::Add,
                position,
                format!(
                    "Ticket queued at position {}",
                    position.unwrap_or_default()
                ),
            ));
            self.publish_peer_shifts(&mut inner, &before, &after, &ticket.id);

            TicketView {
                ticket: ticket.clone(),
                queue_position: position,
            }
        };

        TICKET_TRANSITIONS.with_label_values(&["intake"]).inc();
        debug!(ticket_id = %view.ticket.id, priority = %view.ticket.priority, "Ticket intaken");
        self.persist(&view.ticket);
        Ok(view)
    }

    /// A staff member claims an open ticket. It leaves the visible queue
    /// but stays addressable by id.
    pub fn assign(&self, ticket_id: &str, staff_id: &str) -> Result<TicketView, TriageError> {
        let now = Utc::now();

        let ticket = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.tickets.contains_key(ticket_id) {
                drop(inner);
                return Err(reject(self.classify_missing(ticket_id, "assign", |_| false)));
            }
            let status = inner.tickets[ticket_id].status.clone();
            if !matches!(status, TicketStatus::Open) {
                return Err(reject(TriageError::InvalidState {
                    ticket_id: ticket_id.to_string(),
                    status: status.status_type().to_string(),
                    operation: "assign".to_string(),
                }));
            }

            let lane = inner
                .queue
                .lane_of(ticket_id)
                .ok_or_else(|| TriageError::Storage(format!("open ticket {} not queued", ticket_id)))?;
            let before = inner.queue.snapshot(lane);
            inner
                .queue
                .remove(ticket_id)
                .map_err(|e| TriageError::Storage(e.to_string()))?;
            let after = inner.queue.snapshot(lane);

            let ticket = inner.tickets.get_mut(ticket_id).unwrap();
            ticket.status = TicketStatus::InProgress {
                assigned_to: staff_id.to_string(),
                assigned_at: now,
            };
            ticket.updated_at = now;
            let ticket = ticket.clone();

            let seq = inner.next_seq();
            self.dispatcher.publish(QueueUpdateMessage::from_ticket(
                seq,
                &ticket,
                QueueAction::Call,
                None,
                format!("Contact attempt started by {}", staff_id),
            ));
            self.publish_peer_shifts(&mut inner, &before, &after, ticket_id);

            ticket
        };

        TICKET_TRANSITIONS.with_label_values(&["assign"]).inc();
        debug!(ticket_id, staff_id, "Ticket assigned");
        self.persist(&ticket);
        Ok(TicketView {
            ticket,
            queue_position: None,
        })
    }

    /// A contact attempt succeeded; close the ticket as resolved.
    pub fn complete(
        &self,
        ticket_id: &str,
        resolved_by: &str,
        call_record_id: Option<String>,
    ) -> Result<TicketView, TriageError> {
        let now = Utc::now();

        let ticket = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.tickets.contains_key(ticket_id) {
                drop(inner);
                return Err(reject(self.classify_missing(ticket_id, "complete", |o| {
                    matches!(o, CloseOutcome::Resolved { .. })
                })));
            }
            let status = inner.tickets[ticket_id].status.clone();
            if !matches!(status, TicketStatus::InProgress { .. }) {
                return Err(reject(TriageError::InvalidState {
                    ticket_id: ticket_id.to_string(),
                    status: status.status_type().to_string(),
                    operation: "complete".to_string(),
                }));
            }

            let mut ticket = inner.tickets.remove(ticket_id).unwrap();
            ticket.status = TicketStatus::Closed {
                outcome: CloseOutcome::Resolved {
                    resolved_by: resolved_by.to_string(),
                },
                resolved_at: now,
            };
            if call_record_id.is_some() {
                ticket.call_record_id = call_record_id;
            }
            ticket.updated_at = now;

            let seq = inner.next_seq();
            self.dispatcher.publish(QueueUpdateMessage::from_ticket(
                seq,
                &ticket,
                QueueAction::Complete,
                None,
                format!("Ticket resolved by {}", resolved_by),
            ));

            ticket
        };

        TICKET_TRANSITIONS.with_label_values(&["complete"]).inc();
        info!(ticket_id, resolved_by, "Ticket resolved");
        self.persist(&ticket);
        Ok(TicketView {
            ticket,
            queue_position: None,
        })
    }

    /// A contact attempt failed. The ticket re-enters the retry lane with
    /// a fresh sequence number, or escalates and closes once the attempt
    /// budget is exhausted.
    pub fn mark_failed(
        &self,
        ticket_id: &str,
        call_record_id: Option<String>,
    ) -> Result<TicketView, TriageError> {
        let now = Utc::now();
        let max_retries = self.config.max_retries;

        let (view, escalated) = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.tickets.contains_key(ticket_id) {
                drop(inner);
                return Err(reject(self.classify_missing(ticket_id, "mark failed", |o| {
                    matches!(o, CloseOutcome::Escalated)
                })));
            }
            let (status, retry_count) = {
                let existing = &inner.tickets[ticket_id];
                (existing.status.clone(), existing.retry_count)
            };
            if !matches!(status, TicketStatus::InProgress { .. }) {
                return Err(reject(TriageError::InvalidState {
                    ticket_id: ticket_id.to_string(),
                    status: status.status_type().to_string(),
                    operation: "mark failed".to_string(),
                }));
            }

            let escalate = retry_count + 1 >= max_retries;
            if escalate {
                let mut ticket = inner.tickets.remove(ticket_id).unwrap();
                ticket.retry_count += 1;
                ticket.status = TicketStatus::Closed {
                    outcome: CloseOutcome::Escalated,
                    resolved_at: now,
                };
                if call_record_id.is_some() {
                    ticket.call_record_id = call_record_id;
                }
                ticket.updated_at = now;

                let seq = inner.next_seq();
                self.dispatcher.publish(QueueUpdateMessage::from_ticket(
                    seq,
                    &ticket,
                    QueueAction::Complete,
                    None,
                    format!(
                        "Contact attempts exhausted after {} tries, ticket escalated",
                        ticket.retry_count
                    ),
                ));

                (
                    TicketView {
                        ticket,
                        queue_position: None,
                    },
                    true,
                )
            } else {
                let before = inner.queue.snapshot(Lane::Retry);
                {
                    let ticket = inner.tickets.get_mut(ticket_id).unwrap();
                    ticket.retry_count += 1;
                    ticket.status = TicketStatus::Open;
                    ticket.lane = Lane::Retry;
                    if call_record_id.is_some() {
                        ticket.call_record_id = call_record_id;
                    }
                    ticket.updated_at = now;
                }
                let priority = inner.tickets[ticket_id].priority;
                inner
                    .queue
                    .insert(ticket_id, priority, Lane::Retry)
                    .map_err(|e| TriageError::Storage(e.to_string()))?;
                let after = inner.queue.snapshot(Lane::Retry);
                let position = position_in(&after, ticket_id);
                let ticket = inner.tickets[ticket_id].clone();

                let seq = inner.next_seq();
                self.dispatcher.publish(QueueUpdateMessage::from_ticket(
                    seq,
                    &ticket,
                    QueueAction::Update,
                    position,
                    format!(
                        "Contact attempt failed, requeued for retry ({}/{})",
                        ticket.retry_count, max_retries
                    ),
                ));
                self.publish_peer_shifts(&mut inner, &before, &after, ticket_id);

                (
                    TicketView {
                        ticket,
                        queue_position: position,
                    },
                    false,
                )
            }
        };

        if escalated {
            TICKET_TRANSITIONS.with_label_values(&["escalate"]).inc();
            warn!(ticket_id, retries = view.ticket.retry_count, "Ticket escalated");
        } else {
            TICKET_TRANSITIONS.with_label_values(&["fail"]).inc();
            debug!(ticket_id, retries = view.ticket.retry_count, "Ticket requeued for retry");
        }
        self.persist(&view.ticket);
        Ok(view)
    }

    /// Cancel an open or in-progress ticket.
    pub fn cancel(
        &self,
        ticket_id: &str,
        cancelled_by: Option<String>,
    ) -> Result<TicketView, TriageError> {
        let now = Utc::now();

        let ticket = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.tickets.contains_key(ticket_id) {
                drop(inner);
                return Err(reject(self.classify_missing(ticket_id, "cancel", |o| {
                    matches!(o, CloseOutcome::Cancelled { .. })
                })));
            }

            // An open ticket leaves its lane; an in-progress one already has.
            let lane_diff = if let Some(lane) = inner.queue.lane_of(ticket_id) {
                let before = inner.queue.snapshot(lane);
                inner
                    .queue
                    .remove(ticket_id)
                    .map_err(|e| TriageError::Storage(e.to_string()))?;
                let after = inner.queue.snapshot(lane);
                Some((before, after))
            } else {
                None
            };

            let mut ticket = inner.tickets.remove(ticket_id).unwrap();
            ticket.status = TicketStatus::Closed {
                outcome: CloseOutcome::Cancelled {
                    cancelled_by: cancelled_by.clone(),
                },
                resolved_at: now,
            };
            ticket.updated_at = now;

            let seq = inner.next_seq();
            self.dispatcher.publish(QueueUpdateMessage::from_ticket(
                seq,
                &ticket,
                QueueAction::Complete,
                None,
                "Ticket cancelled".to_string(),
            ));
            if let Some((before, after)) = lane_diff {
                self.publish_peer_shifts(&mut inner, &before, &after, ticket_id);
            }

            ticket
        };

        TICKET_TRANSITIONS.with_label_values(&["cancel"]).inc();
        info!(ticket_id, "Ticket cancelled");
        self.persist(&ticket);
        Ok(TicketView {
            ticket,
            queue_position: None,
        })
    }

    // ========================================================================
    // Read paths
    // ========================================================================

    /// Fetch a ticket by id. Falls back to the durable repository for
    /// closed tickets, which are evicted from the active set.
    pub fn get(&self, ticket_id: &str) -> Result<Option<TicketView>, TriageError> {
        {
            let inner = self.inner.lock().unwrap();
            if let Some(ticket) = inner.tickets.get(ticket_id) {
                let queue_position = inner.queue.position_of(ticket_id);
                return Ok(Some(TicketView {
                    ticket: ticket.clone(),
                    queue_position,
                }));
            }
        }
        let stored = self.repository.get(ticket_id)?;
        Ok(stored.map(|ticket| TicketView {
            ticket,
            queue_position: None,
        }))
    }

    /// 1-based position of a queued ticket within its lane.
    pub fn position_of(&self, ticket_id: &str) -> Option<usize> {
        self.inner.lock().unwrap().queue.position_of(ticket_id)
    }

    /// Ordered view of one lane.
    pub fn lane_snapshot(&self, lane: Lane) -> Vec<TicketView> {
        let inner = self.inner.lock().unwrap();
        inner
            .queue
            .snapshot(lane)
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| {
                inner.tickets.get(id).map(|ticket| TicketView {
                    ticket: ticket.clone(),
                    queue_position: Some(idx + 1),
                })
            })
            .collect()
    }

    /// Both lanes merged into cross-lane dispatch order.
    pub fn dispatch_order(&self) -> Vec<TicketView> {
        let inner = self.inner.lock().unwrap();
        inner
            .queue
            .dispatch_order()
            .iter()
            .filter_map(|id| {
                inner.tickets.get(id).map(|ticket| TicketView {
                    ticket: ticket.clone(),
                    queue_position: inner.queue.position_of(id),
                })
            })
            .collect()
    }

    /// All active tickets (queued and in progress), oldest first.
    pub fn active_tickets(&self) -> Vec<TicketView> {
        let inner = self.inner.lock().unwrap();
        let mut views: Vec<TicketView> = inner
            .tickets
            .values()
            .map(|ticket| TicketView {
                ticket: ticket.clone(),
                queue_position: inner.queue.position_of(&ticket.id),
            })
            .collect();
        views.sort_by(|a, b| a.ticket.created_at.cmp(&b.ticket.created_at));
        views
    }

    /// Live queue counters.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            primary_depth: inner.queue.len(Lane::Primary),
            retry_depth: inner.queue.len(Lane::Retry),
            in_progress: inner
                .tickets
                .values()
                .filter(|t| matches!(t.status, TicketStatus::InProgress { .. }))
                .count(),
            next_ticket: inner.queue.peek(),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// One Update event per peer whose rank shifted in the mutated lane,
    /// inside the same atomic window as the primary message.
    fn publish_peer_shifts(
        &self,
        inner: &mut EngineInner,
        before: &[String],
        after: &[String],
        mutated_id: &str,
    ) {
        for shift in shifted(before, after) {
            if shift.ticket_id == mutated_id {
                continue;
            }
            let Some(peer) = inner.tickets.get(&shift.ticket_id).cloned() else {
                continue;
            };
            let seq = inner.next_seq();
            self.dispatcher.publish(QueueUpdateMessage::from_ticket(
                seq,
                &peer,
                QueueAction::Update,
                Some(shift.position),
                "Queue position updated".to_string(),
            ));
        }
    }

    /// Forward a committed transition to the durable repository. Failures
    /// are logged and counted; the in-memory commit stands.
    fn persist(&self, ticket: &Ticket) {
        if let Err(e) = self.repository.upsert(ticket) {
            REPOSITORY_FAILURES.inc();
            tracing::error!(ticket_id = %ticket.id, "Failed to persist ticket transition: {}", e);
        }
    }

    /// Classify an id that is absent from the active set: closed tickets
    /// live only in the repository, so the replay of a terminal transition
    /// is told apart from a genuinely unknown id out here, off the lock.
    fn classify_missing(
        &self,
        ticket_id: &str,
        operation: &str,
        same_transition: impl Fn(&CloseOutcome) -> bool,
    ) -> TriageError {
        match self.repository.get(ticket_id) {
            Ok(Some(ticket)) => match &ticket.status {
                TicketStatus::Closed { outcome, .. } if same_transition(outcome) => {
                    TriageError::Conflict {
                        ticket_id: ticket_id.to_string(),
                        operation: operation.to_string(),
                    }
                }
                TicketStatus::Closed { .. } => TriageError::InvalidState {
                    ticket_id: ticket_id.to_string(),
                    status: "closed".to_string(),
                    operation: operation.to_string(),
                },
                _ => TriageError::Storage(format!(
                    "ticket {} present in repository but missing from engine",
                    ticket_id
                )),
            },
            Ok(None) => TriageError::NotFound(ticket_id.to_string()),
            Err(e) => TriageError::Storage(e.to_string()),
        }
    }
}

/// Intake validation: required draft fields must be present.
fn validate_draft(draft: &TicketDraft) -> Result<Priority, TriageError> {
    let mut missing = Vec::new();
    if draft.title.trim().is_empty() {
        missing.push("title");
    }
    if draft.description.trim().is_empty() {
        missing.push("description");
    }
    if draft.patient_id.trim().is_empty() {
        missing.push("patient_id");
    }
    if draft.patient_name.trim().is_empty() {
        missing.push("patient_name");
    }
    let priority = match draft.priority {
        Some(p) => Some(p),
        None => {
            missing.push("priority");
            None
        }
    };

    if missing.is_empty() {
        Ok(priority.unwrap())
    } else {
        Err(TriageError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Count a rejected transition and pass the error through.
fn reject(err: TriageError) -> TriageError {
    TRANSITION_REJECTIONS.with_label_values(&[err.kind()]).inc();
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::{Priority, SqliteTicketRepository};
    use tokio::sync::mpsc;

    fn engine_with_events(max_retries: u32) -> (TriageEngine, mpsc::Receiver<QueueUpdateMessage>) {
        let (tx, rx) = mpsc::channel(256);
        let repository = Arc::new(SqliteTicketRepository::in_memory().unwrap());
        let config = QueueConfig {
            max_retries,
            retry_precedence: true,
        };
        (
            TriageEngine::new(config, Dispatcher::new(tx), repository),
            rx,
        )
    }

    fn draft(patient: &str, priority: Priority) -> TicketDraft {
        TicketDraft {
            patient_id: format!("p-{}", patient),
            patient_name: patient.to_string(),
            patient_phone: Some("+1 555 0100".to_string()),
            title: "Callback request".to_string(),
            description: "Patient asked for a callback".to_string(),
            priority: Some(priority),
            category: "consultation".to_string(),
            created_by: "reception".to_string(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<QueueUpdateMessage>) -> Vec<QueueUpdateMessage> {
        let mut messages = Vec::new();
        while let Ok(m) = rx.try_recv() {
            messages.push(m);
        }
        messages
    }

    #[test]
    fn test_intake_rejects_incomplete_draft() {
        let (engine, _rx) = engine_with_events(3);
        let incomplete = TicketDraft {
            title: "Only a title".to_string(),
            ..TicketDraft::default()
        };

        let err = engine.intake(incomplete).unwrap_err();
        assert_eq!(err.kind(), "validation");
        let text = err.to_string();
        assert!(text.contains("description"));
        assert!(text.contains("patient_id"));
        assert!(text.contains("priority"));
        assert!(!text.contains("title,"));
    }

    #[test]
    fn test_intake_queues_in_primary_at_position() {
        let (engine, mut rx) = engine_with_events(3);

        let first = engine.intake(draft("ada", Priority::Medium)).unwrap();
        assert_eq!(first.queue_position, Some(1));
        assert_eq!(first.ticket.lane, Lane::Primary);
        assert_eq!(first.ticket.status, TicketStatus::Open);

        let second = engine.intake(draft("grace", Priority::Medium)).unwrap();
        assert_eq!(second.queue_position, Some(2));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.action == QueueAction::Add));
    }

    #[test]
    fn test_high_priority_intake_shifts_peers() {
        let (engine, mut rx) = engine_with_events(3);
        let low = engine.intake(draft("low", Priority::Low)).unwrap();
        let med = engine.intake(draft("med", Priority::Medium)).unwrap();
        drain(&mut rx);

        let high = engine.intake(draft("high", Priority::High)).unwrap();
        assert_eq!(high.queue_position, Some(1));

        let events = drain(&mut rx);
        // One Add for the new head plus one Update per displaced peer.
        assert_eq!(events[0].action, QueueAction::Add);
        assert_eq!(events[0].queue_position, Some(1));
        let updates: Vec<_> = events[1..].iter().collect();
        assert_eq!(updates.len(), 2);
        assert!(updates
            .iter()
            .any(|e| e.ticket_id == med.ticket.id && e.queue_position == Some(2)));
        assert!(updates
            .iter()
            .any(|e| e.ticket_id == low.ticket.id && e.queue_position == Some(3)));
    }

    #[test]
    fn test_assign_removes_from_lane_and_promotes_peer() {
        let (engine, mut rx) = engine_with_events(3);
        let t1 = engine.intake(draft("ada", Priority::Medium)).unwrap();
        let t2 = engine.intake(draft("grace", Priority::Medium)).unwrap();
        drain(&mut rx);

        let assigned = engine.assign(&t1.ticket.id, "dr-house").unwrap();
        assert_eq!(assigned.ticket.status.assigned_to(), Some("dr-house"));
        assert!(assigned.queue_position.is_none());
        assert_eq!(engine.position_of(&t2.ticket.id), Some(1));

        let events = drain(&mut rx);
        assert_eq!(events[0].action, QueueAction::Call);
        assert!(events[0].queue_position.is_none());
        assert_eq!(events[1].action, QueueAction::Update);
        assert_eq!(events[1].ticket_id, t2.ticket.id);
        assert_eq!(events[1].queue_position, Some(1));
    }

    #[test]
    fn test_assign_unknown_ticket() {
        let (engine, _rx) = engine_with_events(3);
        let err = engine.assign("ghost", "dr-a").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_assign_requires_open_status() {
        let (engine, _rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();
        engine.assign(&t.ticket.id, "dr-a").unwrap();

        let err = engine.assign(&t.ticket.id, "dr-b").unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_complete_requires_in_progress() {
        let (engine, _rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();

        let err = engine.complete(&t.ticket.id, "dr-a", None).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_complete_closes_and_replaying_conflicts() {
        let (engine, mut rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();
        engine.assign(&t.ticket.id, "dr-a").unwrap();
        drain(&mut rx);

        let done = engine
            .complete(&t.ticket.id, "dr-a", Some("call-7".to_string()))
            .unwrap();
        assert!(done.ticket.is_closed());
        assert_eq!(done.ticket.call_record_id.as_deref(), Some("call-7"));

        // The exact same terminal transition replayed is a conflict.
        let err = engine.complete(&t.ticket.id, "dr-a", None).unwrap_err();
        assert_eq!(err.kind(), "conflict");

        // Exactly one Complete event was published.
        let events = drain(&mut rx);
        let completes: Vec<_> = events
            .iter()
            .filter(|e| e.action == QueueAction::Complete)
            .collect();
        assert_eq!(completes.len(), 1);
    }

    #[test]
    fn test_cancel_after_complete_is_invalid_state_not_conflict() {
        let (engine, _rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();
        engine.assign(&t.ticket.id, "dr-a").unwrap();
        engine.complete(&t.ticket.id, "dr-a", None).unwrap();

        let err = engine.cancel(&t.ticket.id, None).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_mark_failed_requeues_into_retry() {
        let (engine, mut rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();
        engine.assign(&t.ticket.id, "dr-a").unwrap();
        drain(&mut rx);

        let failed = engine.mark_failed(&t.ticket.id, None).unwrap();
        assert_eq!(failed.ticket.status, TicketStatus::Open);
        assert_eq!(failed.ticket.lane, Lane::Retry);
        assert_eq!(failed.ticket.retry_count, 1);
        assert_eq!(failed.queue_position, Some(1));

        let events = drain(&mut rx);
        assert_eq!(events[0].action, QueueAction::Update);
        assert_eq!(events[0].queue_type, Lane::Retry);
        assert_eq!(events[0].retry_count, 1);
    }

    #[test]
    fn test_mark_failed_requires_in_progress() {
        let (engine, _rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();

        let err = engine.mark_failed(&t.ticket.id, None).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_max_retries_escalates_and_never_requeues() {
        let (engine, mut rx) = engine_with_events(2);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();
        let id = t.ticket.id.clone();

        engine.assign(&id, "dr-a").unwrap();
        let first = engine.mark_failed(&id, None).unwrap();
        assert_eq!(first.ticket.retry_count, 1);
        assert!(!first.ticket.is_closed());

        engine.assign(&id, "dr-a").unwrap();
        drain(&mut rx);
        let second = engine.mark_failed(&id, None).unwrap();
        assert_eq!(second.ticket.retry_count, 2);
        assert!(second.ticket.is_closed());
        assert!(matches!(
            second.ticket.status,
            TicketStatus::Closed {
                outcome: CloseOutcome::Escalated,
                ..
            }
        ));

        // Escalation publishes Complete and the ticket never re-enters a lane.
        let events = drain(&mut rx);
        assert_eq!(events[0].action, QueueAction::Complete);
        let stats = engine.stats();
        assert_eq!(stats.retry_depth, 0);
        assert_eq!(stats.primary_depth, 0);

        // Replaying the transition that escalated it is a conflict.
        let err = engine.mark_failed(&id, None).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_cancel_open_ticket_leaves_queue() {
        let (engine, mut rx) = engine_with_events(3);
        let t1 = engine.intake(draft("ada", Priority::Medium)).unwrap();
        let t2 = engine.intake(draft("grace", Priority::Medium)).unwrap();
        drain(&mut rx);

        let cancelled = engine
            .cancel(&t1.ticket.id, Some("reception".to_string()))
            .unwrap();
        assert!(cancelled.ticket.is_closed());
        assert_eq!(engine.position_of(&t2.ticket.id), Some(1));

        let events = drain(&mut rx);
        assert_eq!(events[0].action, QueueAction::Complete);
        assert_eq!(events[1].ticket_id, t2.ticket.id);
        assert_eq!(events[1].queue_position, Some(1));

        // Cancelling again replays the same terminal transition.
        let err = engine.cancel(&t1.ticket.id, None).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_event_sequence_is_monotonic() {
        let (engine, mut rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::High)).unwrap();
        engine.intake(draft("grace", Priority::Low)).unwrap();
        engine.assign(&t.ticket.id, "dr-a").unwrap();
        engine.complete(&t.ticket.id, "dr-a", None).unwrap();

        let seqs: Vec<u64> = drain(&mut rx).iter().map(|e| e.seq).collect();
        assert!(!seqs.is_empty());
        for pair in seqs.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_retried_ticket_outranks_fresh_same_priority() {
        let (engine, _rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();
        engine.assign(&t.ticket.id, "dr-a").unwrap();
        engine.mark_failed(&t.ticket.id, None).unwrap();

        let fresh = engine.intake(draft("grace", Priority::Medium)).unwrap();

        let order: Vec<String> = engine
            .dispatch_order()
            .into_iter()
            .map(|v| v.ticket.id)
            .collect();
        assert_eq!(order, vec![t.ticket.id.clone(), fresh.ticket.id.clone()]);
    }

    #[test]
    fn test_get_falls_back_to_repository_for_closed() {
        let (engine, _rx) = engine_with_events(3);
        let t = engine.intake(draft("ada", Priority::Medium)).unwrap();
        engine.assign(&t.ticket.id, "dr-a").unwrap();
        engine.complete(&t.ticket.id, "dr-a", None).unwrap();

        let view = engine.get(&t.ticket.id).unwrap().unwrap();
        assert!(view.ticket.is_closed());
        assert!(view.queue_position.is_none());

        assert!(engine.get("ghost").unwrap().is_none());
    }

    #[test]
    fn test_recover_rebuilds_queue_from_repository() {
        let repository = Arc::new(SqliteTicketRepository::in_memory().unwrap());
        let config = QueueConfig {
            max_retries: 3,
            retry_precedence: true,
        };

        let (id_high, id_low, id_busy) = {
            let engine = TriageEngine::new(
                config.clone(),
                Dispatcher::disconnected(),
                Arc::clone(&repository) as Arc<dyn TicketRepository>,
            );
            let low = engine.intake(draft("low", Priority::Low)).unwrap();
            let high = engine.intake(draft("high", Priority::High)).unwrap();
            let busy = engine.intake(draft("busy", Priority::Medium)).unwrap();
            engine.assign(&busy.ticket.id, "dr-a").unwrap();
            (high.ticket.id, low.ticket.id, busy.ticket.id)
        };

        let engine = TriageEngine::new(
            config,
            Dispatcher::disconnected(),
            Arc::clone(&repository) as Arc<dyn TicketRepository>,
        );
        let restored = engine.recover().unwrap();
        assert_eq!(restored, 3);

        // Queue order rebuilt by (priority, created_at); the assigned
        // ticket is addressable but not queued.
        let snapshot: Vec<String> = engine
            .lane_snapshot(Lane::Primary)
            .into_iter()
            .map(|v| v.ticket.id)
            .collect();
        assert_eq!(snapshot, vec![id_high, id_low]);

        let busy = engine.get(&id_busy).unwrap().unwrap();
        assert_eq!(busy.ticket.status.assigned_to(), Some("dr-a"));
        assert!(busy.queue_position.is_none());

        let stats = engine.stats();
        assert_eq!(stats.primary_depth, 2);
        assert_eq!(stats.in_progress, 1);
    }

    #[test]
    fn test_stats_reflect_queue_state() {
        let (engine, _rx) = engine_with_events(3);
        let t1 = engine.intake(draft("ada", Priority::High)).unwrap();
        engine.intake(draft("grace", Priority::Low)).unwrap();
        engine.assign(&t1.ticket.id, "dr-a").unwrap();
        engine.mark_failed(&t1.ticket.id, None).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.primary_depth, 1);
        assert_eq!(stats.retry_depth, 1);
        assert_eq!(stats.in_progress, 0);
        assert_eq!(stats.next_ticket, Some(t1.ticket.id));
    }
}
