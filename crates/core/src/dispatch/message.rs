//! Queue update messages published to connected dashboards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::{Lane, Priority, Ticket};

/// What happened to the ticket this message is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    /// Ticket entered a lane at intake.
    Add,
    /// Ticket left a lane without a terminal outcome. Part of the dashboard
    /// wire vocabulary; produced by administrative removals, not by the
    /// lifecycle mapping.
    Remove,
    /// Position, lane or retry data changed while the ticket stays active.
    Update,
    /// A staff member took the ticket and a contact attempt is underway.
    Call,
    /// Ticket reached a terminal outcome.
    Complete,
}

impl QueueAction {
    /// Returns the action as a string (for logging and metrics labels).
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAction::Add => "add",
            QueueAction::Remove => "remove",
            QueueAction::Update => "update",
            QueueAction::Call => "call",
            QueueAction::Complete => "complete",
        }
    }
}

/// Logical broadcast topics the dispatcher publishes on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Every queue update.
    QueueUpdates,
    /// Updates concerning the retry lane only.
    RetryQueue,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::QueueUpdates => "queue_updates",
            Topic::RetryQueue => "retry_queue",
        }
    }
}

/// Immutable, append-only snapshot of one committed mutation.
///
/// `seq` is a global monotonic sequence number assigned in commit order;
/// messages for a given ticket are therefore strictly ordered. The patient
/// and status fields are denormalized so dashboards can render without a
/// follow-up fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueUpdateMessage {
    pub seq: u64,
    pub ticket_id: String,
    pub action: QueueAction,
    pub queue_type: Lane,
    pub timestamp: DateTime<Utc>,
    pub patient_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_phone: Option<String>,
    pub priority: Priority,
    pub status: String,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    pub message: String,
}

impl QueueUpdateMessage {
    /// Build a message from a committed ticket state.
    pub fn from_ticket(
        seq: u64,
        ticket: &Ticket,
        action: QueueAction,
        queue_position: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            seq,
            ticket_id: ticket.id.clone(),
            action,
            queue_type: ticket.lane,
            timestamp: ticket.updated_at,
            patient_name: ticket.patient.name.clone(),
            patient_phone: ticket.patient.phone.clone(),
            priority: ticket.priority,
            status: ticket.status.status_type().to_string(),
            retry_count: ticket.retry_count,
            queue_position,
            message: message.into(),
        }
    }

    /// The topics this message is published on.
    ///
    /// Everything goes to the general topic; retry-lane messages are
    /// mirrored to the retry topic as well.
    pub fn topics(&self) -> Vec<Topic> {
        match self.queue_type {
            Lane::Retry => vec![Topic::QueueUpdates, Topic::RetryQueue],
            Lane::Primary => vec![Topic::QueueUpdates],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::{PatientRef, TicketStatus};

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: "t-1".to_string(),
            patient: PatientRef::new("p-1", "Ada Lovelace").with_phone("+44 1"),
            title: "Callback".to_string(),
            description: "Test".to_string(),
            priority: Priority::High,
            category: "consultation".to_string(),
            status: TicketStatus::Open,
            lane: Lane::Primary,
            retry_count: 0,
            call_record_id: None,
            created_by: "reception".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_from_ticket_denormalizes_patient() {
        let msg = QueueUpdateMessage::from_ticket(7, &ticket(), QueueAction::Add, Some(1), "queued");
        assert_eq!(msg.seq, 7);
        assert_eq!(msg.ticket_id, "t-1");
        assert_eq!(msg.patient_name, "Ada Lovelace");
        assert_eq!(msg.patient_phone.as_deref(), Some("+44 1"));
        assert_eq!(msg.status, "open");
        assert_eq!(msg.queue_position, Some(1));
    }

    #[test]
    fn test_primary_message_goes_to_general_topic_only() {
        let msg = QueueUpdateMessage::from_ticket(1, &ticket(), QueueAction::Add, Some(1), "");
        assert_eq!(msg.topics(), vec![Topic::QueueUpdates]);
    }

    #[test]
    fn test_retry_message_mirrors_to_retry_topic() {
        let mut t = ticket();
        t.lane = Lane::Retry;
        t.retry_count = 1;
        let msg = QueueUpdateMessage::from_ticket(2, &t, QueueAction::Update, Some(1), "");
        assert_eq!(msg.topics(), vec![Topic::QueueUpdates, Topic::RetryQueue]);
    }

    #[test]
    fn test_action_serialization() {
        assert_eq!(
            serde_json::to_string(&QueueAction::Complete).unwrap(),
            "\"complete\""
        );
        let parsed: QueueAction = serde_json::from_str("\"call\"").unwrap();
        assert_eq!(parsed, QueueAction::Call);
    }

    #[test]
    fn test_message_serialization_round_trip() {
        let msg = QueueUpdateMessage::from_ticket(3, &ticket(), QueueAction::Call, None, "calling");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"action\":\"call\""));
        assert!(json.contains("\"queue_type\":\"primary\""));
        // queue_position is skipped when not applicable
        assert!(!json.contains("queue_position"));

        let parsed: QueueUpdateMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
