//! Core ticket data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticket priority for queue ordering.
///
/// Lower rank sorts first: High beats Medium beats Low.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Numeric rank used as the primary queue sort key.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Returns the priority as a lowercase string (for filtering and events).
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two parallel queues an open ticket can occupy.
///
/// Primary holds fresh intakes; Retry holds tickets whose last contact
/// attempt failed and that are waiting for another one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Primary,
    Retry,
}

impl Lane {
    /// Returns the lane as a lowercase string (for events and routing).
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Primary => "primary",
            Lane::Retry => "retry",
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Lane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Lane::Primary),
            "retry" => Ok(Lane::Retry),
            other => Err(format!("unknown lane: {}", other)),
        }
    }
}

/// Reference to the patient a ticket was raised for.
///
/// Name and phone are denormalized into every queue update so dashboards
/// never have to join against the patient registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRef {
    /// Patient identifier in the external registry.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact phone number, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl PatientRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// How a closed ticket ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloseOutcome {
    /// Resolved by a staff member after a successful contact.
    Resolved { resolved_by: String },
    /// Cancelled before resolution.
    Cancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancelled_by: Option<String>,
    },
    /// Contact attempts exhausted; handed off for out-of-band escalation.
    Escalated,
}

impl CloseOutcome {
    /// Returns the outcome as a string (for filtering and events).
    pub fn outcome_type(&self) -> &'static str {
        match self {
            CloseOutcome::Resolved { .. } => "resolved",
            CloseOutcome::Cancelled { .. } => "cancelled",
            CloseOutcome::Escalated => "escalated",
        }
    }
}

/// Current status of a ticket.
///
/// State machine flow:
/// ```text
/// Open -> InProgress -> Closed(Resolved)
///   |         |
///   |         +-> Open (retry lane, failed contact, attempts remaining)
///   |         +-> Closed(Escalated) (attempts exhausted)
///   +-> Closed(Cancelled) (from Open or InProgress)
/// ```
///
/// An in-progress ticket always has an assignee and a closed ticket always
/// has a resolution timestamp; both hold by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketStatus {
    /// Waiting in a lane for a doctor to pick it up.
    Open,

    /// A staff member has claimed the ticket and is handling the contact.
    InProgress {
        assigned_to: String,
        assigned_at: DateTime<Utc>,
    },

    /// Terminal. The ticket no longer occupies any lane.
    Closed {
        outcome: CloseOutcome,
        resolved_at: DateTime<Utc>,
    },
}

impl TicketStatus {
    /// Returns true if this is a terminal status.
    pub fn is_closed(&self) -> bool {
        matches!(self, TicketStatus::Closed { .. })
    }

    /// Returns true while the ticket should be visible in a lane.
    pub fn is_queued(&self) -> bool {
        matches!(self, TicketStatus::Open)
    }

    /// Returns the status as a string (for filtering and events).
    pub fn status_type(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress { .. } => "in_progress",
            TicketStatus::Closed { .. } => "closed",
        }
    }

    /// Assignee, when the ticket is being handled.
    pub fn assigned_to(&self) -> Option<&str> {
        match self {
            TicketStatus::InProgress { assigned_to, .. } => Some(assigned_to),
            _ => None,
        }
    }

    /// Resolution timestamp, once closed.
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TicketStatus::Closed { resolved_at, .. } => Some(*resolved_at),
            _ => None,
        }
    }
}

/// A support ticket in the triage queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Unique identifier (UUID).
    pub id: String,

    /// Patient the ticket was raised for.
    pub patient: PatientRef,

    /// Short summary shown on dashboards.
    pub title: String,

    /// Free-form details.
    pub description: String,

    /// Queue ordering priority.
    pub priority: Priority,

    /// Ticket category (e.g. "consultation", "escalation").
    pub category: String,

    /// Current status.
    pub status: TicketStatus,

    /// The lane the ticket currently occupies, or last occupied.
    ///
    /// Membership itself is authoritative in the queue store; this field
    /// provides lane context for events after the ticket left the queue.
    pub lane: Lane,

    /// Number of failed contact attempts so far. Never decreases.
    pub retry_count: u32,

    /// Linked call record, reported by the telephony integration together
    /// with a contact outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_record_id: Option<String>,

    /// Who raised the ticket.
    pub created_by: String,

    /// When the ticket was created.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Returns true if the ticket reached a terminal state.
    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }
}

/// Draft submitted at intake, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketDraft {
    pub patient_id: String,
    pub patient_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_phone: Option<String>,
    pub title: String,
    pub description: String,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: String,
    pub created_by: String,
}

impl TicketDraft {
    pub fn new(
        patient: PatientRef,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            patient_id: patient.id,
            patient_name: patient.name,
            patient_phone: patient.phone,
            title: title.into(),
            description: description.into(),
            priority: Some(priority),
            category: "consultation".to_string(),
            created_by: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }
}
