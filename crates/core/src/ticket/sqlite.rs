//! SQLite-backed durable ticket repository.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{Lane, PatientRef, Priority, RepositoryError, Ticket, TicketRepository, TicketStatus};

/// SQLite-backed ticket repository.
pub struct SqliteTicketRepository {
    conn: Mutex<Connection>,
}

impl SqliteTicketRepository {
    /// Open (or create) the database file and bootstrap the schema.
    pub fn new(path: &Path) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(|e| RepositoryError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory repository (useful for testing).
    pub fn in_memory() -> Result<Self, RepositoryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| RepositoryError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RepositoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                patient TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                priority TEXT NOT NULL,
                priority_rank INTEGER NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL,
                lane TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                call_record_id TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_priority_rank ON tickets(priority_rank);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at);
            "#,
        )
        .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        Ok(())
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let id: String = row.get(0)?;
        let patient_json: String = row.get(1)?;
        let title: String = row.get(2)?;
        let description: String = row.get(3)?;
        let priority_str: String = row.get(4)?;
        let category: String = row.get(6)?;
        let status_json: String = row.get(7)?;
        let lane_str: String = row.get(8)?;
        let retry_count: u32 = row.get(9)?;
        let call_record_id: Option<String> = row.get(10)?;
        let created_by: String = row.get(11)?;
        let created_at_str: String = row.get(12)?;
        let updated_at_str: String = row.get(13)?;

        // Parse timestamps - use now if parsing fails (shouldn't happen with valid data)
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        // Parse JSON and enum columns - these should never fail with valid data
        let patient: PatientRef =
            serde_json::from_str(&patient_json).unwrap_or_else(|_| PatientRef::new("", ""));
        let status: TicketStatus =
            serde_json::from_str(&status_json).unwrap_or(TicketStatus::Open);
        let priority = match priority_str.as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        };
        let lane = lane_str.parse::<Lane>().unwrap_or(Lane::Primary);

        Ok(Ticket {
            id,
            patient,
            title,
            description,
            priority,
            category,
            status,
            lane,
            retry_count,
            call_record_id,
            created_by,
            created_at,
            updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, patient, title, description, priority, priority_rank, \
     category, status, lane, retry_count, call_record_id, created_by, created_at, updated_at";

impl TicketRepository for SqliteTicketRepository {
    fn upsert(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();

        let patient_json = serde_json::to_string(&ticket.patient)
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let status_json = serde_json::to_string(&ticket.status)
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO tickets (id, patient, title, description, priority, \
             priority_rank, category, status, lane, retry_count, call_record_id, created_by, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                ticket.id,
                patient_json,
                ticket.title,
                ticket.description,
                ticket.priority.as_str(),
                ticket.priority.rank(),
                ticket.category,
                status_json,
                ticket.lane.as_str(),
                ticket.retry_count,
                ticket.call_record_id,
                ticket.created_by,
                ticket.created_at.to_rfc3339(),
                ticket.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, RepositoryError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_ticket,
        );

        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RepositoryError::Storage(e.to_string())),
        }
    }

    fn load_active(&self) -> Result<Vec<Ticket>, RepositoryError> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {} FROM tickets WHERE json_extract(status, '$.type') != 'closed' \
             ORDER BY priority_rank ASC, created_at ASC",
            SELECT_COLUMNS
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_ticket)
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        let mut tickets = Vec::new();
        for row_result in rows {
            let ticket = row_result.map_err(|e| RepositoryError::Storage(e.to_string()))?;
            tickets.push(ticket);
        }

        Ok(tickets)
    }
}
