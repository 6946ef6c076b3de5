use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{db, legacy::ObjectId};

pub use crate::db::ticket::{BillingStatus, Id, Note, Number, Pause, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub ticket_number: Number,
    pub client: String,
    pub technician: String,
    pub reason: String,
    pub solution: Option<String>,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date_time: Option<OffsetDateTime>,
    /// Net worked minutes.
    pub total_time: i64,
    pub pauses: Vec<Pause>,
    pub notes: Vec<Note>,
    pub billing_doc_number: Option<i64>,
    pub billing_doc_id: Option<ObjectId>,
    pub billing_status: BillingStatus,
    pub version: i64,
}

impl From<db::Ticket> for Ticket {
    fn from(ticket: db::Ticket) -> Self {
        Self {
            id: ticket.id,
            ticket_number: ticket.number,
            client: ticket.client,
            technician: ticket.technician,
            reason: ticket.reason,
            solution: ticket.solution,
            status: ticket.status,
            start_date_time: ticket.started_at,
            end_date_time: ticket.ended_at,
            total_time: ticket.total_minutes,
            pauses: ticket.pauses,
            notes: ticket.notes,
            billing_doc_number: ticket.billing_doc_number,
            billing_doc_id: ticket.billing_doc_id,
            billing_status: ticket.billing_status,
            version: ticket.version,
        }
    }
}
