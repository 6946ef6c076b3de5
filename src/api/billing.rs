use serde::{Deserialize, Serialize};

use crate::legacy::ObjectId;

pub use crate::db::ticket::Id as TicketId;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateInput {
    pub ticket_id: TicketId,
}

/// Answer of a successful generation, field names as the ERP users know
/// them.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Generated {
    pub message: String,
    pub numero: i64,
    pub id: ObjectId,
}
