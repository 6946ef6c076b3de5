use serde::{Deserialize, Serialize};

use crate::legacy::{lookup::ClientSummary, ObjectId};

/// ERP party offered when filling a ticket's client.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Client {
    pub id: ObjectId,
    pub name: String,
    pub cpf: Option<String>,
    pub phone: String,
    pub email: String,
}

impl From<ClientSummary> for Client {
    fn from(client: ClientSummary) -> Self {
        Self {
            id: client.id,
            name: client.name,
            cpf: client.cpf,
            phone: client.phone,
            email: client.email,
        }
    }
}
