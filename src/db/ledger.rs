use async_trait::async_trait;
use tokio_postgres::Error;

use crate::{billing::TicketLedger, legacy::ObjectId};

use super::{ticket, Client, Ticket};

#[async_trait]
impl TicketLedger for Client {
    type Error = Error;

    async fn load_ticket(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error> {
        self.get_ticket_by_id(id).await
    }

    async fn record_billing(
        &self,
        id: ticket::Id,
        doc_number: i64,
        doc_id: &ObjectId,
    ) -> Result<bool, Error> {
        Client::record_billing(self, id, doc_number, doc_id).await
    }
}
