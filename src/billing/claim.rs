use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;

use crate::{
    db::{ticket, Ticket},
    legacy::ObjectId,
};

/// Where billed tickets are read from and written back to.
#[async_trait]
pub trait TicketLedger: Send + Sync {
    type Error: Send;

    async fn load_ticket(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Self::Error>;

    /// Stores the generated document on the ticket unless one is already
    /// stored. Returns `false` in that case.
    async fn record_billing(
        &self,
        id: ticket::Id,
        doc_number: i64,
        doc_id: &ObjectId,
    ) -> Result<bool, Self::Error>;
}

/// Tickets with a service order generation running.
#[derive(Debug, Default)]
pub struct InFlight(Mutex<HashSet<ticket::Id>>);

impl InFlight {
    /// Claims `id` until the returned guard is dropped, or returns `None`
    /// when it is claimed already.
    pub fn claim(&self, id: ticket::Id) -> Option<Claim<'_>> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
            .then(|| Claim { in_flight: self, id })
    }

    pub fn is_claimed(&self, id: ticket::Id) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }
}

#[derive(Debug)]
pub struct Claim<'a> {
    in_flight: &'a InFlight,
    id: ticket::Id,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
