//! Ticket state machine and worked-time accounting.
//!
//! Time is accounted on transitions only: entering a paused status opens a
//! [`Pause`], leaving it closes the pause, and finalizing freezes the net
//! worked minutes. All operations take the current instant explicitly.

use std::error::Error as StdError;

use derive_more::{Display, From};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    db::{
        ticket::{BillingStatus, Id, Note, Number, Pause, Status},
        user, Ticket,
    },
    legacy::ObjectId,
    sequence::{self, CounterStore},
};

/// Input of [`create`].
#[derive(Clone, Debug)]
pub struct NewTicket {
    pub client: String,
    pub reason: String,
    pub technician: String,
    pub solution: Option<String>,
    pub created_by: Option<user::Id>,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ValidationError {
    #[display("client must not be empty")]
    EmptyClient,

    #[display("reason must not be empty")]
    EmptyReason,

    #[display("note must not be empty")]
    EmptyNote,
}

impl StdError for ValidationError {}

#[derive(Debug, Display, From)]
pub enum CreateError<E> {
    #[from]
    #[display("{_0}")]
    Validation(ValidationError),

    #[display("ticket number could not be allocated")]
    Allocation(E),
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum TransitionError {
    #[display("ticket cannot leave status {from} for {to}")]
    Terminal { from: Status, to: Status },
}

impl StdError for TransitionError {}

/// Ticket already carries a service order.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("ticket was already billed as document {number}")]
pub struct AlreadyBilled {
    pub number: i64,
}

impl StdError for AlreadyBilled {}

/// Validates `new`, allocates the ticket number of the current day and opens
/// the ticket with its clock started at `now`.
///
/// Validation happens before allocation, so rejected input never consumes
/// a number.
pub async fn create<S>(
    store: &S,
    new: NewTicket,
    now: OffsetDateTime,
) -> Result<Ticket, CreateError<S::Error>>
where
    S: CounterStore + ?Sized,
{
    if new.client.trim().is_empty() {
        return Err(ValidationError::EmptyClient.into());
    }
    if new.reason.trim().is_empty() {
        return Err(ValidationError::EmptyReason.into());
    }

    let number = sequence::next_ticket_number(store, now.date())
        .await
        .map_err(CreateError::Allocation)?;
    let ticket = Ticket::open(number, new, now);

    info!(
        number = %ticket.number,
        technician = %ticket.technician,
        "ticket created",
    );
    Ok(ticket)
}

impl Ticket {
    /// Fresh [`Status::InProgress`] ticket.
    pub fn open(number: Number, new: NewTicket, now: OffsetDateTime) -> Self {
        Self {
            id: Id::new(),
            number,
            client: new.client.trim().to_owned(),
            technician: new.technician,
            reason: new.reason.trim().to_owned(),
            solution: new.solution.filter(|s| !s.trim().is_empty()),
            status: Status::InProgress,
            started_at: now,
            ended_at: None,
            total_minutes: 0,
            pauses: Vec::new(),
            notes: Vec::new(),
            billing_doc_number: None,
            billing_doc_id: None,
            billing_status: BillingStatus::Pending,
            created_by: new.created_by,
            created_at: now,
            version: 0,
        }
    }

    /// Moves the ticket into `status` at `now`.
    ///
    /// `reason` labels a pause being opened and defaults to the status name.
    /// Moving into the current status changes nothing.
    pub fn set_status(
        &mut self,
        status: Status,
        reason: Option<String>,
        now: OffsetDateTime,
    ) -> Result<(), TransitionError> {
        let from = self.status;
        if from == status {
            return Ok(());
        }
        let forbidden = from.is_terminal()
            && !(from == Status::Finalized && status == Status::Closed);
        if forbidden {
            return Err(TransitionError::Terminal { from, to: status });
        }

        if status.is_paused() {
            if !from.is_paused() {
                let reason = reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| status.to_string());
                debug!(ticket = %self.number, %reason, "pause opened");
                self.pauses.push(Pause {
                    start: now,
                    end: None,
                    reason,
                });
            }
        } else if let Some(pause) = self.open_pause_mut() {
            pause.end = Some(now);
            debug!(ticket = %self.number, "pause closed");
        }

        if status == Status::Finalized {
            self.ended_at = Some(now);
            self.total_minutes = self.net_minutes(now);
        }
        self.status = status;

        info!(ticket = %self.number, %from, to = %status, "status changed");
        Ok(())
    }

    /// Whole minutes worked between the start and `as_of`, paused intervals
    /// excluded. An open pause counts as running until `as_of`.
    pub fn net_minutes(&self, as_of: OffsetDateTime) -> i64 {
        let paused = self
            .pauses
            .iter()
            .map(|p| p.end.unwrap_or(as_of) - p.start)
            .sum::<time::Duration>();
        (as_of - self.started_at - paused).whole_minutes().max(0)
    }

    pub fn open_pause(&self) -> Option<&Pause> {
        self.pauses.iter().rev().find(|p| p.end.is_none())
    }

    fn open_pause_mut(&mut self) -> Option<&mut Pause> {
        self.pauses.iter_mut().rev().find(|p| p.end.is_none())
    }

    pub fn add_note(
        &mut self,
        text: &str,
        author: &str,
        now: OffsetDateTime,
    ) -> Result<(), ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyNote);
        }
        self.notes.push(Note {
            text: text.to_owned(),
            created_by: author.to_owned(),
            created_at: now,
        });
        Ok(())
    }

    pub fn ensure_not_billed(&self) -> Result<(), AlreadyBilled> {
        match self.billing_doc_number {
            Some(number) => Err(AlreadyBilled { number }),
            None => Ok(()),
        }
    }

    /// Stores the generated service order. An existing one is never
    /// overwritten.
    pub fn mark_billed(
        &mut self,
        number: i64,
        id: ObjectId,
    ) -> Result<(), AlreadyBilled> {
        self.ensure_not_billed()?;
        self.billing_doc_number = Some(number);
        self.billing_doc_id = Some(id);
        self.billing_status = BillingStatus::Billed;
        Ok(())
    }
}
