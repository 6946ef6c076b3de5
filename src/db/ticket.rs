use std::error::Error as StdError;

use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, Json,
        ToSql, Type,
    },
    Error, Row,
};
use uuid::Uuid;

use crate::legacy::ObjectId;

use super::{user, Client};

#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,
    pub number: Number,
    pub client: String,
    pub technician: String,
    pub reason: String,
    pub solution: Option<String>,
    pub status: Status,
    pub started_at: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
    /// Net worked minutes, pauses excluded.
    pub total_minutes: i64,
    pub pauses: Vec<Pause>,
    pub notes: Vec<Note>,
    pub billing_doc_number: Option<i64>,
    pub billing_doc_id: Option<ObjectId>,
    pub billing_status: BillingStatus,
    pub created_by: Option<user::Id>,
    pub created_at: OffsetDateTime,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Id(Uuid::new_v4())
    }
}

impl From<u128> for Id {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl FromSql<'_> for Id {
    accepts!(UUID);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Uuid::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(UUID);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

/// Externally visible ticket number: `YYYYMMDD` followed by the sequence
/// of the day, zero-padded to 4 digits.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct Number(String);

impl Number {
    pub fn new(day: Date, seq: i64) -> Self {
        Self(format!(
            "{:04}{:02}{:02}{seq:04}",
            day.year(),
            u8::from(day.month()),
            day.day()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromSql<'_> for Number {
    accepts!(TEXT, VARCHAR);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        String::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Number {
    accepts!(TEXT, VARCHAR);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    TryFromRepr,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
    /// Technician is working, the clock runs.
    #[display("IN_PROGRESS")]
    InProgress = 1,

    /// Work is paused on the technician's side.
    #[display("ON_HOLD")]
    OnHold = 2,

    /// Work is paused until the customer answers.
    #[display("AWAITING_CUSTOMER")]
    AwaitingCustomer = 3,

    /// Work is done and the net time is frozen.
    #[display("FINALIZED")]
    Finalized = 4,

    /// Administratively closed after finalization.
    #[display("CLOSED")]
    Closed = 5,
}

impl Status {
    /// Whether the clock is stopped in this status.
    pub fn is_paused(self) -> bool {
        matches!(self, Self::OnHold | Self::AwaitingCustomer)
    }

    /// Whether the ticket is done with. Only `Finalized -> Closed` leaves a
    /// terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Closed)
    }
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum BillingStatus {
    Pending = 1,

    /// A service order was generated in the ERP.
    Billed = 2,
}

impl FromSql<'_> for BillingStatus {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status =
            Self::try_from(repr).map_err(|_| "invalid billing status")?;
        Ok(status)
    }
}

impl ToSql for BillingStatus {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

/// Interval during which the ticket's clock is stopped. An open pause has
/// no `end`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pause {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end: Option<OffsetDateTime>,
    pub reason: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub text: String,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const COLUMNS: &str = "\
    id, number, client, technician, reason, solution, status, \
    started_at, ended_at, total_minutes, pauses, notes, \
    billing_doc_number, billing_doc_id, billing_status, \
    created_by, created_at, version";

fn ticket_from_row(row: &Row) -> Result<Ticket, Error> {
    Ok(Ticket {
        id: row.try_get("id")?,
        number: row.try_get("number")?,
        client: row.try_get("client")?,
        technician: row.try_get("technician")?,
        reason: row.try_get("reason")?,
        solution: row.try_get("solution")?,
        status: row.try_get("status")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        total_minutes: row.try_get("total_minutes")?,
        pauses: row.try_get::<_, Json<Vec<Pause>>>("pauses")?.0,
        notes: row.try_get::<_, Json<Vec<Note>>>("notes")?.0,
        billing_doc_number: row.try_get("billing_doc_number")?,
        billing_doc_id: row.try_get("billing_doc_id")?,
        billing_status: row.try_get("billing_status")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        version: row.try_get("version")?,
    })
}

impl Client {
    pub async fn get_ticket_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Ticket>, Error> {
        let sql = format!("SELECT {COLUMNS} FROM tickets WHERE id = $1");
        self.0
            .query_opt(&sql, &[&id])
            .await?
            .map(|row| ticket_from_row(&row))
            .transpose()
    }

    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), Error> {
        let sql = format!(
            "INSERT INTO tickets ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
                     $11, $12, $13, $14, $15, $16, $17, $18)"
        );

        self.0
            .execute(
                &sql,
                &[
                    &ticket.id,
                    &ticket.number,
                    &ticket.client,
                    &ticket.technician,
                    &ticket.reason,
                    &ticket.solution,
                    &ticket.status,
                    &ticket.started_at,
                    &ticket.ended_at,
                    &ticket.total_minutes,
                    &Json(&ticket.pauses),
                    &Json(&ticket.notes),
                    &ticket.billing_doc_number,
                    &ticket.billing_doc_id,
                    &ticket.billing_status,
                    &ticket.created_by,
                    &ticket.created_at,
                    &ticket.version,
                ],
            )
            .await
            .map(drop)
    }

    /// Writes the mutable part of `ticket` if nobody else wrote it since it
    /// was read. Returns `false` when the stored version moved on.
    ///
    /// Billing columns are left alone, see [`Client::record_billing`].
    pub async fn update_ticket(&self, ticket: &Ticket) -> Result<bool, Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET client = $3, \
                technician = $4, \
                reason = $5, \
                solution = $6, \
                status = $7, \
                started_at = $8, \
                ended_at = $9, \
                total_minutes = $10, \
                pauses = $11, \
                notes = $12, \
                version = version + 1 \
            WHERE id = $1 \
              AND version = $2";

        self.0
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.version,
                    &ticket.client,
                    &ticket.technician,
                    &ticket.reason,
                    &ticket.solution,
                    &ticket.status,
                    &ticket.started_at,
                    &ticket.ended_at,
                    &ticket.total_minutes,
                    &Json(&ticket.pauses),
                    &Json(&ticket.notes),
                ],
            )
            .await
            .map(|updated| updated == 1)
    }

    /// Stores the generated service order on the ticket, unless one is
    /// already stored. Returns `false` in that case.
    pub async fn record_billing(
        &self,
        id: Id,
        doc_number: i64,
        doc_id: &ObjectId,
    ) -> Result<bool, Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET billing_doc_number = $2, \
                billing_doc_id = $3, \
                billing_status = $4, \
                version = version + 1 \
            WHERE id = $1 \
              AND billing_doc_number IS NULL";

        self.0
            .execute(
                SQL,
                &[&id, &doc_number, doc_id, &BillingStatus::Billed],
            )
            .await
            .map(|updated| updated == 1)
    }

    pub async fn delete_ticket(&self, id: Id) -> Result<bool, Error> {
        const SQL: &str = "DELETE FROM tickets WHERE id = $1";
        self.0
            .execute(SQL, &[&id])
            .await
            .map(|deleted| deleted == 1)
    }
}
