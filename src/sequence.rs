use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use serde_json::json;
use time::Date;

use crate::{
    db::ticket,
    legacy::{self, Collection, Filter, ObjectId},
};

/// Keyed monotonic counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    type Error: Send;

    /// Atomically increments the counter of `scope` and returns the new
    /// value, creating the counter at `1` if it doesn't exist yet.
    async fn increment(&self, scope: &str) -> Result<i64, Self::Error>;
}

/// Allocates the next ticket number of the given calendar day.
pub async fn next_ticket_number<S>(
    store: &S,
    day: Date,
) -> Result<ticket::Number, S::Error>
where
    S: CounterStore + ?Sized,
{
    let seq = store.increment(&ticket_scope(day)).await?;
    Ok(ticket::Number::new(day, seq))
}

/// Allocates the next service order number of the issuing company.
///
/// Numbers live in the ERP's own sequence records, so they never collide
/// with documents issued by the ERP itself.
pub async fn next_document_number<S>(
    store: &S,
    company: &ObjectId,
) -> Result<i64, legacy::Error>
where
    S: legacy::Store + ?Sized,
{
    let filter = Filter::new()
        .eq("EmpresaReferencia", company)
        .eq("_t", json!(["SequenciaMovimentacao", "SequenciaDav"]));
    store
        .increment(Collection::Sequences, &filter, "Contador")
        .await
}

fn ticket_scope(day: Date) -> String {
    format!(
        "ticket:{:04}{:02}{:02}",
        day.year(),
        u8::from(day.month()),
        day.day()
    )
}

/// In-process [`CounterStore`] for development and tests.
#[derive(Debug, Default)]
pub struct MemoryCounters(Mutex<HashMap<String, i64>>);

#[async_trait]
impl CounterStore for MemoryCounters {
    type Error = Infallible;

    async fn increment(&self, scope: &str) -> Result<i64, Self::Error> {
        let mut counters =
            self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let value = counters.entry(scope.to_owned()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
