use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    Collection, Error, Filter, ObjectId, Record, Store, TextSearch,
};

/// In-process ERP used for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a JSON object as-is, generating its `_id` when absent.
    pub fn seed(
        &self,
        collection: Collection,
        value: Value,
    ) -> Result<ObjectId, Error> {
        match value {
            Value::Object(record) => Ok(self.insert(collection, record)),
            other => Err(Error::Malformed(format!(
                "expected an object, found {other}"
            ))),
        }
    }

    /// Snapshot of every record of `collection`.
    pub fn records(&self, collection: Collection) -> Vec<Record> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    fn select(
        &self,
        collection: Collection,
        limit: usize,
        predicate: impl Fn(&Record) -> bool,
    ) -> Vec<Record> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&collection)
            .into_iter()
            .flatten()
            .filter(|r| predicate(r))
            .take(limit)
            .cloned()
            .collect()
    }

    fn insert(&self, collection: Collection, mut record: Record) -> ObjectId {
        let id = ObjectId::of(&record).unwrap_or_else(ObjectId::generate);
        record.insert("_id".to_owned(), Value::from(&id));
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection)
            .or_default()
            .push(record);
        id
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Record>, Error> {
        Ok(self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&collection)
            .and_then(|records| records.iter().find(|r| filter.matches(r)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Record>, Error> {
        Ok(self.select(collection, limit, |r| filter.matches(r)))
    }

    async fn search(
        &self,
        collection: Collection,
        filter: &Filter,
        search: &TextSearch<'_>,
        limit: usize,
    ) -> Result<Vec<Record>, Error> {
        Ok(self.select(collection, limit, |r| {
            filter.matches(r) && search.matches(r)
        }))
    }

    async fn insert_one(
        &self,
        collection: Collection,
        record: Record,
    ) -> Result<ObjectId, Error> {
        Ok(self.insert(collection, record))
    }

    async fn increment(
        &self,
        collection: Collection,
        filter: &Filter,
        field: &str,
    ) -> Result<i64, Error> {
        let mut collections =
            self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let records = collections.entry(collection).or_default();

        if let Some(record) = records.iter_mut().find(|r| filter.matches(r)) {
            let current = match record.get(field) {
                None => 0,
                Some(value) => value.as_i64().ok_or_else(|| {
                    Error::Malformed(format!("{field} is not an integer"))
                })?,
            };
            record.insert(field.to_owned(), Value::from(current + 1));
            return Ok(current + 1);
        }

        let mut record = filter.fields().clone();
        record.insert("_id".to_owned(), ObjectId::generate().into());
        record.insert(field.to_owned(), Value::from(1));
        records.push(record);
        Ok(1)
    }
}
