//! Boundary with the legacy ERP database.
//!
//! The ERP is schema-less: every collection holds loosely shaped records and
//! the core only reads or writes the few fields it needs. Records are kept as
//! raw JSON maps on the way in and typed on the way out (see [`document`]).

pub mod document;
pub mod lookup;
pub mod memory;
pub mod postgres;
pub mod snapshot;

use std::{error::Error as StdError, fmt, str::FromStr};

use async_trait::async_trait;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio_postgres::types::{
    accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql, Type,
};
use uuid::Uuid;

pub use self::{memory::MemoryStore, postgres::PgStore};

/// Raw ERP record.
pub type Record = Map<String, Value>;

/// Access to the ERP collections.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Record>, Error>;

    /// Up to `limit` records matching `filter`.
    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Record>, Error>;

    /// Up to `limit` records matching both `filter` and `search`.
    async fn search(
        &self,
        collection: Collection,
        filter: &Filter,
        search: &TextSearch<'_>,
        limit: usize,
    ) -> Result<Vec<Record>, Error>;

    async fn find_by_id(
        &self,
        collection: Collection,
        id: &ObjectId,
    ) -> Result<Option<Record>, Error> {
        self.find_one(collection, &Filter::by_id(id)).await
    }

    /// Inserts `record`, generating its `_id` when absent.
    async fn insert_one(
        &self,
        collection: Collection,
        record: Record,
    ) -> Result<ObjectId, Error>;

    /// Finds the first record matching `filter`, increments its integer
    /// `field` and returns the new value in a single atomic step. A missing
    /// record is created from the filter fields with `field` set to `1`.
    async fn increment(
        &self,
        collection: Collection,
        filter: &Filter,
        field: &str,
    ) -> Result<i64, Error>;
}

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Collection {
    #[display("Pessoas")]
    Parties,
    #[display("Objetos")]
    Assets,
    #[display("ProdutosServicos")]
    Services,
    #[display("ProdutosServicosEmpresa")]
    CompanyServices,
    #[display("OperacoesFiscais")]
    FiscalOperations,
    #[display("TributacoesMunicipal")]
    TaxClassifications,
    #[display("Contas")]
    Accounts,
    #[display("PlanosConta")]
    LedgerAccounts,
    #[display("CentrosCusto")]
    CostCenters,
    #[display("TiposCamposPersonalizados")]
    CustomFieldTypes,
    #[display("Sequencias")]
    Sequences,
    #[display("Movimentacoes")]
    Documents,
}

/// Field-equality filter with JSON containment semantics: every field of
/// the filter must be contained in the matching record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filter(Record);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &ObjectId) -> Self {
        Self::new().eq("_id", id)
    }

    pub fn active() -> Self {
        Self::new().eq("Ativo", true)
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_owned(), value.into());
        self
    }

    pub fn fields(&self) -> &Record {
        &self.0
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.0.iter().all(|(field, needle)| {
            record
                .get(field)
                .is_some_and(|value| contains(value, needle))
        })
    }
}

/// Case-insensitive substring search over text fields. An array field
/// matches when one of its text elements does.
#[derive(Clone, Copy, Debug)]
pub struct TextSearch<'a> {
    pub text: &'a str,
    pub fields: &'a [&'a str],
}

impl TextSearch<'_> {
    pub fn matches(&self, record: &Record) -> bool {
        let needle = self.text.to_lowercase();
        let hit = |s: &str| s.to_lowercase().contains(&needle);

        self.fields
            .iter()
            .filter_map(|field| record.get(*field))
            .any(|value| match value {
                Value::String(s) => hit(s),
                Value::Array(items) => {
                    items.iter().filter_map(Value::as_str).any(hit)
                }
                _ => false,
            })
    }

    /// `ILIKE` pattern matching the text anywhere.
    fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.text.len() + 2);
        pattern.push('%');
        for c in self.text.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(haystack), Value::Object(needle)) => {
            needle.iter().all(|(k, v)| {
                haystack.get(k).is_some_and(|h| contains(h, v))
            })
        }
        (Value::Array(haystack), Value::Array(needle)) => needle
            .iter()
            .all(|n| haystack.iter().any(|h| contains(h, n))),
        (haystack, needle) => haystack == needle,
    }
}

/// ERP record identifier: 24 lowercase hex digits.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Identifier the ERP uses for "no reference".
    pub fn zero() -> Self {
        Self("0".repeat(24))
    }

    /// Fresh identifier: big-endian Unix seconds followed by random bytes.
    pub fn generate() -> Self {
        let secs =
            u32::try_from(OffsetDateTime::now_utc().unix_timestamp())
                .unwrap_or_default();
        let mut hex = format!("{secs:08x}");
        hex.extend(
            Uuid::new_v4().as_bytes()[..8]
                .iter()
                .map(|b| format!("{b:02x}")),
        );
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the `_id` of a record.
    pub fn of(record: &Record) -> Option<Self> {
        record.get("_id")?.as_str()?.parse().ok()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(InvalidObjectId(s.to_owned()))
        }
    }
}

impl TryFrom<String> for ObjectId {
    type Error = InvalidObjectId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl From<&ObjectId> for Value {
    fn from(id: &ObjectId) -> Self {
        Value::String(id.0.clone())
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::String(id.0)
    }
}

impl FromSql<'_> for ObjectId {
    accepts!(TEXT, VARCHAR);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(<&str>::from_sql(ty, raw)?.parse()?)
    }
}

impl ToSql for ObjectId {
    accepts!(TEXT, VARCHAR);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.as_str().to_sql(ty, out)
    }
}

#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("invalid object id: {_0:?}")]
pub struct InvalidObjectId(String);

impl StdError for InvalidObjectId {}

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("legacy database did not answer in time")]
    Timeout,

    #[from]
    #[display("legacy database error: {_0}")]
    Db(tokio_postgres::Error),

    #[display("malformed legacy record: {_0}")]
    Malformed(String),
}

impl StdError for Error {}
