use std::{future::Future, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time;
use tokio_postgres::{tls::NoTlsStream, types::Json, NoTls, Row, Socket};

use crate::config;

use super::{
    Collection, Error, Filter, ObjectId, Record, Store, TextSearch,
};

pub type Connection = tokio_postgres::Connection<Socket, NoTlsStream>;

/// ERP collections stored as JSONB documents in a single table:
///
/// ```sql
/// CREATE TABLE legacy_records (
///     collection TEXT  NOT NULL,
///     id         TEXT  NOT NULL,
///     doc        JSONB NOT NULL,
///     PRIMARY KEY (collection, id)
/// );
/// ```
///
/// Every call is bounded by the configured query timeout.
pub struct PgStore {
    client: tokio_postgres::Client,
    timeout: Duration,
}

impl PgStore {
    pub async fn connect(
        config: &config::Legacy,
    ) -> Result<(Self, Connection), Error> {
        let mut pg_config = config
            .url
            .parse::<tokio_postgres::Config>()
            .map_err(Error::Db)?;
        pg_config.connect_timeout(config.connect_timeout);

        let (client, connection) =
            time::timeout(config.connect_timeout, pg_config.connect(NoTls))
                .await
                .map_err(|_| Error::Timeout)??;

        Ok((
            Self {
                client,
                timeout: config.query_timeout,
            },
            connection,
        ))
    }

    async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, tokio_postgres::Error>>,
    ) -> Result<T, Error> {
        time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Db)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Record>, Error> {
        const SQL: &str = "\
            SELECT doc \
            FROM legacy_records \
            WHERE collection = $1 \
              AND doc @> $2 \
            LIMIT 1";

        let collection = collection.to_string();
        let row = self
            .timed(self.client.query_opt(SQL, &[&collection, &Json(filter)]))
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Record>, Error> {
        const SQL: &str = "\
            SELECT doc \
            FROM legacy_records \
            WHERE collection = $1 \
              AND doc @> $2 \
            ORDER BY id \
            LIMIT $3";

        let collection = collection.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .timed(
                self.client
                    .query(SQL, &[&collection, &Json(filter), &limit]),
            )
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn search(
        &self,
        collection: Collection,
        filter: &Filter,
        search: &TextSearch<'_>,
        limit: usize,
    ) -> Result<Vec<Record>, Error> {
        const SQL: &str = "\
            SELECT doc \
            FROM legacy_records \
            WHERE collection = $1 \
              AND doc @> $2 \
              AND EXISTS ( \
                  SELECT 1 \
                  FROM unnest($3::TEXT[]) AS field \
                  WHERE CASE jsonb_typeof(doc -> field) \
                      WHEN 'string' THEN (doc ->> field) ILIKE $4 \
                      WHEN 'array' THEN EXISTS ( \
                          SELECT 1 \
                          FROM jsonb_array_elements(doc -> field) AS item \
                          WHERE jsonb_typeof(item) = 'string' \
                            AND item #>> '{}' ILIKE $4 \
                      ) \
                      ELSE FALSE \
                  END \
              ) \
            ORDER BY id \
            LIMIT $5";

        let collection = collection.to_string();
        let pattern = search.like_pattern();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .timed(self.client.query(
                SQL,
                &[
                    &collection,
                    &Json(filter),
                    &search.fields,
                    &pattern,
                    &limit,
                ],
            ))
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn insert_one(
        &self,
        collection: Collection,
        mut record: Record,
    ) -> Result<ObjectId, Error> {
        const SQL: &str = "\
            INSERT INTO legacy_records (collection, id, doc) \
            VALUES ($1, $2, $3)";

        let id = ObjectId::of(&record).unwrap_or_else(ObjectId::generate);
        record.insert("_id".to_owned(), Value::from(&id));

        let collection = collection.to_string();
        self.timed(self.client.execute(
            SQL,
            &[&collection, &id.as_str(), &Json(&record)],
        ))
        .await?;
        Ok(id)
    }

    async fn increment(
        &self,
        collection: Collection,
        filter: &Filter,
        field: &str,
    ) -> Result<i64, Error> {
        // The row lock taken by the subquery serializes concurrent
        // increments of the same record.
        const BUMP: &str = "\
            UPDATE legacy_records \
            SET doc = jsonb_set( \
                doc, \
                ARRAY[$3::TEXT], \
                to_jsonb(COALESCE((doc ->> $3::TEXT)::BIGINT, 0) + 1) \
            ) \
            WHERE collection = $1 \
              AND id = ( \
                  SELECT id \
                  FROM legacy_records \
                  WHERE collection = $1 \
                    AND doc @> $2 \
                  ORDER BY id \
                  LIMIT 1 \
                  FOR UPDATE \
              ) \
            RETURNING (doc ->> $3::TEXT)::BIGINT";

        // Records created here get an id derived from the filter, so
        // concurrent creators meet on the primary key instead of inserting
        // two counters.
        const CREATE: &str = "\
            INSERT INTO legacy_records (collection, id, doc) \
            VALUES ($1, $2, $3::JSONB || jsonb_build_object($4::TEXT, 1)) \
            ON CONFLICT (collection, id) DO UPDATE \
            SET doc = jsonb_set( \
                legacy_records.doc, \
                ARRAY[$4::TEXT], \
                to_jsonb(COALESCE((legacy_records.doc ->> $4::TEXT)::BIGINT, 0) + 1) \
            ) \
            RETURNING (doc ->> $4::TEXT)::BIGINT";

        let collection = collection.to_string();
        let bumped = self
            .timed(
                self.client
                    .query_opt(BUMP, &[&collection, &Json(filter), &field]),
            )
            .await?;
        if let Some(row) = bumped {
            return Ok(row.try_get(0)?);
        }

        let key = serde_json::to_string(filter)
            .map_err(|e| Error::Malformed(e.to_string()))?;
        let key = format!("seq:{key}");

        let mut record = filter.fields().clone();
        record.insert("_id".to_owned(), Value::String(key.clone()));

        let row = self
            .timed(self.client.query_one(
                CREATE,
                &[&collection, &key, &Json(&record), &field],
            ))
            .await?;
        Ok(row.try_get(0)?)
    }
}

fn record_from_row(row: &Row) -> Result<Record, Error> {
    Ok(row.try_get::<_, Json<Record>>("doc")?.0)
}
