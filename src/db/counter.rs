use async_trait::async_trait;
use tokio_postgres::Error;

use crate::sequence::CounterStore;

use super::Client;

#[async_trait]
impl CounterStore for Client {
    type Error = Error;

    async fn increment(&self, scope: &str) -> Result<i64, Error> {
        const SQL: &str = "\
            INSERT INTO sequence_counters (scope, value) \
            VALUES ($1, 1) \
            ON CONFLICT (scope) DO UPDATE \
            SET value = sequence_counters.value + 1 \
            RETURNING value";

        Ok(self.0.query_one(SQL, &[&scope]).await?.get("value"))
    }
}
