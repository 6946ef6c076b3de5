use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{types::Json, Error};

use crate::legacy::ObjectId;

use super::Client;

/// Key of the singleton settings row.
const KEY: &str = "legacy_erp";

/// Mapping of the roles a service order needs onto ERP records.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    /// Issuing company.
    #[serde(default, deserialize_with = "non_empty")]
    pub company_id: Option<ObjectId>,

    /// Equipment attached to every order.
    #[serde(default, deserialize_with = "non_empty")]
    pub asset_id: Option<ObjectId>,

    /// Billed service, one hour per unit.
    #[serde(default, deserialize_with = "non_empty")]
    pub service_id: Option<ObjectId>,

    #[serde(default, deserialize_with = "non_empty")]
    pub fiscal_operation_id: Option<ObjectId>,

    /// Custom date field receiving the ticket start.
    #[serde(default, deserialize_with = "non_empty")]
    pub start_field_id: Option<ObjectId>,

    /// Custom date field receiving the ticket end.
    #[serde(default, deserialize_with = "non_empty")]
    pub end_field_id: Option<ObjectId>,

    #[serde(default)]
    pub updated_by: Option<String>,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Settings forms submit cleared inputs as `""`.
fn non_empty<'de, D>(deserializer: D) -> Result<Option<ObjectId>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .filter(|id| !id.trim().is_empty())
        .map(|id| id.trim().parse().map_err(serde::de::Error::custom))
        .transpose()
}

impl Client {
    /// Returns the stored settings, or empty ones when never saved.
    pub async fn get_integration_config(
        &self,
    ) -> Result<IntegrationConfig, Error> {
        const SQL: &str = "SELECT value \
                           FROM integration_config \
                           WHERE key = $1";
        Ok(self
            .0
            .query_opt(SQL, &[&KEY])
            .await?
            .map(|row| row.get::<_, Json<IntegrationConfig>>("value").0)
            .unwrap_or_default())
    }

    pub async fn save_integration_config(
        &self,
        config: &IntegrationConfig,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO integration_config (key, value) \
            VALUES ($1, $2) \
            ON CONFLICT (key) DO UPDATE \
            SET value = EXCLUDED.value";
        self.0
            .execute(SQL, &[&KEY, &Json(config)])
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_strings_are_absent() {
        let config: IntegrationConfig = serde_json::from_value(json!({
            "companyId": "64b7f0c2a1b2c3d4e5f60718",
            "assetId": "",
            "serviceId": "   ",
        }))
        .unwrap();

        assert!(config.company_id.is_some());
        assert_eq!(config.asset_id, None);
        assert_eq!(config.service_id, None);
        assert_eq!(config.fiscal_operation_id, None);
    }

    #[test]
    fn rejects_malformed_ids() {
        let config = serde_json::from_value::<IntegrationConfig>(json!({
            "companyId": "nope",
        }));

        assert!(config.is_err());
    }
}
