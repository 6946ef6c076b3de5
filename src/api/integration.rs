use serde::{Deserialize, Serialize};

use crate::legacy::{lookup, ObjectId};

pub use crate::db::IntegrationConfig;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Choice {
    pub id: ObjectId,
    pub label: String,
}

impl From<lookup::Choice> for Choice {
    fn from(choice: lookup::Choice) -> Self {
        Self {
            id: choice.id,
            label: choice.label,
        }
    }
}

/// ERP records to pick the integration mappings from, next to the current
/// settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    pub companies: Vec<Choice>,
    pub assets: Vec<Choice>,
    pub custom_field_types: Vec<Choice>,
    pub services: Vec<Choice>,
    pub fiscal_operations: Vec<Choice>,
    pub saved_config: IntegrationConfig,
}

impl Options {
    pub fn new(
        options: lookup::IntegrationOptions,
        saved_config: IntegrationConfig,
    ) -> Self {
        let convert = |choices: Vec<lookup::Choice>| -> Vec<Choice> {
            choices.into_iter().map(Into::into).collect()
        };
        Self {
            companies: convert(options.companies),
            assets: convert(options.assets),
            custom_field_types: convert(options.custom_field_types),
            services: convert(options.services),
            fiscal_operations: convert(options.fiscal_operations),
            saved_config,
        }
    }
}
