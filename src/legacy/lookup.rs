//! Read-only ERP listings: the choices offered when mapping the integration
//! settings, and the client search that keeps ticket client names aligned
//! with ERP party names.

use serde_json::{json, Value};

use super::{Collection, Error, Filter, ObjectId, Record, Store, TextSearch};

const COMPANY_LIMIT: usize = 50;
const ASSET_LIMIT: usize = 500;
const CUSTOM_FIELD_TYPE_LIMIT: usize = 500;
const SERVICE_LIMIT: usize = 100;
const FISCAL_OPERATION_LIMIT: usize = 50;
const CLIENT_LIMIT: usize = 5;

/// `TipoItem` code of services.
const SERVICE_ITEM_KIND: i64 = 9;
/// `Tipo` of fiscal operations issuing service documents.
const SERVICE_FISCAL_OPERATION_KIND: i64 = 23;

/// Placeholder for missing contact data.
const NOT_AVAILABLE: &str = "S/N";

#[derive(Clone, Debug, PartialEq)]
pub struct Choice {
    pub id: ObjectId,
    pub label: String,
}

/// Active ERP records each integration mapping can point to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntegrationOptions {
    pub companies: Vec<Choice>,
    pub assets: Vec<Choice>,
    pub custom_field_types: Vec<Choice>,
    pub services: Vec<Choice>,
    pub fiscal_operations: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientSummary {
    pub id: ObjectId,
    pub name: String,
    pub cpf: Option<String>,
    pub phone: String,
    pub email: String,
}

pub async fn integration_options<S>(
    store: &S,
) -> Result<IntegrationOptions, Error>
where
    S: Store + ?Sized,
{
    let companies = Filter::active().eq("_t", json!(["Emitente"]));
    let services = Filter::active()
        .eq("TipoItem", json!({ "Codigo": SERVICE_ITEM_KIND }));
    let fiscal_operations =
        Filter::active().eq("Tipo", SERVICE_FISCAL_OPERATION_KIND);
    let active = Filter::active();

    let (companies, assets, field_types, services, operations) = tokio::try_join!(
        store.find_many(Collection::Parties, &companies, COMPANY_LIMIT),
        store.find_many(Collection::Assets, &active, ASSET_LIMIT),
        store.find_many(
            Collection::CustomFieldTypes,
            &active,
            CUSTOM_FIELD_TYPE_LIMIT,
        ),
        store.find_many(Collection::Services, &services, SERVICE_LIMIT),
        store.find_many(
            Collection::FiscalOperations,
            &fiscal_operations,
            FISCAL_OPERATION_LIMIT,
        ),
    )?;

    Ok(IntegrationOptions {
        companies: choices(&companies, |r| {
            text(r, "NomeFantasia").or_else(|| text(r, "Nome"))
        }),
        assets: choices(&assets, |r| text(r, "Descricao")),
        custom_field_types: choices(&field_types, |r| text(r, "Descricao")),
        services: choices(&services, |r| {
            Some(format!(
                "{} - {}",
                text(r, "CodigoInterno").unwrap_or_default(),
                text(r, "Descricao").unwrap_or_default(),
            ))
        }),
        fiscal_operations: choices(&operations, |r| {
            let cfop = r.get("Cfop");
            let field = |name: &str| {
                cfop.and_then(|c| c.get(name))
                    .and_then(display)
                    .unwrap_or_default()
            };
            Some(format!("{} - {}", field("Codigo"), field("Descricao")))
        }),
    })
}

/// ERP parties whose name or search terms contain `query`, ignoring case.
/// A blank query finds nothing.
pub async fn search_clients<S>(
    store: &S,
    query: &str,
) -> Result<Vec<ClientSummary>, Error>
where
    S: Store + ?Sized,
{
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let search = TextSearch {
        text: query,
        fields: &["Nome", "InformacoesPesquisa"],
    };
    let parties = store
        .search(Collection::Parties, &Filter::new(), &search, CLIENT_LIMIT)
        .await?;

    Ok(parties
        .iter()
        .filter_map(|party| {
            Some(ClientSummary {
                id: ObjectId::of(party)?,
                name: text(party, "Nome").unwrap_or_default(),
                cpf: text(party, "Cpf"),
                phone: contact(
                    party,
                    ["TelefoneComercial", "TelefonePrincipal"],
                    "Numero",
                ),
                email: contact(
                    party,
                    ["EmailPrincipal", "EmailPrincipal"],
                    "Endereco",
                ),
            })
        })
        .collect())
}

fn choices(
    records: &[Record],
    label: impl Fn(&Record) -> Option<String>,
) -> Vec<Choice> {
    records
        .iter()
        .filter_map(|r| {
            Some(Choice {
                id: ObjectId::of(r)?,
                label: label(r).unwrap_or_default(),
            })
        })
        .collect()
}

fn text(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(display)
}

/// Contact data kept either on the party itself or in its wallet.
fn contact(record: &Record, [own, wallet]: [&str; 2], field: &str) -> String {
    nested(record, &[own, field])
        .or_else(|| nested(record, &["Carteira", wallet, field]))
        .unwrap_or_else(|| NOT_AVAILABLE.to_owned())
}

fn nested(record: &Record, path: &[&str]) -> Option<String> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(record.get(*first)?, |value, field| value.get(field))
        .and_then(display)
}

/// Non-empty text of a string or number.
fn display(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
