//! Frozen copies of mutable ERP records.
//!
//! A service order embeds the customer, the issuing company and the billed
//! service as they were at issue time, so later edits of those records don't
//! alter issued documents. Only a fixed set of fields is copied; anything
//! missing in the source is filled with a neutral value so the resulting
//! document is always structurally complete.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ObjectId, Record};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum PartyKind {
    #[serde(rename = "FisicaHistorico")]
    Individual,
    #[serde(rename = "JuridicaHistorico")]
    LegalEntity,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoricalParty {
    #[serde(rename = "_t")]
    pub kind: PartyKind,
    #[serde(rename = "PessoaReferencia")]
    pub reference: Option<ObjectId>,
    #[serde(rename = "Nome")]
    pub name: String,
    #[serde(rename = "NomeFantasia")]
    pub trade_name: Option<String>,
    #[serde(rename = "Classificacao")]
    pub classification: Option<Value>,
    /// CPF of an individual, CNPJ of a legal entity.
    #[serde(rename = "Documento")]
    pub document: Option<String>,
    #[serde(rename = "Ie")]
    pub state_registration: Option<String>,
    #[serde(rename = "Cnae")]
    pub cnae: Option<String>,
    #[serde(rename = "EnderecoPrincipal")]
    pub address: Option<Value>,
    #[serde(rename = "TelefonePrincipal")]
    pub phone: Option<String>,
    #[serde(rename = "EmailPrincipal")]
    pub email: Option<String>,
}

pub fn snapshot_party(party: &Record) -> HistoricalParty {
    let wallet = party.get("Carteira");
    let kind = party_kind(party);

    let document = match kind {
        PartyKind::Individual => text(party, "Cpf"),
        PartyKind::LegalEntity => text(party, "Cnpj"),
    };
    let state_registration = match kind {
        PartyKind::Individual => None,
        PartyKind::LegalEntity => wallet
            .and_then(|w| w.pointer("/Ie/Numero"))
            .and_then(Value::as_str)
            .map(str::to_owned),
    };
    let cnae = text(party, "Cnae")
        .or_else(|| text(party, "CNAE"))
        .map(|cnae| cnae.chars().filter(char::is_ascii_digit).collect());

    HistoricalParty {
        kind,
        reference: ObjectId::of(party),
        name: text(party, "Nome").unwrap_or_default(),
        trade_name: text(party, "NomeFantasia"),
        classification: party.get("Classificacao").cloned(),
        document,
        state_registration,
        cnae,
        address: wallet
            .and_then(|w| w.get("EnderecoPrincipal"))
            .filter(|a| !a.is_null())
            .cloned(),
        phone: wallet
            .and_then(|w| w.pointer("/TelefonePrincipal/Numero"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        email: wallet
            .and_then(|w| w.pointer("/EmailPrincipal/Endereco"))
            .and_then(Value::as_str)
            .map(str::to_owned),
    }
}

fn party_kind(party: &Record) -> PartyKind {
    let is_individual = match party.get("_t") {
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .any(|k| k.contains("Fisica")),
        Some(Value::String(kind)) => kind.contains("Fisica"),
        _ => false,
    };
    if is_individual {
        PartyKind::Individual
    } else {
        PartyKind::LegalEntity
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Unit {
    #[serde(rename = "Sigla", default)]
    pub symbol: String,
    #[serde(rename = "Descricao", default)]
    pub description: String,
}

impl Default for Unit {
    fn default() -> Self {
        Self {
            symbol: "UN".to_owned(),
            description: "UNIDADE".to_owned(),
        }
    }
}

/// Coded enumeration value as the ERP stores it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Indicator {
    #[serde(rename = "_t", default)]
    pub kind: String,
    #[serde(rename = "Codigo", default)]
    pub code: i64,
    #[serde(rename = "Descricao", default)]
    pub description: String,
}

impl Indicator {
    fn new(kind: &str, code: i64, description: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            code,
            description: description.to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoricalService {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "ProdutoServicoReferencia")]
    pub reference: Option<ObjectId>,
    #[serde(rename = "CodigoInterno")]
    pub internal_code: String,
    #[serde(rename = "Descricao")]
    pub description: String,
    #[serde(rename = "UnidadeMedida")]
    pub unit: Unit,
    #[serde(rename = "UnidadeMedidaTributavel")]
    pub taxable_unit: Unit,
    #[serde(rename = "PercentualComissao")]
    pub commission_percent: f64,
    #[serde(rename = "PercentualCashback")]
    pub cashback_percent: f64,
    #[serde(rename = "IndicadorArredondamentoTruncamento")]
    pub rounding: Indicator,
    #[serde(rename = "IndicadorProducao")]
    pub production_origin: Indicator,
    #[serde(rename = "CodigoContabil")]
    pub accounting_code: String,
    #[serde(rename = "Atividade")]
    pub activity: Option<Value>,
    #[serde(rename = "ClassificacaoTributaria")]
    pub tax_classification: Option<Value>,
}

pub fn snapshot_service(service: &Record) -> HistoricalService {
    let unit = typed::<Unit>(service, "UnidadeMedida");
    let taxable_unit = typed::<Unit>(service, "UnidadeMedidaTributavel")
        .or_else(|| unit.clone())
        .unwrap_or_default();

    HistoricalService {
        kind: "ServicoHistorico",
        reference: ObjectId::of(service),
        internal_code: text(service, "CodigoInterno").unwrap_or_default(),
        description: text(service, "Descricao").unwrap_or_default(),
        unit: unit.unwrap_or_else(|| taxable_unit.clone()),
        taxable_unit,
        commission_percent: number(service, "PercentualComissao"),
        cashback_percent: number(service, "PercentualCashback"),
        rounding: typed(service, "IndicadorArredondamentoTruncamento")
            .unwrap_or_else(|| {
                Indicator::new("Arredondamento", 0, "Arredondamento")
            }),
        production_origin: typed(service, "IndicadorProducao")
            .unwrap_or_else(|| {
                Indicator::new("ProducaoTerceiros", 0, "Produção de terceiros")
            }),
        accounting_code: text(service, "CodigoContabil").unwrap_or_default(),
        activity: object(service, "Atividade"),
        tax_classification: object(service, "ClassificacaoTributaria"),
    }
}

fn text(record: &Record, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn number(record: &Record, field: &str) -> f64 {
    record.get(field).and_then(Value::as_f64).unwrap_or_default()
}

fn object(record: &Record, field: &str) -> Option<Value> {
    record.get(field).filter(|v| v.is_object()).cloned()
}

fn typed<T: for<'de> Deserialize<'de>>(
    record: &Record,
    field: &str,
) -> Option<T> {
    object(record, field).and_then(|v| serde_json::from_value(v).ok())
}
