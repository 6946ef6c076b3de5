use serde_json::{json, Value};

use crate::legacy::{
    self, document::Iss, Collection, ObjectId, Record, Store,
};

/// Where the ISS block of a service order came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaxSource {
    /// Embedded in the company's price record of the service.
    CompanyPricing,

    /// Taken from the referenced municipal tax classification.
    Classification(ObjectId),

    /// Nothing configured, [`default_iss`] was used.
    Fallback,
}

/// Fully taxed ISS at 2 %, used when the ERP has no tax setup for the
/// service.
pub fn default_iss(fiscal_operation: &ObjectId) -> Iss {
    Iss {
        kind: "ISSNormal".to_owned(),
        cst: json!({
            "_t": "TributadoIntegralmente",
            "Codigo": 0,
            "Descricao": "Tributada integralmente",
        }),
        fiscal_operation_ref: fiscal_operation.clone(),
        taxation_kind: 6,
        percent: 2.0,
        base_percent: 100.0,
        truncate: false,
    }
}

/// Resolves the ISS block: the company pricing record first, then the tax
/// classification it (or the service) references, then [`default_iss`].
pub(super) async fn resolve<S>(
    store: &S,
    company_service: Option<&Record>,
    service: &Record,
    fiscal_operation: &ObjectId,
) -> Result<(Iss, TaxSource), legacy::Error>
where
    S: Store + ?Sized,
{
    if let Some(iss) = company_service
        .and_then(embedded)
        .map(|v| from_value(v, fiscal_operation))
    {
        return Ok((iss, TaxSource::CompanyPricing));
    }

    let classification_id = company_service
        .and_then(classification_ref)
        .or_else(|| classification_ref(service));
    if let Some(id) = classification_id {
        let classification =
            store.find_by_id(Collection::TaxClassifications, &id).await?;
        if let Some(iss) = classification
            .as_ref()
            .and_then(embedded)
            .map(|v| from_value(v, fiscal_operation))
        {
            return Ok((iss, TaxSource::Classification(id)));
        }
    }

    Ok((default_iss(fiscal_operation), TaxSource::Fallback))
}

fn embedded(record: &Record) -> Option<&Value> {
    record
        .get("Iss")
        .or_else(|| record.get("ISS"))
        .filter(|v| v.is_object())
}

fn classification_ref(record: &Record) -> Option<ObjectId> {
    record
        .get("TributacaoMunicipalReferencia")?
        .as_str()?
        .parse()
        .ok()
}

/// Reads a stored ISS block. Missing fields keep their default, and the
/// fiscal operation is always the configured one.
fn from_value(value: &Value, fiscal_operation: &ObjectId) -> Iss {
    let mut iss = default_iss(fiscal_operation);
    if let Some(kind) = value.get("_t").and_then(Value::as_str) {
        iss.kind = kind.to_owned();
    }
    if let Some(cst) = value.get("CstIss").filter(|v| !v.is_null()) {
        iss.cst = cst.clone();
    }
    if let Some(kind) = value.get("TipoTributacaoIss").and_then(Value::as_i64)
    {
        iss.taxation_kind = kind;
    }
    if let Some(percent) = value.get("Percentual").and_then(Value::as_f64) {
        iss.percent = percent;
    }
    if let Some(base) =
        value.get("PercentualBaseCalculo").and_then(Value::as_f64)
    {
        iss.base_percent = base;
    }
    if let Some(truncate) =
        value.get("TruncarValorImposto").and_then(Value::as_bool)
    {
        iss.truncate = truncate;
    }
    iss
}
