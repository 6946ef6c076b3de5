use itertools::Itertools as _;
use serde_json::Value;
use time::{macros::format_description, OffsetDateTime};
use tracing::warn;

use crate::{
    db::Ticket,
    legacy::{
        document::{
            dotnet_version, Coded, CustomDateField, Fine, Installment,
            InstallmentEntry, Interest, Iss, Nbs, OrderStatus, PaymentKind,
            PisCofins, Receivable, ServiceItem, ServiceObject, ServiceOrder,
            Situation, SituationChange, StatusCode, NEVER,
        },
        snapshot::{snapshot_party, snapshot_service},
        ObjectId, Record,
    },
};

use super::{Charge, Mappings, References};

/// Code used when the ERP has no active ledger account or cost center.
const PLACEHOLDER_CODE: &str = "1";

pub(super) struct Parts<'a> {
    pub ticket: &'a Ticket,
    pub mappings: &'a Mappings,
    pub refs: References,
    pub iss: Iss,
    pub charge: &'a Charge,
    pub number: i64,
    pub user_name: &'a str,
    pub now: OffsetDateTime,
}

pub(super) fn service_order(parts: Parts<'_>) -> ServiceOrder {
    let Parts {
        ticket,
        mappings,
        refs,
        iss,
        charge,
        number,
        user_name,
        now,
    } = parts;

    let version = dotnet_version(now);
    let customer = snapshot_party(&refs.customer);
    let client_term = first_word(&ticket.client);

    let item = ServiceItem {
        kind: "ItemDocumentoAuxiliarSaidaServico",
        company_service_ref: refs
            .company_service
            .as_ref()
            .and_then(ObjectId::of)
            .unwrap_or_else(ObjectId::generate),
        seller_ref: ObjectId::zero(),
        technician_ref: ObjectId::zero(),
        at: now,
        service: snapshot_service(&refs.service),
        cancelled: false,
        quantity: charge.quantity,
        quantity_decimals: 2,
        unit_price: charge.unit_price,
        unit_price_decimals: 2,
        number: 1,
        note: String::new(),
        nbs: Nbs::UNSPECIFIED,
        typed_discount: 0.0,
        proportional_discount: 0.0,
        typed_other_expenses: 0.0,
        proportional_other_expenses: 0.0,
        freight: 0.0,
        insurance: 0.0,
        fiscal_operation: refs.fiscal_operation,
        pis: PisCofins::EXEMPT,
        cofins: PisCofins::EXEMPT,
        iss,
    };

    let account_ref = refs
        .account
        .as_ref()
        .and_then(ObjectId::of)
        .unwrap_or_else(|| {
            warn!(ticket = %ticket.number, "no active cash account found");
            ObjectId::generate()
        });
    let ledger_code = unique_code(refs.ledger.as_ref()).unwrap_or_else(|| {
        warn!(ticket = %ticket.number, "no active ledger account found");
        PLACEHOLDER_CODE.to_owned()
    });
    let cost_center_code = unique_code(refs.cost_center.as_ref())
        .unwrap_or_else(|| {
            warn!(ticket = %ticket.number, "no active cost center found");
            PLACEHOLDER_CODE.to_owned()
        });

    let installment = Installment {
        kind: "ParcelaRecebimento",
        id: ObjectId::generate(),
        reference: i64::try_from(now.unix_timestamp_nanos() / 1_000_000)
            .unwrap_or_default(),
        search_terms: ["gerado", "pelo", "sistema"]
            .into_iter()
            .map(str::to_owned)
            .chain(client_term.clone())
            .collect(),
        version: version.clone(),
        active: true,
        order: 1,
        description: format!("Gerado pelo {user_name}"),
        note: format!("Ref. Ticket {}", ticket.id),
        customer_ref: customer.reference.clone(),
        due_at: now,
        issued_at: now,
        history: vec![InstallmentEntry {
            kind: "HistoricoAguardando",
            amount: charge.total,
            payment_kind: PaymentKind::CASH,
            ledger_code,
            cost_center_code,
            account_ref: account_ref.clone(),
            company_ref: mappings.company.clone(),
            user_name: user_name.to_owned(),
            at: now,
            cheque_ref: ObjectId::zero(),
            edited: false,
        }],
        situation: StatusCode::AWAITING_PAYMENT,
        account_ref,
        company_ref: mappings.company.clone(),
        user_name: user_name.to_owned(),
        customer: customer.clone(),
        interest: Interest::NONE,
        fine: Fine::NONE,
    };

    let custom_fields = [
        mappings
            .start_field
            .clone()
            .map(|id| CustomDateField::new(id, ticket.started_at)),
        mappings
            .end_field
            .clone()
            .map(|id| CustomDateField::new(id, ticket.ended_at.unwrap_or(now))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let search_terms = std::iter::once(number.to_string())
        .chain(client_term)
        .chain(
            refs.customer
                .get("InformacoesPesquisa")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(str::to_owned),
        )
        .collect();

    ServiceOrder {
        id: ObjectId::generate(),
        kinds: ServiceOrder::KINDS,
        search_terms,
        version,
        active: true,
        number,
        issued_at: now,
        customer,
        company_ref: mappings.company.clone(),
        company: snapshot_party(&refs.company),
        from_mobile: false,
        from_menu: false,
        items: vec![item],
        payment: Receivable {
            kind: "Recebimento",
            installments: vec![installment],
        },
        situation: Situation::AWAITING,
        history: vec![SituationChange {
            situation: Situation::AWAITING,
            user_name: user_name.to_owned(),
            note: "Gerado Automaticamente".to_owned(),
            at: now,
        }],
        notify: true,
        last_situation_check: NEVER,
        converted: false,
        freight: Coded::new("SemFrete", 9, "Sem frete"),
        note: audit_note(ticket, now),
        expected_at: now,
        attendance: Coded::new("Interno", 1, "Interno"),
        objects: vec![ServiceObject {
            warranty_until: now,
            has_warranty: false,
            defect: ticket.reason.clone(),
            diagnosis: ticket
                .solution
                .clone()
                .unwrap_or_else(|| "Resolvido".to_owned()),
            asset: refs.asset,
            custom_fields,
        }],
        animals: Vec::new(),
        fiscal_document_ref: ObjectId::zero(),
        order_status: OrderStatus {
            status: StatusCode::ANALYSIS,
            note: String::new(),
            at: now,
            user_name: user_name.to_owned(),
        },
        returned_rental: false,
        referenced_documents: Vec::new(),
        returned_history: Vec::new(),
        order_kind: Coded::new("Normal", 0, "Normal"),
        contract_data: String::new(),
        contract_due: NEVER,
        print_contract_payment: false,
        received_at: now,
        priority: Coded::new("Normal", 2, "Normal"),
        buyer_presence: Coded::new("OperacaoPresencial", 1, "Operação presencial"),
        final_consumer: Coded::new("ConsumidorFinal", 1, "Consumidor final"),
    }
}

fn first_word(name: &str) -> Option<String> {
    name.split_whitespace().next().map(str::to_lowercase)
}

/// `CodigoUnico` of an ERP record, stored either as text or as a number.
fn unique_code(record: Option<&Record>) -> Option<String> {
    match record?.get("CodigoUnico")? {
        Value::String(code) if !code.is_empty() => Some(code.clone()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

/// Free-text summary of the ticket printed on the order.
fn audit_note(ticket: &Ticket, now: OffsetDateTime) -> String {
    let format = format_description!("[day]/[month]/[year] [hour]:[minute]");
    let fmt = |at: OffsetDateTime| at.format(&format).unwrap_or_default();

    let pauses = if ticket.pauses.is_empty() {
        "nenhuma".to_owned()
    } else {
        ticket
            .pauses
            .iter()
            .map(|p| {
                let end = p.end.map(fmt).unwrap_or_else(|| "em aberto".into());
                format!("{} - {end} ({})", fmt(p.start), p.reason)
            })
            .join("; ")
    };

    format!(
        "Ticket {number} - Técnico: {technician}\n\
         Início: {start} / Fim: {end} / Tempo: {minutes} min\n\
         Pausas: {pauses}\n\
         Ticket Origem: {reason}\n\
         Solução: {solution}",
        number = ticket.number,
        technician = ticket.technician,
        start = fmt(ticket.started_at),
        end = fmt(ticket.ended_at.unwrap_or(now)),
        minutes = ticket.total_minutes,
        reason = ticket.reason,
        solution = ticket.solution.as_deref().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_numeric_and_text_codes() {
        let text = json!({ "CodigoUnico": "1.01" });
        let number = json!({ "CodigoUnico": 100 });
        let empty = json!({ "CodigoUnico": "" });

        assert_eq!(
            unique_code(text.as_object()).as_deref(),
            Some("1.01")
        );
        assert_eq!(unique_code(number.as_object()).as_deref(), Some("100"));
        assert_eq!(unique_code(empty.as_object()), None);
        assert_eq!(unique_code(None), None);
    }

    #[test]
    fn search_term_is_lowercased_first_word() {
        assert_eq!(
            first_word("  Cliente Teste S/A").as_deref(),
            Some("cliente")
        );
        assert_eq!(first_word(""), None);
    }
}
