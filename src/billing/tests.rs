use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};
use time::macros::datetime;

use crate::{
    config,
    db::{
        ticket::{self, Number},
        IntegrationConfig, Ticket,
    },
    legacy::{Collection, MemoryStore, ObjectId},
    lifecycle::NewTicket,
};

use super::*;

struct Fixture {
    store: MemoryStore,
    config: IntegrationConfig,
    settings: config::Billing,
    classification: ObjectId,
}

impl Fixture {
    fn new() -> Self {
        let store = MemoryStore::new();
        let company = seed(
            &store,
            Collection::Parties,
            json!({
                "Nome": "Minha Empresa Matriz",
                "Ativo": true,
                "_t": ["Pessoa", "Juridica", "Emitente"],
                "Carteira": { "EnderecoPrincipal": { "Logradouro": "Rua Teste" } },
            }),
        );
        seed(
            &store,
            Collection::Parties,
            json!({
                "Nome": "Cliente Teste S/A",
                "Ativo": true,
                "_t": ["Pessoa", "Juridica"],
                "Cnpj": "12345678000199",
                "InformacoesPesquisa": ["cliente"],
                "Carteira": { "EmailPrincipal": { "Endereco": "cli@teste.com" } },
            }),
        );
        let asset = seed(
            &store,
            Collection::Assets,
            json!({ "Descricao": "ATENDIMENTO", "Ativo": true }),
        );
        let classification = seed(
            &store,
            Collection::TaxClassifications,
            json!({ "Iss": { "_t": "ISSNormal", "Percentual": 5.0 } }),
        );
        let service = seed(
            &store,
            Collection::Services,
            json!({
                "Descricao": "HORA TECNICA",
                "CodigoInterno": "999",
                "Ativo": true,
                "UnidadeMedida": { "Sigla": "H" },
            }),
        );
        seed(
            &store,
            Collection::CompanyServices,
            json!({
                "ProdutoServicoReferencia": service,
                "EmpresaReferencia": company,
                "PrecoVenda": 150.0,
                "TributacaoMunicipalReferencia": classification,
            }),
        );
        let fiscal_operation = seed(
            &store,
            Collection::FiscalOperations,
            json!({
                "Tipo": 23,
                "Ativo": true,
                "Cfop": { "Codigo": 5933, "Descricao": "Svc" },
            }),
        );
        seed(
            &store,
            Collection::Accounts,
            json!({ "Ativo": true, "Nome": "Caixa" }),
        );
        seed(
            &store,
            Collection::LedgerAccounts,
            json!({ "Ativo": true, "CodigoUnico": "1.01" }),
        );
        seed(
            &store,
            Collection::CostCenters,
            json!({ "Ativo": true, "CodigoUnico": "100" }),
        );

        Self {
            store,
            config: IntegrationConfig {
                company_id: Some(company),
                asset_id: Some(asset),
                service_id: Some(service),
                fiscal_operation_id: Some(fiscal_operation),
                ..IntegrationConfig::default()
            },
            settings: config::Billing::default(),
            classification,
        }
    }

    fn builder(&self) -> ServiceOrderBuilder<'_, MemoryStore> {
        ServiceOrderBuilder::new(&self.store, &self.settings)
    }

    fn documents(&self) -> Vec<Value> {
        self.store
            .records(Collection::Documents)
            .into_iter()
            .map(Value::Object)
            .collect()
    }
}

fn seed(store: &MemoryStore, collection: Collection, value: Value) -> ObjectId {
    store.seed(collection, value).unwrap()
}

fn finished_ticket(client: &str, total_minutes: i64) -> Ticket {
    let start = datetime!(2025-12-01 10:00 UTC);
    let mut ticket = Ticket::open(
        Number::new(start.date(), 1),
        NewTicket {
            client: client.to_owned(),
            reason: "Impressora sem rede".to_owned(),
            technician: "Alice".to_owned(),
            solution: Some("Cabo trocado".to_owned()),
            created_by: None,
        },
        start,
    );
    ticket.status = crate::db::ticket::Status::Finalized;
    ticket.ended_at = Some(start + time::Duration::minutes(total_minutes));
    ticket.total_minutes = total_minutes;
    ticket
}

const NOW: time::OffsetDateTime = datetime!(2025-12-01 12:00 UTC);

#[tokio::test]
async fn generates_service_order() {
    let fixture = Fixture::new();
    let ticket = finished_ticket("Cliente Teste S/A", 90);

    let generated = fixture
        .builder()
        .generate(&fixture.config, &ticket, NOW)
        .await
        .unwrap();

    assert_eq!(generated.number, 1);
    assert_eq!(
        generated.tax_source,
        TaxSource::Classification(fixture.classification.clone())
    );

    let documents = fixture.documents();
    assert_eq!(documents.len(), 1);
    let doc = &documents[0];
    assert_eq!(doc["_id"], json!(generated.id));
    assert_eq!(doc["Numero"], 1);
    assert_eq!(doc["Pessoa"]["_t"], "JuridicaHistorico");
    assert_eq!(doc["Pessoa"]["Documento"], "12345678000199");
    assert_eq!(doc["Empresa"]["Nome"], "Minha Empresa Matriz");
    assert_eq!(doc["InformacoesPesquisa"], json!(["1", "cliente", "cliente"]));
    assert_eq!(doc["Situacao"]["Descricao"], "Aguardando");

    let item = &doc["ItensBase"][0];
    assert_eq!(item["Quantidade"], 2.0);
    assert_eq!(item["PrecoUnitario"], 150.0);
    assert_eq!(item["ISS"]["Percentual"], 5.0);
    assert_eq!(
        item["ISS"]["OperacaoFiscalReferencia"],
        json!(fixture.config.fiscal_operation_id)
    );
    assert_eq!(item["ProdutoServico"]["_t"], "ServicoHistorico");
    assert_eq!(item["ProdutoServico"]["UnidadeMedidaTributavel"]["Sigla"], "H");

    let entry = &doc["PagamentoRecebimento"]["Parcelas"][0]["Historico"][0];
    assert_eq!(entry["Valor"], 300.0);
    assert_eq!(entry["PlanoContaCodigoUnico"], "1.01");
    assert_eq!(entry["CentroCustoCodigoUnico"], "100");

    let object = &doc["Objetos"][0];
    assert_eq!(object["Defeito"], "Impressora sem rede");
    assert_eq!(object["Diagnostico"], "Cabo trocado");
    assert_eq!(object["Objeto"]["Descricao"], "ATENDIMENTO");
    assert_eq!(object["CamposPersonalizados"], json!([]));

    let note = doc["Observacao"].as_str().unwrap();
    assert!(note.contains("Alice"));
    assert!(note.contains("Impressora sem rede"));
    assert!(note.contains("Cabo trocado"));
}

#[tokio::test]
async fn prefers_tax_embedded_in_company_pricing() {
    let fixture = Fixture::new();
    let company_service = json!({
        "ProdutoServicoReferencia": fixture.config.service_id,
        "EmpresaReferencia": fixture.config.company_id,
        "Iss": { "_t": "ISSRetido", "Percentual": 3.5 },
    });
    let store = MemoryStore::new();
    for collection in [
        Collection::Parties,
        Collection::Assets,
        Collection::Services,
        Collection::FiscalOperations,
    ] {
        for record in fixture.store.records(collection) {
            store.seed(collection, Value::Object(record)).unwrap();
        }
    }
    store
        .seed(Collection::CompanyServices, company_service)
        .unwrap();

    let generated = ServiceOrderBuilder::new(&store, &fixture.settings)
        .generate(&fixture.config, &finished_ticket("Cliente Teste S/A", 30), NOW)
        .await
        .unwrap();

    assert_eq!(generated.tax_source, TaxSource::CompanyPricing);
    let doc = Value::Object(store.records(Collection::Documents).remove(0));
    let iss = &doc["ItensBase"][0]["ISS"];
    assert_eq!(iss["_t"], "ISSRetido");
    assert_eq!(iss["Percentual"], 3.5);
    assert_eq!(iss["PercentualBaseCalculo"], 100.0);
}

#[tokio::test]
async fn falls_back_to_default_tax_and_placeholders() {
    let fixture = Fixture::new();
    let store = MemoryStore::new();
    for collection in [
        Collection::Parties,
        Collection::Assets,
        Collection::Services,
        Collection::FiscalOperations,
    ] {
        for record in fixture.store.records(collection) {
            store.seed(collection, Value::Object(record)).unwrap();
        }
    }

    let generated = ServiceOrderBuilder::new(&store, &fixture.settings)
        .generate(&fixture.config, &finished_ticket("Cliente Teste S/A", 0), NOW)
        .await
        .unwrap();

    assert_eq!(generated.tax_source, TaxSource::Fallback);
    assert_eq!(generated.charge.quantity, 1.0);
    assert_eq!(generated.charge.unit_price, 150.0);

    let doc = Value::Object(store.records(Collection::Documents).remove(0));
    assert_eq!(doc["ItensBase"][0]["ISS"]["Percentual"], 2.0);
    let installment = &doc["PagamentoRecebimento"]["Parcelas"][0];
    let entry = &installment["Historico"][0];
    assert_eq!(entry["PlanoContaCodigoUnico"], "1");
    assert_eq!(entry["CentroCustoCodigoUnico"], "1");
    assert!(entry["ContaReferencia"]
        .as_str()
        .unwrap()
        .parse::<ObjectId>()
        .is_ok());
}

#[tokio::test]
async fn rounds_worked_time_up_to_whole_hours() {
    let fixture = Fixture::new();

    let generated = fixture
        .builder()
        .generate(&fixture.config, &finished_ticket("Cliente Teste S/A", 61), NOW)
        .await
        .unwrap();

    assert_eq!(generated.charge.quantity, 2.0);
    assert_eq!(generated.charge.total, 300.0);
}

#[tokio::test]
async fn incomplete_config_touches_nothing() {
    let fixture = Fixture::new();
    let config = IntegrationConfig {
        service_id: None,
        ..fixture.config.clone()
    };

    let err = fixture
        .builder()
        .generate(&config, &finished_ticket("Cliente Teste S/A", 60), NOW)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConfigIncomplete(ref m) if m == &["serviceId"]));
    assert!(fixture.documents().is_empty());
    assert!(fixture.store.records(Collection::Sequences).is_empty());
}

#[tokio::test]
async fn refuses_billed_ticket() {
    let fixture = Fixture::new();
    let mut ticket = finished_ticket("Cliente Teste S/A", 60);
    ticket.mark_billed(41, ObjectId::generate()).unwrap();

    let err = fixture
        .builder()
        .generate(&fixture.config, &ticket, NOW)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AlreadyBilled(AlreadyBilled { number: 41 })));
    assert!(fixture.documents().is_empty());
}

#[tokio::test]
async fn billing_twice_is_refused() {
    let fixture = Fixture::new();
    let mut ticket = finished_ticket("Cliente Teste S/A", 60);

    let generated = fixture
        .builder()
        .generate(&fixture.config, &ticket, NOW)
        .await
        .unwrap();
    ticket.mark_billed(generated.number, generated.id).unwrap();
    let err = fixture
        .builder()
        .generate(&fixture.config, &ticket, NOW)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AlreadyBilled(_)));
    assert_eq!(fixture.documents().len(), 1);
}

#[tokio::test]
async fn unknown_client_is_reported() {
    let fixture = Fixture::new();

    let err = fixture
        .builder()
        .generate(&fixture.config, &finished_ticket("Cliente Fantasma", 60), NOW)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ClientNotFound(ref name) if name == "Cliente Fantasma"));
    assert!(fixture.documents().is_empty());
}

#[tokio::test]
async fn missing_fiscal_operation_is_reported() {
    let fixture = Fixture::new();
    let config = IntegrationConfig {
        fiscal_operation_id: Some(ObjectId::generate()),
        ..fixture.config.clone()
    };

    let err = fixture
        .builder()
        .generate(&config, &finished_ticket("Cliente Teste S/A", 60), NOW)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ReferenceDataMissing("fiscal operation")));
    assert!(fixture.store.records(Collection::Sequences).is_empty());
}

#[tokio::test]
async fn concurrent_orders_get_distinct_numbers() {
    let fixture = Fixture::new();
    let first = finished_ticket("Cliente Teste S/A", 60);
    let second = finished_ticket("Cliente Teste S/A", 120);
    let builder = fixture.builder();

    let (a, b) = tokio::join!(
        builder.generate(&fixture.config, &first, NOW),
        builder.generate(&fixture.config, &second, NOW),
    );
    let mut numbers = [a.unwrap().number, b.unwrap().number];
    numbers.sort_unstable();

    assert_eq!(numbers, [1, 2]);
    assert_eq!(fixture.documents().len(), 2);
}

#[tokio::test]
async fn fills_configured_custom_date_fields() {
    let fixture = Fixture::new();
    let start_field = ObjectId::generate();
    let end_field = ObjectId::generate();
    let config = IntegrationConfig {
        start_field_id: Some(start_field.clone()),
        end_field_id: Some(end_field.clone()),
        ..fixture.config.clone()
    };

    fixture
        .builder()
        .generate(&config, &finished_ticket("Cliente Teste S/A", 60), NOW)
        .await
        .unwrap();

    let documents = fixture.documents();
    let fields = &documents[0]["Objetos"][0]["CamposPersonalizados"];
    assert_eq!(fields[0]["TipoCampoPersonalizadoReferencia"], json!(start_field));
    assert_eq!(fields[0]["Valor"], "2025-12-01T10:00:00Z");
    assert_eq!(fields[1]["TipoCampoPersonalizadoReferencia"], json!(end_field));
    assert_eq!(fields[1]["Valor"], "2025-12-01T11:00:00Z");
}

/// Ticket storage counting reads made without holding the ticket's claim.
struct Ledger<'a> {
    tickets: Mutex<HashMap<ticket::Id, Ticket>>,
    in_flight: &'a InFlight,
    unclaimed_reads: AtomicUsize,
}

impl<'a> Ledger<'a> {
    fn new(in_flight: &'a InFlight, tickets: impl IntoIterator<Item = Ticket>) -> Self {
        Self {
            tickets: Mutex::new(tickets.into_iter().map(|t| (t.id, t)).collect()),
            in_flight,
            unclaimed_reads: AtomicUsize::new(0),
        }
    }

    fn ticket(&self, id: ticket::Id) -> Ticket {
        self.tickets.lock().unwrap()[&id].clone()
    }
}

#[async_trait]
impl TicketLedger for Ledger<'_> {
    type Error = Infallible;

    async fn load_ticket(&self, id: ticket::Id) -> Result<Option<Ticket>, Infallible> {
        if !self.in_flight.is_claimed(id) {
            self.unclaimed_reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.tickets.lock().unwrap().get(&id).cloned())
    }

    async fn record_billing(
        &self,
        id: ticket::Id,
        doc_number: i64,
        doc_id: &ObjectId,
    ) -> Result<bool, Infallible> {
        Ok(self
            .tickets
            .lock()
            .unwrap()
            .get_mut(&id)
            .is_some_and(|t| t.mark_billed(doc_number, doc_id.clone()).is_ok()))
    }
}

#[tokio::test]
async fn bills_ticket_read_under_its_claim() {
    let fixture = Fixture::new();
    let in_flight = InFlight::default();
    let ticket = finished_ticket("Cliente Teste S/A", 60);
    let id = ticket.id;
    let ledger = Ledger::new(&in_flight, [ticket]);

    let generated = fixture
        .builder()
        .bill(&ledger, &in_flight, &fixture.config, id, NOW)
        .await
        .unwrap();

    assert_eq!(ledger.unclaimed_reads.load(Ordering::SeqCst), 0);
    assert!(!in_flight.is_claimed(id));
    let stored = ledger.ticket(id);
    assert_eq!(stored.billing_doc_number, Some(generated.number));
    assert_eq!(stored.billing_doc_id, Some(generated.id));
}

#[tokio::test]
async fn ticket_being_billed_is_turned_away_then_seen_billed() {
    let fixture = Fixture::new();
    let in_flight = InFlight::default();
    let ticket = finished_ticket("Cliente Teste S/A", 60);
    let id = ticket.id;
    let ledger = Ledger::new(&in_flight, [ticket]);
    let builder = fixture.builder();

    let running = in_flight.claim(id);
    let err = builder
        .bill(&ledger, &in_flight, &fixture.config, id, NOW)
        .await
        .unwrap_err();
    assert!(matches!(err, BillError::InProgress));
    assert!(fixture.documents().is_empty());
    drop(running);

    builder
        .bill(&ledger, &in_flight, &fixture.config, id, NOW)
        .await
        .unwrap();
    let err = builder
        .bill(&ledger, &in_flight, &fixture.config, id, NOW)
        .await
        .unwrap_err();

    assert!(matches!(err, BillError::Billing(Error::AlreadyBilled(_))));
    assert_eq!(fixture.documents().len(), 1);
    assert_eq!(ledger.unclaimed_reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_requests_create_one_document() {
    let fixture = Fixture::new();
    let in_flight = InFlight::default();
    let ticket = finished_ticket("Cliente Teste S/A", 60);
    let id = ticket.id;
    let ledger = Ledger::new(&in_flight, [ticket]);
    let builder = fixture.builder();

    let (a, b) = tokio::join!(
        builder.bill(&ledger, &in_flight, &fixture.config, id, NOW),
        builder.bill(&ledger, &in_flight, &fixture.config, id, NOW),
    );

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(fixture.documents().len(), 1);
    assert_eq!(ledger.unclaimed_reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_ticket_releases_its_claim() {
    let fixture = Fixture::new();
    let in_flight = InFlight::default();
    let ledger = Ledger::new(&in_flight, []);
    let id = ticket::Id::new();

    let err = fixture
        .builder()
        .bill(&ledger, &in_flight, &fixture.config, id, NOW)
        .await
        .unwrap_err();

    assert!(matches!(err, BillError::TicketNotFound));
    assert!(!in_flight.is_claimed(id));
    assert!(fixture.documents().is_empty());
}
