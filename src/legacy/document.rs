//! Service order ("DAV-OS") as the ERP expects it.
//!
//! The shape is fixed: optional parts are explicit `Option`s or possibly
//! empty lists, never fields that come and go.

use serde::Serialize;
use serde_json::Value;
use time::{macros::datetime, OffsetDateTime};

use super::{
    snapshot::{HistoricalParty, HistoricalService},
    ObjectId, Record,
};

/// Date the ERP uses for "never".
pub const NEVER: OffsetDateTime = datetime!(0001-01-01 0:00 UTC);

/// ERP-style enumeration value: discriminator, numeric code and label.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Coded {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "Codigo")]
    pub code: i32,
    #[serde(rename = "Descricao")]
    pub description: &'static str,
}

impl Coded {
    pub const fn new(
        kind: &'static str,
        code: i32,
        description: &'static str,
    ) -> Self {
        Self {
            kind,
            code,
            description,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceOrder {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "_t")]
    pub kinds: [&'static str; 5],
    #[serde(rename = "InformacoesPesquisa")]
    pub search_terms: Vec<String>,
    #[serde(rename = "Versao")]
    pub version: String,
    #[serde(rename = "Ativo")]
    pub active: bool,
    #[serde(rename = "Numero")]
    pub number: i64,
    #[serde(rename = "DataHoraEmissao", with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(rename = "Pessoa")]
    pub customer: HistoricalParty,
    #[serde(rename = "EmpresaReferencia")]
    pub company_ref: ObjectId,
    #[serde(rename = "Empresa")]
    pub company: HistoricalParty,
    #[serde(rename = "OrigemMobile")]
    pub from_mobile: bool,
    #[serde(rename = "OrigemPedirMenu")]
    pub from_menu: bool,
    #[serde(rename = "ItensBase")]
    pub items: Vec<ServiceItem>,
    #[serde(rename = "PagamentoRecebimento")]
    pub payment: Receivable,
    #[serde(rename = "Situacao")]
    pub situation: Situation,
    #[serde(rename = "Historicos")]
    pub history: Vec<SituationChange>,
    #[serde(rename = "Notificar")]
    pub notify: bool,
    #[serde(rename = "DataUltimaConsultaSituacao", with = "time::serde::rfc3339")]
    pub last_situation_check: OffsetDateTime,
    #[serde(rename = "Convertida")]
    pub converted: bool,
    #[serde(rename = "ModalidadeFrete")]
    pub freight: Coded,
    #[serde(rename = "Observacao")]
    pub note: String,
    #[serde(rename = "DataHoraPrevisao", with = "time::serde::rfc3339")]
    pub expected_at: OffsetDateTime,
    #[serde(rename = "Atendimento")]
    pub attendance: Coded,
    #[serde(rename = "Objetos")]
    pub objects: Vec<ServiceObject>,
    #[serde(rename = "Animais")]
    pub animals: Vec<Value>,
    #[serde(rename = "DocumentoFiscalProdutoReferencia")]
    pub fiscal_document_ref: ObjectId,
    #[serde(rename = "StatusDocumentoAuxiliarOrdemServico")]
    pub order_status: OrderStatus,
    #[serde(rename = "DevolvidoLocacao")]
    pub returned_rental: bool,
    #[serde(rename = "MovimentacoesReferenciadas")]
    pub referenced_documents: Vec<ObjectId>,
    #[serde(rename = "HistoricosDavDevolvido")]
    pub returned_history: Vec<Value>,
    #[serde(rename = "TipoDavOs")]
    pub order_kind: Coded,
    #[serde(rename = "DadosContrato")]
    pub contract_data: String,
    #[serde(rename = "DataVencimentoContrato", with = "time::serde::rfc3339")]
    pub contract_due: OffsetDateTime,
    #[serde(rename = "ImprimirPagamentoContrato")]
    pub print_contract_payment: bool,
    #[serde(rename = "DataHoraRecebimento", with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(rename = "Prioridade")]
    pub priority: Coded,
    #[serde(rename = "IndicadorPresencaComprador")]
    pub buyer_presence: Coded,
    #[serde(rename = "IndicadorOperacaoConsumidorFinal")]
    pub final_consumer: Coded,
}

impl ServiceOrder {
    pub const KINDS: [&'static str; 5] = [
        "Movimentacao",
        "DocumentoAuxiliar",
        "DocumentoAuxiliarPrevisao",
        "DocumentoAuxiliarVendaBase",
        "DocumentoAuxiliarVendaOrdemServico",
    ];

    /// Serializes the document into an insertable record.
    pub fn to_record(&self) -> Result<Record, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(record) => Ok(record),
            other => Err(serde::ser::Error::custom(format!(
                "expected an object, got {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Situation {
    #[serde(rename = "_t")]
    pub kinds: [&'static str; 2],
    #[serde(rename = "Codigo")]
    pub code: i32,
    #[serde(rename = "Descricao")]
    pub description: &'static str,
}

impl Situation {
    pub const AWAITING: Self = Self {
        kinds: ["SituacaoMovimentacao", "Aguardando"],
        code: 1,
        description: "Aguardando",
    };
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SituationChange {
    #[serde(rename = "SituacaoMovimentacao")]
    pub situation: Situation,
    #[serde(rename = "NomeUsuario")]
    pub user_name: String,
    #[serde(rename = "Observacao")]
    pub note: String,
    #[serde(rename = "DataHora", with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderStatus {
    #[serde(rename = "Status")]
    pub status: StatusCode,
    #[serde(rename = "Observacao")]
    pub note: String,
    #[serde(rename = "DataHora", with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    #[serde(rename = "Usuario")]
    pub user_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusCode {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "Codigo")]
    pub code: i32,
}

impl StatusCode {
    pub const ANALYSIS: Self = Self {
        kind: "Analise",
        code: 16,
    };
    pub const AWAITING_PAYMENT: Self = Self {
        kind: "Aguardando",
        code: 6,
    };
}

/// Billed line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceItem {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "ProdutoServicoEmpresaReferencia")]
    pub company_service_ref: ObjectId,
    #[serde(rename = "VendedorReferencia")]
    pub seller_ref: ObjectId,
    #[serde(rename = "TecnicoReferencia")]
    pub technician_ref: ObjectId,
    #[serde(rename = "DataHora", with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    #[serde(rename = "ProdutoServico")]
    pub service: HistoricalService,
    #[serde(rename = "Cancelado")]
    pub cancelled: bool,
    #[serde(rename = "Quantidade")]
    pub quantity: f64,
    #[serde(rename = "DecimaisQuantidade")]
    pub quantity_decimals: u8,
    #[serde(rename = "PrecoUnitario")]
    pub unit_price: f64,
    #[serde(rename = "DecimaisPrecoUnitario")]
    pub unit_price_decimals: u8,
    #[serde(rename = "Numero")]
    pub number: u32,
    #[serde(rename = "Observacao")]
    pub note: String,
    #[serde(rename = "NCMNBS")]
    pub nbs: Nbs,
    #[serde(rename = "DescontoDigitado")]
    pub typed_discount: f64,
    #[serde(rename = "DescontoProporcional")]
    pub proportional_discount: f64,
    #[serde(rename = "OutrasDespesasDigitado")]
    pub typed_other_expenses: f64,
    #[serde(rename = "OutrasDespesasProporcional")]
    pub proportional_other_expenses: f64,
    #[serde(rename = "Frete")]
    pub freight: f64,
    #[serde(rename = "Seguro")]
    pub insurance: f64,
    #[serde(rename = "OperacaoFiscal")]
    pub fiscal_operation: Record,
    #[serde(rename = "PIS")]
    pub pis: PisCofins,
    #[serde(rename = "COFINS")]
    pub cofins: PisCofins,
    #[serde(rename = "ISS")]
    pub iss: Iss,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Nbs {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "Codigo")]
    pub code: &'static str,
    #[serde(rename = "Descricao")]
    pub description: &'static str,
    #[serde(rename = "AliquotaNacional")]
    pub national_rate: f64,
    #[serde(rename = "Fonte")]
    pub source: &'static str,
}

impl Nbs {
    pub const UNSPECIFIED: Self = Self {
        kind: "NBS",
        code: "00000000",
        description: "SERVICO NAO ESPECIFICADO",
        national_rate: 0.0,
        source: "FONTE PROPRIA",
    };
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PisCofins {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "CstPISCOFINS")]
    pub cst: Coded,
    #[serde(rename = "NaturezaReceita")]
    pub revenue_nature: RevenueNature,
}

impl PisCofins {
    pub const EXEMPT: Self = Self {
        kind: "PISCOFINSNaoTributadoComNaturezaReceitaSaida",
        cst: Coded::new("OperacaoIsentaDaContribuicao", 7, "Isenta"),
        revenue_nature: RevenueNature {
            code: 101,
            description: "Outras",
        },
    };
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RevenueNature {
    #[serde(rename = "Codigo")]
    pub code: i32,
    #[serde(rename = "Descricao")]
    pub description: &'static str,
}

/// Municipal service tax block of a line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Iss {
    #[serde(rename = "_t")]
    pub kind: String,
    #[serde(rename = "CstIss")]
    pub cst: Value,
    #[serde(rename = "OperacaoFiscalReferencia")]
    pub fiscal_operation_ref: ObjectId,
    #[serde(rename = "TipoTributacaoIss")]
    pub taxation_kind: i64,
    #[serde(rename = "Percentual")]
    pub percent: f64,
    #[serde(rename = "PercentualBaseCalculo")]
    pub base_percent: f64,
    #[serde(rename = "TruncarValorImposto")]
    pub truncate: bool,
}

/// Equipment or subject of the service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceObject {
    #[serde(rename = "DataFinalGarantia", with = "time::serde::rfc3339")]
    pub warranty_until: OffsetDateTime,
    #[serde(rename = "PossuiGarantia")]
    pub has_warranty: bool,
    #[serde(rename = "Defeito")]
    pub defect: String,
    #[serde(rename = "Diagnostico")]
    pub diagnosis: String,
    #[serde(rename = "Objeto")]
    pub asset: Option<Record>,
    #[serde(rename = "CamposPersonalizados")]
    pub custom_fields: Vec<CustomDateField>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomDateField {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "TipoCampoPersonalizadoReferencia")]
    pub field_ref: ObjectId,
    #[serde(rename = "ExibirImpressao")]
    pub printable: bool,
    #[serde(rename = "Valor", with = "time::serde::rfc3339")]
    pub value: OffsetDateTime,
}

impl CustomDateField {
    pub fn new(field_ref: ObjectId, value: OffsetDateTime) -> Self {
        Self {
            kind: "CampoPersonalizadoDataHora",
            field_ref,
            printable: true,
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Receivable {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "Parcelas")]
    pub installments: Vec<Installment>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Installment {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "Referencia")]
    pub reference: i64,
    #[serde(rename = "InformacoesPesquisa")]
    pub search_terms: Vec<String>,
    #[serde(rename = "Versao")]
    pub version: String,
    #[serde(rename = "Ativo")]
    pub active: bool,
    #[serde(rename = "Ordem")]
    pub order: u32,
    #[serde(rename = "Descricao")]
    pub description: String,
    #[serde(rename = "Observacao")]
    pub note: String,
    #[serde(rename = "PessoaReferencia")]
    pub customer_ref: Option<ObjectId>,
    #[serde(rename = "Vencimento", with = "time::serde::rfc3339")]
    pub due_at: OffsetDateTime,
    #[serde(rename = "DataEmissao", with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(rename = "Historico")]
    pub history: Vec<InstallmentEntry>,
    #[serde(rename = "Situacao")]
    pub situation: StatusCode,
    #[serde(rename = "ContaReferencia")]
    pub account_ref: ObjectId,
    #[serde(rename = "EmpresaReferencia")]
    pub company_ref: ObjectId,
    #[serde(rename = "NomeUsuario")]
    pub user_name: String,
    #[serde(rename = "Pessoa")]
    pub customer: HistoricalParty,
    #[serde(rename = "Juro")]
    pub interest: Interest,
    #[serde(rename = "Multa")]
    pub fine: Fine,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstallmentEntry {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "Valor")]
    pub amount: f64,
    #[serde(rename = "EspeciePagamento")]
    pub payment_kind: PaymentKind,
    #[serde(rename = "PlanoContaCodigoUnico")]
    pub ledger_code: String,
    #[serde(rename = "CentroCustoCodigoUnico")]
    pub cost_center_code: String,
    #[serde(rename = "ContaReferencia")]
    pub account_ref: ObjectId,
    #[serde(rename = "EmpresaReferencia")]
    pub company_ref: ObjectId,
    #[serde(rename = "NomeUsuario")]
    pub user_name: String,
    #[serde(rename = "Data", with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    #[serde(rename = "ChequeReferencia")]
    pub cheque_ref: ObjectId,
    #[serde(rename = "Editado")]
    pub edited: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentKind {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "Codigo")]
    pub code: i32,
    #[serde(rename = "Descricao")]
    pub description: &'static str,
    #[serde(rename = "EspecieRecebimento")]
    pub receipt: Tagged,
}

impl PaymentKind {
    pub const CASH: Self = Self {
        kind: "EspeciePagamentoECF",
        code: 1,
        description: "Dinheiro",
        receipt: Tagged { kind: "Dinheiro" },
    };
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tagged {
    #[serde(rename = "_t")]
    pub kind: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Interest {
    #[serde(rename = "_t")]
    pub kind: &'static str,
    #[serde(rename = "Codigo")]
    pub code: i32,
    #[serde(rename = "Descricao")]
    pub description: &'static str,
    #[serde(rename = "Percentual")]
    pub percent: f64,
    #[serde(rename = "DiasCarencia")]
    pub grace_days: u32,
}

impl Interest {
    pub const NONE: Self = Self {
        kind: "JuroSimples",
        code: 1,
        description: "Simples",
        percent: 0.0,
        grace_days: 0,
    };
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Fine {
    #[serde(rename = "Percentual")]
    pub percent: f64,
    #[serde(rename = "DiasCarencia")]
    pub grace_days: u32,
}

impl Fine {
    pub const NONE: Self = Self {
        percent: 0.0,
        grace_days: 0,
    };
}

/// Version stamp in the format of a .NET `TimeSpan` since 0001-01-01:
/// `days.HH:MM:SS.fffffff`, the fraction being 100 ns ticks.
pub fn dotnet_version(at: OffsetDateTime) -> String {
    const DAYS_TO_UNIX_EPOCH: i64 = 719_162;
    const MS_PER_DAY: i64 = 86_400_000;
    const TICKS_PER_MS: i64 = 10_000;

    let ms = i64::try_from(at.unix_timestamp_nanos() / 1_000_000)
        .unwrap_or_default();
    let days = ms.div_euclid(MS_PER_DAY) + DAYS_TO_UNIX_EPOCH;
    let today = ms.rem_euclid(MS_PER_DAY);

    format!(
        "{days}.{:02}:{:02}:{:02}.{:07}",
        today / 3_600_000,
        today % 3_600_000 / 60_000,
        today % 60_000 / 1_000,
        today % 1_000 * TICKS_PER_MS,
    )
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn formats_dotnet_version() {
        assert_eq!(
            dotnet_version(datetime!(1970-01-01 0:00 UTC)),
            "719162.00:00:00.0000000"
        );
        assert_eq!(
            dotnet_version(datetime!(2025-12-01 13:45:07.123 UTC)),
            "739585.13:45:07.1230000"
        );
    }
}
