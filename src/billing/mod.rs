//! Generation of ERP service orders from finished tickets.
//!
//! Everything the document needs is resolved before anything is written:
//! a failing lookup leaves the ERP untouched, apart from the document
//! number which is allocated right before the single insert.

mod assemble;
mod claim;
mod pricing;
mod tax;

#[cfg(test)]
mod tests;

use std::error::Error as StdError;

use derive_more::{Display, From};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::{
    config,
    db::{ticket, IntegrationConfig, Ticket},
    legacy::{self, Collection, Filter, ObjectId, Record},
    lifecycle::AlreadyBilled,
    sequence,
};

pub use self::{
    claim::{Claim, InFlight, TicketLedger},
    pricing::{billed_hours, Charge},
    tax::{default_iss, TaxSource},
};

/// Builds service orders against an ERP [`legacy::Store`].
pub struct ServiceOrderBuilder<'a, S: ?Sized> {
    store: &'a S,
    settings: &'a config::Billing,
}

/// Outcome of [`ServiceOrderBuilder::generate`].
#[derive(Clone, Debug, PartialEq)]
pub struct Generated {
    /// Number of the document within its issuing company.
    pub number: i64,
    pub id: ObjectId,
    pub tax_source: TaxSource,
    pub charge: Charge,
}

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("integration settings are incomplete, missing: {}", _0.join(", "))]
    ConfigIncomplete(Vec<&'static str>),

    #[from]
    #[display("{_0}")]
    AlreadyBilled(AlreadyBilled),

    #[display("client {_0:?} was not found in the ERP")]
    ClientNotFound(String),

    #[display("{_0} was not found in the ERP")]
    ReferenceDataMissing(&'static str),

    #[from]
    #[display("{_0}")]
    Connection(legacy::Error),
}

impl StdError for Error {}

/// Failure of [`ServiceOrderBuilder::bill`].
#[derive(Debug, Display, From)]
pub enum BillError<E> {
    #[display("ticket not found")]
    TicketNotFound,

    #[display("ticket is already being billed")]
    InProgress,

    #[display("ticket was billed concurrently")]
    Conflict,

    #[from]
    #[display("{_0}")]
    Billing(Error),

    #[display("ticket storage failed")]
    Ledger(E),
}

/// Integration settings with every required mapping present.
#[derive(Clone, Debug)]
struct Mappings {
    company: ObjectId,
    asset: ObjectId,
    service: ObjectId,
    fiscal_operation: ObjectId,
    start_field: Option<ObjectId>,
    end_field: Option<ObjectId>,
}

impl Mappings {
    fn new(config: &IntegrationConfig) -> Result<Self, Error> {
        match (
            &config.company_id,
            &config.asset_id,
            &config.service_id,
            &config.fiscal_operation_id,
        ) {
            (Some(company), Some(asset), Some(service), Some(fiscal_op)) => {
                Ok(Self {
                    company: company.clone(),
                    asset: asset.clone(),
                    service: service.clone(),
                    fiscal_operation: fiscal_op.clone(),
                    start_field: config.start_field_id.clone(),
                    end_field: config.end_field_id.clone(),
                })
            }
            (company, asset, service, fiscal_op) => {
                let missing = [
                    ("companyId", company.is_none()),
                    ("assetId", asset.is_none()),
                    ("serviceId", service.is_none()),
                    ("fiscalOperationId", fiscal_op.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(Error::ConfigIncomplete(missing))
            }
        }
    }
}

/// ERP records a service order is built from.
#[derive(Clone, Debug)]
struct References {
    customer: Record,
    company: Record,
    asset: Option<Record>,
    service: Record,
    company_service: Option<Record>,
    fiscal_operation: Record,
    account: Option<Record>,
    ledger: Option<Record>,
    cost_center: Option<Record>,
}

impl<'a, S> ServiceOrderBuilder<'a, S>
where
    S: legacy::Store + ?Sized,
{
    pub fn new(store: &'a S, settings: &'a config::Billing) -> Self {
        Self { store, settings }
    }

    /// Bills ticket `id` and records the generated document on it.
    ///
    /// The ticket is claimed in `in_flight` before it is read, so a
    /// concurrent request for the same ticket either fails to claim it or
    /// reads it already billed.
    pub async fn bill<L>(
        &self,
        ledger: &L,
        in_flight: &InFlight,
        config: &IntegrationConfig,
        id: ticket::Id,
        now: OffsetDateTime,
    ) -> Result<Generated, BillError<L::Error>>
    where
        L: TicketLedger + ?Sized,
    {
        let _claim = in_flight.claim(id).ok_or(BillError::InProgress)?;
        let ticket = ledger
            .load_ticket(id)
            .await
            .map_err(BillError::Ledger)?
            .ok_or(BillError::TicketNotFound)?;

        let generated = self.generate(config, &ticket, now).await?;

        let recorded = ledger
            .record_billing(id, generated.number, &generated.id)
            .await
            .map_err(BillError::Ledger)?;
        if !recorded {
            error!(
                ticket = %ticket.number,
                number = generated.number,
                id = %generated.id,
                "service order generated for an already billed ticket",
            );
            return Err(BillError::Conflict);
        }
        Ok(generated)
    }

    /// Creates the service order billing `ticket` and returns its number and
    /// identifier. Storing them on the ticket is up to the caller.
    pub async fn generate(
        &self,
        config: &IntegrationConfig,
        ticket: &Ticket,
        now: OffsetDateTime,
    ) -> Result<Generated, Error> {
        let mappings = Mappings::new(config)?;
        ticket.ensure_not_billed()?;

        info!(ticket = %ticket.number, "generating service order");

        let refs = self.resolve(&mappings, ticket).await?;
        let (iss, tax_source) = tax::resolve(
            self.store,
            refs.company_service.as_ref(),
            &refs.service,
            &mappings.fiscal_operation,
        )
        .await?;
        if tax_source == TaxSource::Fallback {
            warn!(
                ticket = %ticket.number,
                percent = iss.percent,
                "no ISS configured for the service, using the default",
            );
        }

        let company_price = refs
            .company_service
            .as_ref()
            .and_then(|r| r.get("PrecoVenda"))
            .and_then(|p| p.as_f64());
        let charge = Charge::compute(
            ticket.total_minutes,
            company_price,
            self.settings.hourly_rate,
        );

        let number =
            sequence::next_document_number(self.store, &mappings.company)
                .await?;

        let order = assemble::service_order(assemble::Parts {
            ticket,
            mappings: &mappings,
            refs,
            iss,
            charge: &charge,
            number,
            user_name: &self.settings.user_name,
            now,
        });
        let record = order
            .to_record()
            .map_err(|e| legacy::Error::Malformed(e.to_string()))?;
        let id = self.store.insert_one(Collection::Documents, record).await?;

        info!(
            ticket = %ticket.number,
            number,
            %id,
            total = charge.total,
            "service order inserted",
        );
        Ok(Generated {
            number,
            id,
            tax_source,
            charge,
        })
    }

    async fn resolve(
        &self,
        mappings: &Mappings,
        ticket: &Ticket,
    ) -> Result<References, Error> {
        let store = self.store;
        let customer = Filter::active().eq("Nome", ticket.client.as_str());
        let company_service = Filter::new()
            .eq("ProdutoServicoReferencia", &mappings.service)
            .eq("EmpresaReferencia", &mappings.company);
        let active = Filter::active();

        let (
            customer,
            company,
            asset,
            service,
            company_service,
            fiscal_operation,
            account,
            ledger,
            cost_center,
        ) = tokio::try_join!(
            store.find_one(Collection::Parties, &customer),
            store.find_by_id(Collection::Parties, &mappings.company),
            store.find_by_id(Collection::Assets, &mappings.asset),
            store.find_by_id(Collection::Services, &mappings.service),
            store.find_one(Collection::CompanyServices, &company_service),
            store.find_by_id(
                Collection::FiscalOperations,
                &mappings.fiscal_operation,
            ),
            store.find_one(Collection::Accounts, &active),
            store.find_one(Collection::LedgerAccounts, &active),
            store.find_one(Collection::CostCenters, &active),
        )?;

        let customer =
            customer.ok_or_else(|| Error::ClientNotFound(ticket.client.clone()))?;
        let company = company.ok_or(Error::ReferenceDataMissing("company"))?;
        let service = service.ok_or(Error::ReferenceDataMissing("service"))?;
        let fiscal_operation = fiscal_operation
            .ok_or(Error::ReferenceDataMissing("fiscal operation"))?;
        if asset.is_none() {
            warn!(asset = %mappings.asset, "configured asset not found");
        }

        Ok(References {
            customer,
            company,
            asset,
            service,
            company_service,
            fiscal_operation,
            account,
            ledger,
            cost_center,
        })
    }
}
