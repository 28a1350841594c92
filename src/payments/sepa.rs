use std::io::{Read, Write};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::SepaConfig,
    domain::*,
    error::{AppError, Result},
    repository::{CollaborationRepository, OrderRepository, UserRepository},
    service::order_service::OrderService,
};

/// One direct debit line of the outgoing batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SepaDebitRecord {
    pub reference: String,
    pub debtor_name: String,
    pub debtor_document: String,
    pub debtor_email: String,
    pub debtor_address: String,
    pub iban: String,
    pub ccc: String,
    pub bic: String,
    /// Cents.
    pub amount: i64,
    pub due_code: &'static str,
    pub mandate_reference: String,
    pub mandate_date: NaiveDate,
    pub concept: String,
    pub collection_date: NaiveDate,
    pub frequency: Frequency,
    pub creditor_identifier: String,
}

/// `YYMM` of the order's period followed by the last six digits of its id.
pub fn debit_reference(order: &Order) -> String {
    format!(
        "{:02}{:02}{:06}",
        order.period.year().rem_euclid(100),
        order.period.month(),
        order.id % 1_000_000
    )
}

/// A line of a bank return file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReturnLine {
    pub order_id: i64,
    #[serde(default)]
    pub reason_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnsSummary {
    pub processed: usize,
    pub failed: Vec<(i64, String)>,
}

pub fn read_returns<R: Read>(reader: R) -> Result<Vec<(i64, Option<String>)>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    csv.deserialize::<ReturnLine>()
        .map(|line| {
            line.map(|l| (l.order_id, l.reason_code.filter(|c| !c.is_empty())))
                .map_err(|e| AppError::BadRequest(format!("Invalid return line: {}", e)))
        })
        .collect()
}

pub fn write_csv<W: Write>(writer: W, records: &[SepaDebitRecord]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(record)
            .map_err(|e| AppError::Internal(format!("Failed to write debit record: {}", e)))?;
    }
    csv.flush()
        .map_err(|e| AppError::Internal(format!("Failed to flush debit batch: {}", e)))?;
    Ok(())
}

/// Bank collection cycle: submit the period's orders, export them for the
/// bank, settle them, then apply the returns the bank sends back.
pub struct SepaBatch {
    config: SepaConfig,
    collaborations: Arc<dyn CollaborationRepository>,
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
    order_service: Arc<OrderService>,
}

impl SepaBatch {
    pub fn new(
        config: SepaConfig,
        collaborations: Arc<dyn CollaborationRepository>,
        orders: Arc<dyn OrderRepository>,
        users: Arc<dyn UserRepository>,
        order_service: Arc<OrderService>,
    ) -> Self {
        Self { config, collaborations, orders, users, order_service }
    }

    pub async fn mark_due_orders_as_charging(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<u64> {
        self.order_service.mark_due_orders_as_charging(date, now).await
    }

    pub async fn mark_charging_orders_as_paid(&self, date: NaiveDate) -> Result<u64> {
        self.order_service.mark_charging_orders_as_paid(date).await
    }

    /// Debit records for the charging bank orders of `date`'s period.
    pub async fn export(&self, date: NaiveDate) -> Result<Vec<SepaDebitRecord>> {
        let orders = self.orders
            .list_bank_orders(BillingPeriod::of(date), OrderStatus::Charging)
            .await?;

        let mut records = Vec::with_capacity(orders.len());
        for order in &orders {
            let Some(collaboration) = self.collaborations.find_by_id(order.collaboration_id).await? else {
                tracing::warn!("Order {} has no collaboration, left out of the batch", order.id);
                continue;
            };
            records.push(self.record_for(order, &collaboration).await?);
        }

        tracing::info!("Exported {} debit records for {}", records.len(), BillingPeriod::of(date));
        Ok(records)
    }

    /// Applies a bank return file. Each line stands alone: a bad line is
    /// reported and the rest still go through.
    pub async fn process_returns(&self, lines: Vec<(i64, Option<String>)>) -> ReturnsSummary {
        let mut summary = ReturnsSummary::default();

        for (order_id, code) in lines {
            let reason = match code {
                Some(code) => ReturnReason::Sepa(code),
                None => ReturnReason::Unspecified,
            };

            let result = match self.order_service.find(order_id).await {
                Ok(order) => self.order_service.processed(&order, reason).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(order) => {
                    summary.processed += 1;
                    tracing::info!("Return applied to order {}: {}", order.id, order.status_text());
                }
                Err(e) => {
                    tracing::warn!("Return for order {} failed: {}", order_id, e);
                    summary.failed.push((order_id, e.to_string()));
                }
            }
        }

        summary
    }

    async fn record_for(&self, order: &Order, collaboration: &Collaboration) -> Result<SepaDebitRecord> {
        let (name, document, email, address) = match &collaboration.payer {
            Payer::Guest(guest) => (
                guest.full_name.clone(),
                guest.document_vatid.clone(),
                guest.email.clone(),
                join_address(&guest.address, &guest.postal_code, &guest.town_name, &guest.country),
            ),
            Payer::User(id) => match self.users.find_by_id(*id).await? {
                Some(user) => (
                    user.full_name.clone(),
                    user.document_vatid.clone(),
                    user.email.clone(),
                    join_address(&user.address, &user.postal_code, &user.town_name, &user.country),
                ),
                None => (String::new(), String::new(), String::new(), String::new()),
            },
        };

        let account = collaboration.bank_account.as_ref();

        Ok(SepaDebitRecord {
            reference: debit_reference(order),
            debtor_name: name,
            debtor_document: document,
            debtor_email: email,
            debtor_address: address,
            iban: account.and_then(|a| a.iban()).unwrap_or_default(),
            ccc: account.and_then(|a| a.ccc_full()).unwrap_or_default(),
            bic: account.and_then(|a| a.bic()).unwrap_or_default(),
            amount: order.amount,
            due_code: order.due_code(),
            mandate_reference: collaboration.id.to_string(),
            mandate_date: collaboration.created_at.date_naive(),
            concept: order.reference.clone(),
            collection_date: order.payable_at,
            frequency: collaboration.frequency,
            creditor_identifier: self.config.creditor_identifier.clone(),
        })
    }
}

fn join_address(street: &str, postal_code: &str, town: &str, country: &str) -> String {
    [street, postal_code, town, country]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
