use std::sync::Arc;
use chrono::{DateTime, NaiveDate, Utc};
use crate::{
    domain::*,
    error::{AppError, Result},
    repository::{OrderRepository, OrderUpdate},
    service::collaboration_service::{CardToken, CollaborationService},
};

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    collaborations: Arc<CollaborationService>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepository>, collaborations: Arc<CollaborationService>) -> Self {
        Self { orders, collaborations }
    }

    pub async fn find(&self, id: i64) -> Result<Order> {
        self.orders.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }

    /// new -> charging. Losing a race against another process yields
    /// `Conflict`.
    pub async fn mark_as_charging(&self, order: &Order) -> Result<Order> {
        self.orders
            .transition(order.id, OrderStatus::New, OrderStatus::Charging, OrderUpdate::default())
            .await
    }

    pub async fn mark_as_paid(&self, order: &Order, at: DateTime<Utc>) -> Result<Order> {
        self.settle(order, OrderStatus::Paid, at, OrderUpdate::default(), None).await
    }

    /// Confirms payment of an order as `paid` or, when something about the
    /// confirmation did not check out, `warning`. Orders still `new` (first
    /// card payments confirmed by a callback) pass through `charging`.
    pub async fn settle(
        &self,
        order: &Order,
        status: OrderStatus,
        at: DateTime<Utc>,
        mut update: OrderUpdate,
        card: Option<CardToken>,
    ) -> Result<Order> {
        if !matches!(status, OrderStatus::Paid | OrderStatus::Warning) {
            return Err(AppError::transition("order", order.status, status));
        }

        let from = match order.status {
            OrderStatus::New => self.mark_as_charging(order).await?.status,
            other => other,
        };

        update.payed_at = Some(at);
        let settled = self.orders.transition(order.id, from, status, update).await?;

        tracing::info!(
            "Order {} of collaboration {} settled as {:?}",
            settled.id,
            settled.collaboration_id,
            settled.status
        );

        self.collaborations.record_outcome(&settled, card).await?;
        Ok(settled)
    }

    pub async fn processed(&self, order: &Order, reason: ReturnReason) -> Result<Order> {
        self.processed_with_response(order, reason, None).await
    }

    /// Records a return or rejection and hands the outcome to the
    /// collaboration. SEPA codes are stored as the order's response unless
    /// a raw response is given.
    pub async fn processed_with_response(
        &self,
        order: &Order,
        reason: ReturnReason,
        raw_response: Option<String>,
    ) -> Result<Order> {
        let mut outcome = OrderOutcome {
            was_first: order.first,
            ..Default::default()
        };

        let (status, response) = match &reason {
            ReturnReason::Unspecified => (OrderStatus::Returned, None),
            ReturnReason::Sepa(code) => {
                let code = code.trim().to_uppercase();
                match sepa_reason(&code) {
                    Some(r) if r.error => {
                        outcome.had_error = true;
                        outcome.had_warning = r.warn;
                        (OrderStatus::Error, Some(code))
                    }
                    Some(r) if r.warn => {
                        outcome.had_warning = true;
                        (OrderStatus::Warning, Some(code))
                    }
                    _ => (OrderStatus::Returned, Some(code)),
                }
            }
            ReturnReason::GatewayDecline(_) => {
                outcome.hard_failure = true;
                (OrderStatus::Error, None)
            }
        };

        let update = OrderUpdate {
            payment_response: raw_response.or(response),
            clear_payed_at: true,
            ..Default::default()
        };
        let updated = self.orders.transition(order.id, order.status, status, update).await?;

        tracing::info!(
            "Order {} of collaboration {} processed as {:?} ({:?})",
            updated.id,
            updated.collaboration_id,
            updated.status,
            reason
        );

        self.collaborations.processed_order(&updated, outcome).await?;
        Ok(updated)
    }

    /// Bank orders of `date`'s period enter the outgoing debit batch.
    pub async fn mark_due_orders_as_charging(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<u64> {
        let count = self.orders
            .mark_bank_orders_as_charging(BillingPeriod::of(date), now)
            .await?;
        tracing::info!("{} bank orders for {} marked as charging", count, BillingPeriod::of(date));
        Ok(count)
    }

    /// Bank orders of `date`'s period still charging are settled on `date`.
    pub async fn mark_charging_orders_as_paid(&self, date: NaiveDate) -> Result<u64> {
        let paid_at = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| AppError::BadRequest(format!("Invalid settlement date {}", date)))?;

        let count = self.orders
            .mark_bank_orders_as_paid(BillingPeriod::of(date), paid_at)
            .await?;
        tracing::info!("{} bank orders for {} marked as paid", count, BillingPeriod::of(date));
        Ok(count)
    }
}
