use std::sync::Arc;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use crate::{
    domain::*,
    error::{AppError, Result},
    payments::redsys::{
        collaboration_id_from_order_id, first_order_id, reconcile::reconciled_response, CallbackAck,
        GatewayCallback, RedsysGateway, ReconcileLine, ReconcileSummary, RedsysRequest,
    },
    repository::{CollaborationRepository, OrderRepository, OrderUpdate},
    service::{
        collaboration_service::CardToken,
        order_service::OrderService,
        scheduler::Scheduler,
    },
};

/// Tolerance between the time the gateway reports and our clock.
const CALLBACK_CLOCK_SKEW_MINUTES: i64 = 60;

/// What `charge` did with a collaboration.
#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
    /// Deleted or not payable.
    Skipped,
    /// No order is due this period.
    NothingDue,
    /// Another run holds the order.
    InProgress(Order),
    /// The period's order was already settled or given back.
    Settled(Order),
    /// First card payment: needs the payer's browser.
    AwaitingPayer(Order),
    /// Bank order waiting for the SEPA batch.
    Queued(Order),
    Paid(Order),
    Declined(Order),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChargeSummary {
    pub collaborations: usize,
    pub paid: usize,
    pub declined: usize,
    pub queued: usize,
    pub awaiting_payer: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct BillingService {
    collaborations: Arc<dyn CollaborationRepository>,
    orders: Arc<dyn OrderRepository>,
    order_service: Arc<OrderService>,
    scheduler: Arc<Scheduler>,
    gateway: Arc<RedsysGateway>,
}

impl BillingService {
    pub fn new(
        collaborations: Arc<dyn CollaborationRepository>,
        orders: Arc<dyn OrderRepository>,
        order_service: Arc<OrderService>,
        scheduler: Arc<Scheduler>,
        gateway: Arc<RedsysGateway>,
    ) -> Self {
        Self { collaborations, orders, order_service, scheduler, gateway }
    }

    /// Charges the order of the period containing `today`, creating it if due.
    pub async fn charge(
        &self,
        collaboration: &Collaboration,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ChargeOutcome> {
        if collaboration.is_deleted() || !collaboration.is_payable() {
            return Ok(ChargeOutcome::Skipped);
        }

        let Some(order) = self.scheduler.current_order(collaboration, today, now).await? else {
            return Ok(ChargeOutcome::NothingDue);
        };

        match order.status {
            OrderStatus::New => {}
            OrderStatus::Charging => return Ok(ChargeOutcome::InProgress(order)),
            _ => return Ok(ChargeOutcome::Settled(order)),
        }

        if collaboration.is_bank() {
            return Ok(ChargeOutcome::Queued(order));
        }

        if order.first || collaboration.gateway_token.is_none() {
            return Ok(ChargeOutcome::AwaitingPayer(order));
        }

        self.charge_recurring(&order, collaboration, now).await
    }

    /// Direct payment of a card order with the stored token. A transport
    /// failure leaves the order `charging` until `reconcile_card_orders`
    /// resolves it.
    pub async fn charge_recurring(
        &self,
        order: &Order,
        collaboration: &Collaboration,
        now: DateTime<Utc>,
    ) -> Result<ChargeOutcome> {
        let charging = match self.order_service.mark_as_charging(order).await {
            Ok(order) => order,
            Err(AppError::Conflict(msg)) => {
                tracing::info!("Order {} already taken: {}", order.id, msg);
                return Ok(ChargeOutcome::InProgress(order.clone()));
            }
            Err(e) => return Err(e),
        };

        let response = match self.gateway.direct_payment(&charging, collaboration).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    "Direct payment for order {} failed, order left charging: {}",
                    charging.id,
                    e
                );
                return Err(e);
            }
        };

        if response.is_ok() {
            let update = OrderUpdate {
                payment_response: Some(response.to_json()),
                ..Default::default()
            };
            let paid = self.order_service
                .settle(&charging, OrderStatus::Paid, now, update, None)
                .await?;
            Ok(ChargeOutcome::Paid(paid))
        } else {
            let declined = self.order_service
                .processed_with_response(
                    &charging,
                    ReturnReason::GatewayDecline(response.code().map(str::to_string)),
                    Some(response.to_json()),
                )
                .await?;
            Ok(ChargeOutcome::Declined(declined))
        }
    }

    /// Charges every payable collaboration. Failures are logged and counted;
    /// they never stop the run.
    pub async fn charge_all(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<ChargeSummary> {
        let collaborations = self.collaborations.list_payable().await?;
        let mut summary = ChargeSummary {
            collaborations: collaborations.len(),
            ..Default::default()
        };

        for collaboration in &collaborations {
            match self.charge(collaboration, today, now).await {
                Ok(ChargeOutcome::Paid(_)) => summary.paid += 1,
                Ok(ChargeOutcome::Declined(_)) => summary.declined += 1,
                Ok(ChargeOutcome::Queued(_)) => summary.queued += 1,
                Ok(ChargeOutcome::AwaitingPayer(_)) => summary.awaiting_payer += 1,
                Ok(_) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!("Charging collaboration {} failed: {}", collaboration.id, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!("Charge run for {} finished: {:?}", today, summary);
        Ok(summary)
    }

    /// Resolves card orders left `charging` by a lost gateway answer, using
    /// the outcome found in the gateway's back office. Each line stands
    /// alone.
    pub async fn reconcile_card_orders(&self, lines: Vec<ReconcileLine>, now: DateTime<Utc>) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for line in lines {
            match self.reconcile(&line, now).await {
                Ok(order) if order.is_paid() => {
                    summary.paid += 1;
                    tracing::info!("Order {} reconciled as paid", order.id);
                }
                Ok(order) => {
                    summary.declined += 1;
                    tracing::info!("Order {} reconciled as {}", order.id, order.status_text());
                }
                Err(e) => {
                    tracing::warn!("Reconciliation of order {} failed: {}", line.order_id, e);
                    summary.failed.push((line.order_id, e.to_string()));
                }
            }
        }

        summary
    }

    async fn reconcile(&self, line: &ReconcileLine, now: DateTime<Utc>) -> Result<Order> {
        let order = self.order_service.find(line.order_id).await?;
        if !order.is_credit_card() {
            return Err(AppError::BadRequest(format!("Order {} is not a card order", order.id)));
        }
        if order.status != OrderStatus::Charging {
            return Err(AppError::Conflict(format!(
                "Order {} is {:?}, only charging orders are reconciled",
                order.id, order.status
            )));
        }

        let response = reconciled_response(line.response_code.as_deref());
        if line.paid {
            let update = OrderUpdate {
                payment_response: response,
                ..Default::default()
            };
            self.order_service
                .settle(&order, OrderStatus::Paid, now, update, None)
                .await
        } else {
            self.order_service
                .processed_with_response(
                    &order,
                    ReturnReason::GatewayDecline(line.response_code.clone()),
                    response,
                )
                .await
        }
    }

    /// Signed form for the payer's first card payment.
    pub async fn first_payment_form(&self, collaboration_id: i64, now: DateTime<Utc>) -> Result<RedsysRequest> {
        let collaboration = self.collaborations.find_by_id(collaboration_id).await?
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| AppError::NotFound("Collaboration not found".to_string()))?;

        if !collaboration.is_credit_card() {
            return Err(AppError::BadRequest("Collaboration is not paid by card".to_string()));
        }
        if !collaboration.is_payable() {
            return Err(AppError::Conflict(format!(
                "Collaboration {} is {:?}",
                collaboration.id, collaboration.status
            )));
        }

        let merchant_order_id = first_order_id(collaboration.id, now)?;

        let order = self.scheduler
            .current_order(&collaboration, now.date_naive(), now)
            .await?
            .ok_or_else(|| AppError::NotFound("No order is due".to_string()))?;

        if !order.first || !order.is_payable() {
            return Err(AppError::Conflict(format!(
                "Order {} is not awaiting a first payment",
                order.id
            )));
        }

        let order = self.orders.set_gateway_order_id(order.id, &merchant_order_id).await?;

        tracing::info!(
            "Payment form for order {} of collaboration {} as {}",
            order.id,
            collaboration.id,
            merchant_order_id
        );

        self.gateway.payment_form(&order, &collaboration, &merchant_order_id)
    }

    /// Applies a gateway notification. Returns whether the order ends up
    /// paid, which is what the acknowledgement reports.
    pub async fn process_callback(&self, callback: &GatewayCallback, now: DateTime<Utc>) -> Result<bool> {
        let merchant_order_id = callback
            .order_id()
            .ok_or_else(|| AppError::BadRequest("Callback lacks Ds_Order".to_string()))?;

        let Some(order) = self.locate_order(merchant_order_id, now).await? else {
            tracing::warn!("No order matches gateway order {}", merchant_order_id);
            return Ok(false);
        };

        if !order.first || !order.is_payable() {
            tracing::info!(
                "Ignoring callback {} for order {} ({:?}, first: {})",
                merchant_order_id,
                order.id,
                order.status,
                order.first
            );
            return Ok(order.is_paid());
        }

        if let Some(code) = callback.merchant_code() {
            if code != self.gateway.config().merchant_code {
                return Err(AppError::BadRequest(format!(
                    "Callback for foreign merchant {}",
                    code
                )));
            }
        }

        if !callback.is_success() {
            tracing::info!(
                "Gateway declined order {} with {:?}",
                order.id,
                callback.response_code()
            );
            let declined = self.order_service
                .processed_with_response(
                    &order,
                    ReturnReason::GatewayDecline(callback.response_code().map(str::to_string)),
                    Some(callback.to_json()),
                )
                .await?;
            return Ok(declined.is_paid());
        }

        let signature_ok = self.gateway.verify_callback(callback);
        let clock_ok = callback.reported_at().map_or(false, |at| {
            (at - now).abs() <= Duration::minutes(CALLBACK_CLOCK_SKEW_MINUTES)
        });
        let status = if signature_ok && clock_ok {
            OrderStatus::Paid
        } else {
            tracing::warn!(
                "Callback for order {} accepted with warning (signature: {}, clock: {})",
                order.id,
                signature_ok,
                clock_ok
            );
            OrderStatus::Warning
        };

        let card = callback.identifier().map(|token| CardToken {
            token: token.to_string(),
            expiration: callback.expiry(),
        });
        let update = OrderUpdate {
            payment_response: Some(callback.to_json()),
            payment_identifier: card.as_ref().map(|c| c.token.clone()),
            ..Default::default()
        };

        let settled = self.order_service.settle(&order, status, now, update, card).await?;
        Ok(settled.is_paid())
    }

    pub fn callback_ack(&self, callback: Option<&GatewayCallback>, paid: bool) -> CallbackAck {
        self.gateway.callback_ack(callback, paid)
    }

    /// By stored merchant order id, or through the collaboration embedded in
    /// a first-order id.
    async fn locate_order(&self, merchant_order_id: &str, now: DateTime<Utc>) -> Result<Option<Order>> {
        if let Some(order) = self.orders.find_by_gateway_order_id(merchant_order_id).await? {
            return Ok(Some(order));
        }

        let Some(collaboration_id) = collaboration_id_from_order_id(merchant_order_id) else {
            return Ok(None);
        };
        let Some(collaboration) = self.collaborations.find_by_id(collaboration_id).await? else {
            return Ok(None);
        };

        match self.scheduler.current_order(&collaboration, now.date_naive(), now).await? {
            Some(order) => Ok(Some(
                self.orders.set_gateway_order_id(order.id, merchant_order_id).await?,
            )),
            None => Ok(None),
        }
    }
}
