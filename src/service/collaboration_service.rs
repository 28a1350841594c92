use std::sync::Arc;
use chrono::{DateTime, NaiveDate, Utc};
use validator::{ValidationError, ValidationErrors};
use crate::{
    config::BillingPolicy,
    domain::*,
    error::{AppError, Result},
    notifications::{BillingEvent, NotificationManager},
    repository::{CollaborationRepository, OrderRepository, UserRepository},
};

/// Card token returned by the gateway on the first successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardToken {
    pub token: String,
    pub expiration: Option<NaiveDate>,
}

pub struct CollaborationService {
    collaborations: Arc<dyn CollaborationRepository>,
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
    notifications: Arc<NotificationManager>,
    policy: BillingPolicy,
}

impl CollaborationService {
    pub fn new(
        collaborations: Arc<dyn CollaborationRepository>,
        orders: Arc<dyn OrderRepository>,
        users: Arc<dyn UserRepository>,
        notifications: Arc<NotificationManager>,
        policy: BillingPolicy,
    ) -> Self {
        Self { collaborations, orders, users, notifications, policy }
    }

    pub async fn find(&self, id: i64) -> Result<Collaboration> {
        self.collaborations.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Collaboration not found".to_string()))
    }

    /// Validates a pledge and stores it. The collaboration starts
    /// `incomplete` and is confirmed straight away, or flagged when its
    /// national bank has no known BIC.
    pub async fn create(&self, pledge: Pledge, now: DateTime<Utc>) -> Result<Collaboration> {
        let user = match pledge.payer {
            Payer::User(id) => self.users.find_by_id(id).await?,
            Payer::Guest(_) => None,
        };

        let mut errors = match pledge.check(user.as_ref(), now.date_naive()) {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        if pledge.frequency.is_recurrent()
            && self.collaborations.find_live_recurring_for(&pledge.payer).await?.is_some()
        {
            let mut err = ValidationError::new("recurrent");
            err.message = Some("There is already a recurring collaboration for this payer".into());
            errors.add("frequency", err);
        }

        if !errors.is_empty() {
            return Err(AppError::InvalidPledge(errors));
        }

        let collaboration = self.collaborations.create(&pledge, now).await?;
        let mut collaboration = self.collaborations
            .transition(collaboration.id, CollaborationStatus::Unconfirmed, None)
            .await?;

        if collaboration.lacks_spanish_bic() {
            collaboration = self.collaborations
                .transition(
                    collaboration.id,
                    CollaborationStatus::Warning,
                    Some("No BIC is known for this Spanish bank account"),
                )
                .await?;
        }

        tracing::info!(
            "Created collaboration {} ({:?}, {:?}, {} cents)",
            collaboration.id,
            collaboration.frequency,
            collaboration.payment_type,
            collaboration.amount
        );

        Ok(collaboration)
    }

    /// Reflects a settled or failed order on its collaboration.
    pub async fn record_outcome(&self, order: &Order, card: Option<CardToken>) -> Result<()> {
        let collaboration = self.find(order.collaboration_id).await?;
        if collaboration.is_deleted() {
            tracing::info!(
                "Collaboration {} is deleted, ignoring outcome of order {}",
                collaboration.id,
                order.id
            );
            return Ok(());
        }

        match order.status {
            OrderStatus::Paid => {
                self.collaborations
                    .transition(collaboration.id, CollaborationStatus::Ok, None)
                    .await?;
            }
            OrderStatus::Warning => {
                self.collaborations
                    .transition(
                        collaboration.id,
                        CollaborationStatus::Warning,
                        Some("Payment accepted with warnings"),
                    )
                    .await?;
            }
            OrderStatus::Error | OrderStatus::Returned => {
                if collaboration.status != CollaborationStatus::Incomplete {
                    self.collaborations
                        .transition(
                            collaboration.id,
                            CollaborationStatus::Error,
                            Some("Payment failed"),
                        )
                        .await?;
                }
                return Ok(());
            }
            OrderStatus::New | OrderStatus::Charging => return Ok(()),
        }

        if let Some(card) = card.filter(|_| order.first && order.is_credit_card()) {
            self.collaborations
                .store_token(collaboration.id, &card.token, card.expiration)
                .await?;
            tracing::info!(
                "Stored card token for collaboration {} (expires {:?})",
                collaboration.id,
                card.expiration
            );
        }

        Ok(())
    }

    /// Reacts to a returned or rejected order: flags the collaboration,
    /// suspends it after too many consecutive failures, and tells the payer.
    pub async fn processed_order(&self, order: &Order, outcome: OrderOutcome) -> Result<()> {
        let collaboration = self.find(order.collaboration_id).await?;
        if collaboration.is_deleted() {
            tracing::info!(
                "Collaboration {} is deleted, skipping return handling for order {}",
                collaboration.id,
                order.id
            );
            return Ok(());
        }

        let orders = self.orders.list_for_collaboration(collaboration.id).await?;
        let returned = consecutive_failures(&orders);
        let limit_reached = returned >= self.policy.max_returned_orders;

        let was_payable = collaboration.is_payable();
        if was_payable {
            let change = if outcome.had_error {
                Some((CollaborationStatus::Error, "An order was returned with an error reason code"))
            } else if outcome.hard_failure {
                Some((CollaborationStatus::Error, "Payment rejected by the gateway"))
            } else if limit_reached {
                Some((CollaborationStatus::Error, "Too many consecutive returned orders"))
            } else if outcome.had_warning {
                Some((CollaborationStatus::Warning, "An order was returned with a warning reason code"))
            } else {
                None
            };

            if let Some((status, reason)) = change {
                self.collaborations.transition(collaboration.id, status, Some(reason)).await?;
            }
        }

        let suspended = was_payable && (outcome.had_error || outcome.hard_failure || limit_reached);

        let (recipient, militant) = self.recipient_of(&collaboration).await?;
        let collaboration = self.find(collaboration.id).await?;

        tracing::info!(
            "Order {} of collaboration {} processed: {} consecutive failures, suspended: {}",
            order.id,
            collaboration.id,
            returned,
            suspended
        );

        let event = if suspended {
            BillingEvent::CollaborationSuspended {
                collaboration,
                recipient,
                militant,
                was_first: outcome.was_first,
            }
        } else {
            BillingEvent::OrderReturned {
                collaboration,
                order: order.clone(),
                recipient,
                militant,
                was_first: outcome.was_first,
            }
        };
        self.notifications.notify(event).await;

        Ok(())
    }

    pub async fn soft_delete(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        self.collaborations.soft_delete(id, now).await?;
        tracing::info!("Collaboration {} deleted", id);
        Ok(())
    }

    async fn recipient_of(&self, collaboration: &Collaboration) -> Result<(Option<String>, bool)> {
        match &collaboration.payer {
            Payer::Guest(guest) => Ok((Some(guest.email.clone()), false)),
            Payer::User(id) => Ok(match self.users.find_by_id(*id).await? {
                Some(user) => (Some(user.email), user.militant),
                None => (None, false),
            }),
        }
    }
}

/// Returned or rejected orders at the tail of the history, ignoring
/// orders still in flight. A warning order the bank took back counts as
/// returned.
pub fn consecutive_failures(orders: &[Order]) -> u32 {
    let mut count = 0;
    for order in orders.iter().rev() {
        match order.status {
            OrderStatus::New | OrderStatus::Charging => continue,
            OrderStatus::Returned | OrderStatus::Error => count += 1,
            OrderStatus::Warning if !order.is_paid() => count += 1,
            OrderStatus::Paid | OrderStatus::Warning => break,
        }
    }
    count
}
