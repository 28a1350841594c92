use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::domain::{Collaboration, Order};
use crate::error::Result;

pub mod email;
pub mod log;

pub use email::EmailNotifier;
pub use log::LogNotifier;

#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    /// The collaboration stopped being charged after repeated or hard
    /// payment failures.
    CollaborationSuspended {
        collaboration: Collaboration,
        recipient: Option<String>,
        militant: bool,
        was_first: bool,
    },
    OrderReturned {
        collaboration: Collaboration,
        order: Order,
        recipient: Option<String>,
        militant: bool,
        was_first: bool,
    },
}

impl BillingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BillingEvent::CollaborationSuspended { .. } => "collaboration_suspended",
            BillingEvent::OrderReturned { .. } => "order_returned",
        }
    }

    pub fn collaboration(&self) -> &Collaboration {
        match self {
            BillingEvent::CollaborationSuspended { collaboration, .. } => collaboration,
            BillingEvent::OrderReturned { collaboration, .. } => collaboration,
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        match self {
            BillingEvent::CollaborationSuspended { recipient, .. } => recipient.as_deref(),
            BillingEvent::OrderReturned { recipient, .. } => recipient.as_deref(),
        }
    }

    pub fn is_militant(&self) -> bool {
        match self {
            BillingEvent::CollaborationSuspended { militant, .. } => *militant,
            BillingEvent::OrderReturned { militant, .. } => *militant,
        }
    }

    /// Subject and body of the message sent to the payer. Militants pay a
    /// membership fee rather than a donation and get their own wording.
    pub fn message(&self) -> (String, String) {
        let id = self.collaboration().id;
        match (self, self.is_militant()) {
            (BillingEvent::CollaborationSuspended { .. }, true) => (
                "Your membership fee has been suspended".to_string(),
                format!(
                    "We could not collect your membership fee (collaboration {}) several times in a row, so it has been suspended. Please update your payment details to keep your membership active.",
                    id
                ),
            ),
            (BillingEvent::CollaborationSuspended { .. }, false) => (
                "Your collaboration has been suspended".to_string(),
                format!(
                    "We could not collect your collaboration {} several times in a row, so it has been suspended. You can set up a new one at any time.",
                    id
                ),
            ),
            (BillingEvent::OrderReturned { order, .. }, true) => (
                "Your membership fee was returned".to_string(),
                format!(
                    "Your bank returned the payment \"{}\" of your membership fee. Please check your payment details.",
                    order.reference
                ),
            ),
            (BillingEvent::OrderReturned { order, .. }, false) => (
                "Your collaboration payment was returned".to_string(),
                format!(
                    "Your bank returned the payment \"{}\". Please check your payment details.",
                    order.reference
                ),
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn notify(&self, event: &BillingEvent) -> Result<()>;
}

pub struct NotificationManager {
    notifiers: RwLock<Vec<Arc<dyn Notifier>>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self {
            notifiers: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, notifier: Arc<dyn Notifier>) {
        if notifier.is_enabled() {
            tracing::info!("Registered notifier: {}", notifier.name());
            self.notifiers.write().await.push(notifier);
        }
    }

    /// Delivers to every notifier; failures are logged and never stop the
    /// others.
    pub async fn notify(&self, event: BillingEvent) {
        let notifiers = self.notifiers.read().await;

        for notifier in notifiers.iter() {
            match notifier.notify(&event).await {
                Ok(_) => {
                    tracing::debug!("Notifier {} delivered {}", notifier.name(), event.name());
                }
                Err(e) => {
                    tracing::error!(
                        "Notifier {} failed to deliver {} for collaboration {}: {:?}",
                        notifier.name(),
                        event.name(),
                        event.collaboration().id,
                        e
                    );
                }
            }
        }
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::*;
    use chrono::{NaiveDate, Utc};

    fn collaboration() -> Collaboration {
        Collaboration {
            id: 7,
            payer: Payer::User(uuid::Uuid::new_v4()),
            amount: 1000,
            frequency: Frequency::Monthly,
            payment_type: PaymentType::CreditCard,
            bank_account: None,
            status: CollaborationStatus::Ok,
            status_reason: None,
            gateway_token: None,
            token_expiration: None,
            territorial_assignment: TerritorialAssignment::Country,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn order() -> Order {
        let date = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        Order {
            id: 3,
            collaboration_id: 7,
            user_id: None,
            period: BillingPeriod::of(date),
            payable_at: date,
            amount: 1000,
            periods_covered: 1,
            first: false,
            status: OrderStatus::Returned,
            payment_type: PaymentType::CreditCard,
            payment_identifier: None,
            gateway_order_id: None,
            reference: "Cuota mayo 2024".to_string(),
            territory: "Estatal".to_string(),
            payment_response: None,
            payed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn suspended(militant: bool) -> BillingEvent {
        BillingEvent::CollaborationSuspended {
            collaboration: collaboration(),
            recipient: Some("ana@example.org".to_string()),
            militant,
            was_first: false,
        }
    }

    fn returned(militant: bool) -> BillingEvent {
        BillingEvent::OrderReturned {
            collaboration: collaboration(),
            order: order(),
            recipient: Some("ana@example.org".to_string()),
            militant,
            was_first: false,
        }
    }

    #[test]
    fn test_message_wording() {
        let (subject, body) = suspended(true).message();
        assert_eq!(subject, "Your membership fee has been suspended");
        assert!(body.contains("collaboration 7"));
        assert!(body.contains("membership active"));

        let (subject, body) = suspended(false).message();
        assert_eq!(subject, "Your collaboration has been suspended");
        assert!(body.contains("collaboration 7"));
        assert!(!body.contains("membership"));

        let (subject, body) = returned(true).message();
        assert_eq!(subject, "Your membership fee was returned");
        assert!(body.contains("\"Cuota mayo 2024\""));
        assert!(body.contains("membership fee"));

        let (subject, body) = returned(false).message();
        assert_eq!(subject, "Your collaboration payment was returned");
        assert!(body.contains("\"Cuota mayo 2024\""));
        assert!(!body.contains("membership"));
    }

    #[test]
    fn test_event_accessors() {
        let event = returned(true);
        assert_eq!(event.name(), "order_returned");
        assert_eq!(event.collaboration().id, 7);
        assert_eq!(event.recipient(), Some("ana@example.org"));
        assert!(event.is_militant());
        assert!(!suspended(false).is_militant());
        assert_eq!(suspended(false).name(), "collaboration_suspended");
    }
}
