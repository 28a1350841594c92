use async_trait::async_trait;

use super::{BillingEvent, Notifier};
use crate::error::Result;

/// Writes every billing event to the log. Always on.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn notify(&self, event: &BillingEvent) -> Result<()> {
        let collaboration = event.collaboration();
        match event {
            BillingEvent::CollaborationSuspended { was_first, .. } => tracing::warn!(
                "Collaboration {} suspended (militant: {}, first order: {})",
                collaboration.id,
                event.is_militant(),
                was_first
            ),
            BillingEvent::OrderReturned { order, was_first, .. } => tracing::info!(
                "Order {} of collaboration {} returned: {} (first order: {})",
                order.id,
                collaboration.id,
                order.status_text(),
                was_first
            ),
        }
        Ok(())
    }
}
