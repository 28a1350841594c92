use std::sync::Arc;
use chrono::{DateTime, NaiveDate, Utc};
use crate::{
    config::BillingPolicy,
    domain::*,
    error::Result,
    repository::{OrderRepository, UserRepository},
};

/// Works out which periods of a collaboration are due and finds or creates
/// their orders. Creation goes through the (collaboration, period) unique
/// index, so repeated or concurrent runs converge on the same order.
pub struct Scheduler {
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
    policy: BillingPolicy,
}

impl Scheduler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        users: Arc<dyn UserRepository>,
        policy: BillingPolicy,
    ) -> Self {
        Self { orders, users, policy }
    }

    pub fn policy(&self) -> BillingPolicy {
        self.policy
    }

    /// Orders for every period between `from` and `to`, creating the missing
    /// ones for due periods when `create_if_missing` is set.
    pub async fn get_orders(
        &self,
        collaboration: &Collaboration,
        from: NaiveDate,
        to: NaiveDate,
        create_if_missing: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        if from > to {
            return Ok(orders);
        }

        let payment_day = self.policy.payment_day;
        let mut history = self.orders.list_for_collaboration(collaboration.id).await?;
        let mut catch_up = true;
        let mut period = BillingPeriod::of(from);
        let last = BillingPeriod::of(to);

        while period <= last {
            if let Some(order) = self.orders.find_live_for_period(collaboration.id, period).await? {
                orders.push(order);
            } else if create_if_missing
                && !collaboration.is_deleted()
                && collaboration.must_have_order(collaboration.due_date(period, payment_day), &history, payment_day)
            {
                let new_order = self.build_order(collaboration, period, &history, catch_up).await?;
                let order = self.orders.insert_if_absent(new_order, now).await?;
                tracing::debug!(
                    "Order {} for collaboration {} period {} (first: {})",
                    order.id,
                    collaboration.id,
                    period,
                    order.first
                );
                history.push(order.clone());
                orders.push(order);
            }

            catch_up = false;
            period = period.offset(1);
        }

        Ok(orders)
    }

    /// The order of the period containing `today`, created if due.
    pub async fn current_order(
        &self,
        collaboration: &Collaboration,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let mut orders = self.get_orders(collaboration, today, today, true, now).await?;
        Ok(orders.pop())
    }

    async fn build_order(
        &self,
        collaboration: &Collaboration,
        period: BillingPeriod,
        history: &[Order],
        catch_up: bool,
    ) -> Result<NewOrder> {
        let (militant, town_name) = match &collaboration.payer {
            Payer::User(id) => match self.users.find_by_id(*id).await? {
                Some(user) => (user.militant, Some(user.town_name)),
                None => (false, None),
            },
            Payer::Guest(guest) => (false, Some(guest.town_name.clone())),
        };

        let first = !collaboration.has_confirmed_payment()
            && !history
                .iter()
                .any(|o| o.deleted_at.is_none() && (o.is_payable() || o.is_paid()));

        let mut periods_covered = 1;
        let mut reference = collaboration.reference_for(period, militant);

        // A monthly collaboration whose previous order came back pays it
        // again together with the current one.
        if catch_up && !first && collaboration.frequency == Frequency::Monthly {
            if let Some(returned) = self
                .orders
                .find_returned_in_period(collaboration.id, period.offset(-1))
                .await?
            {
                periods_covered += returned.periods_covered;
                reference = format!("{}, {}", returned.reference.trim(), reference);
            }
        }

        Ok(NewOrder {
            collaboration_id: collaboration.id,
            user_id: collaboration.user_id(),
            period,
            payable_at: collaboration.due_date(period, self.policy.payment_day),
            amount: collaboration.amount * periods_covered as i64,
            periods_covered,
            first,
            payment_type: collaboration.payment_type,
            payment_identifier: collaboration.payment_identifier(),
            reference,
            territory: collaboration.territory_text(town_name.as_deref().filter(|t| !t.is_empty())),
        })
    }
}
