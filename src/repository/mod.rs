use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::Result;

pub mod collaboration_repository;
pub mod order_repository;
pub mod user_repository;

pub use collaboration_repository::SqliteCollaborationRepository;
pub use order_repository::SqliteOrderRepository;
pub use user_repository::SqliteUserRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: CreateUserRequest) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
}

#[async_trait]
pub trait CollaborationRepository: Send + Sync {
    /// Stores a validated pledge as an `incomplete` collaboration.
    async fn create(&self, pledge: &Pledge, now: DateTime<Utc>) -> Result<Collaboration>;
    /// Includes soft-deleted collaborations.
    async fn find_by_id(&self, id: i64) -> Result<Option<Collaboration>>;
    async fn find_live_recurring_for(&self, payer: &Payer) -> Result<Option<Collaboration>>;
    async fn list_payable(&self) -> Result<Vec<Collaboration>>;
    /// Moves the collaboration along the status table. Writing the current
    /// status is a no-op; a concurrent change yields `Conflict`.
    async fn transition(
        &self,
        id: i64,
        to: CollaborationStatus,
        reason: Option<&str>,
    ) -> Result<Collaboration>;
    async fn store_token(&self, id: i64, token: &str, expiration: Option<NaiveDate>) -> Result<()>;
    async fn soft_delete(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Optional columns written together with an order status change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderUpdate {
    pub payed_at: Option<DateTime<Utc>>,
    pub payment_response: Option<String>,
    pub payment_identifier: Option<String>,
    /// Forgets a previous settlement, for money the bank took back.
    pub clear_payed_at: bool,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts the order unless a live one already exists for its
    /// collaboration and period, and returns whichever is stored.
    async fn insert_if_absent(&self, order: NewOrder, now: DateTime<Utc>) -> Result<Order>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Order>>;
    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>>;
    /// The non-error order of a period, if any.
    async fn find_live_for_period(&self, collaboration_id: i64, period: BillingPeriod) -> Result<Option<Order>>;
    /// Oldest first.
    async fn list_for_collaboration(&self, collaboration_id: i64) -> Result<Vec<Order>>;
    async fn find_returned_in_period(&self, collaboration_id: i64, period: BillingPeriod) -> Result<Option<Order>>;
    /// Compare-and-set status change. `Conflict` when the order is no longer
    /// in `from`.
    async fn transition(&self, id: i64, from: OrderStatus, to: OrderStatus, update: OrderUpdate) -> Result<Order>;
    async fn set_gateway_order_id(&self, id: i64, gateway_order_id: &str) -> Result<Order>;
    async fn list_bank_orders(&self, period: BillingPeriod, status: OrderStatus) -> Result<Vec<Order>>;
    /// new -> charging for every bank order of the period.
    async fn mark_bank_orders_as_charging(&self, period: BillingPeriod, now: DateTime<Utc>) -> Result<u64>;
    /// charging -> paid for every bank order of the period, confirming
    /// their unconfirmed collaborations in the same transaction.
    async fn mark_bank_orders_as_paid(&self, period: BillingPeriod, paid_at: DateTime<Utc>) -> Result<u64>;
}
