pub mod billing_service;
pub mod collaboration_service;
pub mod order_service;
pub mod scheduler;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::config::{BillingPolicy, SepaConfig};
use crate::notifications::NotificationManager;
use crate::payments::{RedsysGateway, SepaBatch};
use crate::repository::*;
use billing_service::BillingService;
use collaboration_service::CollaborationService;
use order_service::OrderService;
use scheduler::Scheduler;

pub use billing_service::{ChargeOutcome, ChargeSummary};
pub use collaboration_service::CardToken;

pub struct ServiceContext {
    pub user_repo: Arc<dyn UserRepository>,
    pub collaboration_repo: Arc<dyn CollaborationRepository>,
    pub order_repo: Arc<dyn OrderRepository>,
    pub notification_manager: Arc<NotificationManager>,
    pub collaboration_service: Arc<CollaborationService>,
    pub order_service: Arc<OrderService>,
    pub scheduler: Arc<Scheduler>,
    pub billing_service: Arc<BillingService>,
    pub sepa_batch: Arc<SepaBatch>,
    pub policy: BillingPolicy,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        notification_manager: Arc<NotificationManager>,
        gateway: Arc<RedsysGateway>,
        sepa_config: SepaConfig,
        policy: BillingPolicy,
    ) -> Self {
        let user_repo: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db_pool.clone()));
        let collaboration_repo: Arc<dyn CollaborationRepository> =
            Arc::new(SqliteCollaborationRepository::new(db_pool.clone()));
        let order_repo: Arc<dyn OrderRepository> = Arc::new(SqliteOrderRepository::new(db_pool.clone()));

        let collaboration_service = Arc::new(CollaborationService::new(
            collaboration_repo.clone(),
            order_repo.clone(),
            user_repo.clone(),
            notification_manager.clone(),
            policy,
        ));
        let order_service = Arc::new(OrderService::new(order_repo.clone(), collaboration_service.clone()));
        let scheduler = Arc::new(Scheduler::new(order_repo.clone(), user_repo.clone(), policy));

        let billing_service = Arc::new(BillingService::new(
            collaboration_repo.clone(),
            order_repo.clone(),
            order_service.clone(),
            scheduler.clone(),
            gateway,
        ));
        let sepa_batch = Arc::new(SepaBatch::new(
            sepa_config,
            collaboration_repo.clone(),
            order_repo.clone(),
            user_repo.clone(),
            order_service.clone(),
        ));

        Self {
            user_repo,
            collaboration_repo,
            order_repo,
            notification_manager,
            collaboration_service,
            order_service,
            scheduler,
            billing_service,
            sepa_batch,
            policy,
            db_pool,
        }
    }
}
