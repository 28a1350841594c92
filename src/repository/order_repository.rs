use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{BillingPeriod, CollaborationStatus, NewOrder, Order, OrderStatus, PaymentType},
    error::{AppError, Result},
    repository::{OrderRepository, OrderUpdate},
};

const ORDER_COLUMNS: &str = r#"
    id, collaboration_id, user_id, period, payable_at, amount, periods_covered,
    first, status, payment_type, payment_identifier, gateway_order_id,
    reference, territory, payment_response, payed_at,
    created_at, updated_at, deleted_at
"#;

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    collaboration_id: i64,
    user_id: Option<String>,
    period: i64,
    payable_at: NaiveDate,
    amount: i64,
    periods_covered: i64,
    first: i32,
    status: i64,
    payment_type: i64,
    payment_identifier: Option<String>,
    gateway_order_id: Option<String>,
    reference: String,
    territory: String,
    payment_response: Option<String>,
    payed_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    deleted_at: Option<NaiveDateTime>,
}

pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: OrderRow) -> Result<Order> {
        Ok(Order {
            id: row.id,
            collaboration_id: row.collaboration_id,
            user_id: row
                .user_id
                .map(|id| Uuid::parse_str(&id))
                .transpose()
                .map_err(|e| AppError::Database(e.to_string()))?,
            period: BillingPeriod::from_index(row.period as i32),
            payable_at: row.payable_at,
            amount: row.amount,
            periods_covered: row.periods_covered as i32,
            first: row.first != 0,
            status: Self::parse_status(row.status)?,
            payment_type: PaymentType::from_code(row.payment_type)
                .ok_or_else(|| AppError::Database(format!("Invalid payment type: {}", row.payment_type)))?,
            payment_identifier: row.payment_identifier,
            gateway_order_id: row.gateway_order_id,
            reference: row.reference,
            territory: row.territory,
            payment_response: row.payment_response,
            payed_at: row.payed_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
            deleted_at: row.deleted_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }

    fn parse_status(code: i64) -> Result<OrderStatus> {
        OrderStatus::from_code(code)
            .ok_or_else(|| AppError::Database(format!("Invalid order status: {}", code)))
    }

    async fn fetch_one_where(&self, clause: &str, a: i64, b: Option<i64>) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE {} ORDER BY id LIMIT 1", ORDER_COLUMNS, clause);
        let mut query = sqlx::query_as::<_, OrderRow>(&sql).bind(a);
        if let Some(b) = b {
            query = query.bind(b);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_order).transpose()
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn insert_if_absent(&self, order: NewOrder, now: DateTime<Utc>) -> Result<Order> {
        let now_naive = now.naive_utc();

        // The partial unique index on (collaboration_id, period) turns a
        // duplicate into a silent no-op.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO orders (
                collaboration_id, user_id, period, payable_at, amount, periods_covered,
                first, status, payment_type, payment_identifier, reference, territory,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(order.collaboration_id)
        .bind(order.user_id.map(|id| id.to_string()))
        .bind(order.period.index() as i64)
        .bind(order.payable_at)
        .bind(order.amount)
        .bind(order.periods_covered as i64)
        .bind(order.first as i32)
        .bind(OrderStatus::New.code())
        .bind(order.payment_type.code())
        .bind(&order.payment_identifier)
        .bind(&order.reference)
        .bind(&order.territory)
        .bind(now_naive)
        .bind(now_naive)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                "Order for collaboration {} period {} already exists",
                order.collaboration_id,
                order.period
            );
        }

        self.find_live_for_period(order.collaboration_id, order.period)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created order".to_string()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Order>> {
        self.fetch_one_where("id = ?", id, None).await
    }

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE gateway_order_id = ?", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(gateway_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_live_for_period(&self, collaboration_id: i64, period: BillingPeriod) -> Result<Option<Order>> {
        self.fetch_one_where(
            "collaboration_id = ? AND period = ? AND status <> 4 AND deleted_at IS NULL",
            collaboration_id,
            Some(period.index() as i64),
        )
        .await
    }

    async fn list_for_collaboration(&self, collaboration_id: i64) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE collaboration_id = ? AND deleted_at IS NULL ORDER BY period, id",
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(collaboration_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn find_returned_in_period(&self, collaboration_id: i64, period: BillingPeriod) -> Result<Option<Order>> {
        self.fetch_one_where(
            "collaboration_id = ? AND period = ? AND status = 5 AND deleted_at IS NULL",
            collaboration_id,
            Some(period.index() as i64),
        )
        .await
    }

    async fn transition(&self, id: i64, from: OrderStatus, to: OrderStatus, update: OrderUpdate) -> Result<Order> {
        if !from.can_transition_to(to) {
            return Err(AppError::transition("order", from, to));
        }

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?,
                payed_at = CASE WHEN ? THEN NULL ELSE COALESCE(?, payed_at) END,
                payment_response = COALESCE(?, payment_response),
                payment_identifier = COALESCE(?, payment_identifier),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#
        )
        .bind(to.code())
        .bind(update.clear_payed_at)
        .bind(update.payed_at.map(|dt| dt.naive_utc()))
        .bind(&update.payment_response)
        .bind(&update.payment_identifier)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .bind(from.code())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(id).await? {
                Some(current) => Err(AppError::Conflict(format!(
                    "Order {} is {:?}, expected {:?}",
                    id, current.status, from
                ))),
                None => Err(AppError::NotFound("Order not found".to_string())),
            };
        }

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated order".to_string())
        })
    }

    async fn set_gateway_order_id(&self, id: i64, gateway_order_id: &str) -> Result<Order> {
        sqlx::query("UPDATE orders SET gateway_order_id = ?, updated_at = ? WHERE id = ?")
            .bind(gateway_order_id)
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }

    async fn list_bank_orders(&self, period: BillingPeriod, status: OrderStatus) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {} FROM orders
            WHERE period = ? AND status = ? AND payment_type <> 1 AND deleted_at IS NULL
            ORDER BY id
            "#,
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(period.index() as i64)
            .bind(status.code())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn mark_bank_orders_as_charging(&self, period: BillingPeriod, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, updated_at = ?
            WHERE period = ? AND status = ? AND payment_type <> 1 AND deleted_at IS NULL
            "#
        )
        .bind(OrderStatus::Charging.code())
        .bind(now.naive_utc())
        .bind(period.index() as i64)
        .bind(OrderStatus::New.code())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn mark_bank_orders_as_paid(&self, period: BillingPeriod, paid_at: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            UPDATE collaborations
            SET status = ?, updated_at = ?
            WHERE status = ? AND deleted_at IS NULL AND id IN (
                SELECT collaboration_id FROM orders
                WHERE period = ? AND status = ? AND payment_type <> 1 AND deleted_at IS NULL
            )
            "#
        )
        .bind(CollaborationStatus::Ok.code())
        .bind(now)
        .bind(CollaborationStatus::Unconfirmed.code())
        .bind(period.index() as i64)
        .bind(OrderStatus::Charging.code())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, payed_at = ?, updated_at = ?
            WHERE period = ? AND status = ? AND payment_type <> 1 AND deleted_at IS NULL
            "#
        )
        .bind(OrderStatus::Paid.code())
        .bind(paid_at.naive_utc())
        .bind(now)
        .bind(period.index() as i64)
        .bind(OrderStatus::Charging.code())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }
}
