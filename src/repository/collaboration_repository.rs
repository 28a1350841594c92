use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        BankAccount, CccAccount, Collaboration, CollaborationStatus, Frequency, GuestPayer, Payer,
        PaymentType, Pledge, TerritorialAssignment,
    },
    error::{AppError, Result},
    repository::CollaborationRepository,
};

const COLLABORATION_COLUMNS: &str = r#"
    id, user_id, non_user_data, amount, frequency, payment_type,
    ccc_entity, ccc_office, ccc_dc, ccc_account, iban_account, iban_bic,
    status, status_reason, gateway_token, token_expiration,
    territorial_assignment, created_at, updated_at, deleted_at
"#;

#[derive(FromRow)]
struct CollaborationRow {
    id: i64,
    user_id: Option<String>,
    non_user_data: Option<String>,
    amount: i64,
    frequency: i64,
    payment_type: i64,
    ccc_entity: Option<i64>,
    ccc_office: Option<i64>,
    ccc_dc: Option<i64>,
    ccc_account: Option<i64>,
    iban_account: Option<String>,
    iban_bic: Option<String>,
    status: i64,
    status_reason: Option<String>,
    gateway_token: Option<String>,
    token_expiration: Option<NaiveDate>,
    territorial_assignment: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    deleted_at: Option<NaiveDateTime>,
}

pub struct SqliteCollaborationRepository {
    pool: SqlitePool,
}

impl SqliteCollaborationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_collaboration(row: CollaborationRow) -> Result<Collaboration> {
        let payer = match (row.user_id, row.non_user_data) {
            (Some(user_id), None) => {
                Payer::User(Uuid::parse_str(&user_id).map_err(|e| AppError::Database(e.to_string()))?)
            }
            (None, Some(data)) => Payer::Guest(
                serde_json::from_str::<GuestPayer>(&data).map_err(|e| AppError::Database(e.to_string()))?,
            ),
            _ => {
                return Err(AppError::Database(format!(
                    "Collaboration {} must have exactly one payer",
                    row.id
                )))
            }
        };

        let payment_type = PaymentType::from_code(row.payment_type)
            .ok_or_else(|| AppError::Database(format!("Invalid payment type: {}", row.payment_type)))?;

        let bank_account = match (row.ccc_entity, row.ccc_office, row.ccc_dc, row.ccc_account) {
            (Some(entity), Some(office), Some(dc), Some(account)) => Some(BankAccount::Ccc(CccAccount {
                entity: entity as u16,
                office: office as u16,
                dc: dc as u8,
                account: account as u64,
            })),
            _ => row.iban_account.map(|iban| BankAccount::Iban { iban, bic: row.iban_bic }),
        };

        Ok(Collaboration {
            id: row.id,
            payer,
            amount: row.amount,
            frequency: Frequency::from_months(row.frequency)
                .ok_or_else(|| AppError::Database(format!("Invalid frequency: {}", row.frequency)))?,
            payment_type,
            bank_account,
            status: Self::parse_status(row.status)?,
            status_reason: row.status_reason,
            gateway_token: row.gateway_token,
            token_expiration: row.token_expiration,
            territorial_assignment: TerritorialAssignment::from_str(&row.territorial_assignment)
                .unwrap_or_default(),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
            deleted_at: row.deleted_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }

    fn parse_status(code: i64) -> Result<CollaborationStatus> {
        CollaborationStatus::from_code(code)
            .ok_or_else(|| AppError::Database(format!("Invalid collaboration status: {}", code)))
    }

    async fn fetch_where(&self, clause: &str, bind: Option<String>) -> Result<Vec<Collaboration>> {
        let sql = format!("SELECT {} FROM collaborations WHERE {} ORDER BY id", COLLABORATION_COLUMNS, clause);
        let mut query = sqlx::query_as::<_, CollaborationRow>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_collaboration).collect()
    }
}

#[async_trait]
impl CollaborationRepository for SqliteCollaborationRepository {
    async fn create(&self, pledge: &Pledge, now: DateTime<Utc>) -> Result<Collaboration> {
        let (user_id, non_user_data, non_user_email, non_user_document) = match &pledge.payer {
            Payer::User(id) => (Some(id.to_string()), None, None, None),
            Payer::Guest(guest) => (
                None,
                Some(serde_json::to_string(guest).map_err(|e| AppError::Internal(e.to_string()))?),
                Some(guest.email.trim().to_lowercase()),
                Some(guest.document_vatid.trim().to_uppercase()),
            ),
        };

        let (ccc, iban, bic) = match pledge.bank_account() {
            Some(BankAccount::Ccc(ccc)) => (Some(ccc), None, None),
            Some(BankAccount::Iban { iban, bic }) => (None, Some(iban), bic),
            None => (None, None, None),
        };

        let now_naive = now.naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO collaborations (
                user_id, non_user_data, non_user_email, non_user_document_vatid,
                amount, frequency, payment_type,
                ccc_entity, ccc_office, ccc_dc, ccc_account, iban_account, iban_bic,
                status, territorial_assignment, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(user_id)
        .bind(non_user_data)
        .bind(non_user_email)
        .bind(non_user_document)
        .bind(pledge.amount)
        .bind(pledge.frequency.months() as i64)
        .bind(pledge.payment_type.code())
        .bind(ccc.map(|c| c.entity as i64))
        .bind(ccc.map(|c| c.office as i64))
        .bind(ccc.map(|c| c.dc as i64))
        .bind(ccc.map(|c| c.account as i64))
        .bind(iban)
        .bind(bic)
        .bind(CollaborationStatus::Incomplete.code())
        .bind(pledge.territorial_assignment.as_str())
        .bind(now_naive)
        .bind(now_naive)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created collaboration".to_string())
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Collaboration>> {
        let sql = format!("SELECT {} FROM collaborations WHERE id = ?", COLLABORATION_COLUMNS);
        let row = sqlx::query_as::<_, CollaborationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_collaboration).transpose()
    }

    async fn find_live_recurring_for(&self, payer: &Payer) -> Result<Option<Collaboration>> {
        let live = "deleted_at IS NULL AND frequency <> 0";
        let found = match payer {
            Payer::User(id) => {
                self.fetch_where(&format!("user_id = ? AND {}", live), Some(id.to_string()))
                    .await?
            }
            Payer::Guest(guest) => {
                let mut by_email = self
                    .fetch_where(
                        &format!("non_user_email = ? COLLATE NOCASE AND {}", live),
                        Some(guest.email.trim().to_string()),
                    )
                    .await?;
                if by_email.is_empty() {
                    by_email = self
                        .fetch_where(
                            &format!("non_user_document_vatid = ? COLLATE NOCASE AND {}", live),
                            Some(guest.document_vatid.trim().to_string()),
                        )
                        .await?;
                }
                by_email
            }
        };

        Ok(found.into_iter().next())
    }

    async fn list_payable(&self) -> Result<Vec<Collaboration>> {
        self.fetch_where("deleted_at IS NULL AND status IN (2, 3)", None).await
    }

    async fn transition(
        &self,
        id: i64,
        to: CollaborationStatus,
        reason: Option<&str>,
    ) -> Result<Collaboration> {
        let current = self.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Collaboration not found".to_string()))?;

        if current.status == to {
            return Ok(current);
        }
        if !current.status.can_transition_to(to) {
            return Err(AppError::transition("collaboration", current.status, to));
        }

        let result = sqlx::query(
            r#"
            UPDATE collaborations
            SET status = ?,
                status_reason = COALESCE(?, status_reason),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#
        )
        .bind(to.code())
        .bind(reason)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .bind(current.status.code())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Collaboration {} changed status concurrently",
                id
            )));
        }

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated collaboration".to_string())
        })
    }

    async fn store_token(&self, id: i64, token: &str, expiration: Option<NaiveDate>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE collaborations
            SET gateway_token = ?, token_expiration = ?, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(token)
        .bind(expiration)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn soft_delete(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE collaborations SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL"
        )
        .bind(at.naive_utc())
        .bind(at.naive_utc())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Collaboration not found".to_string()));
        }

        Ok(())
    }
}
