use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreateUserRequest, DocumentType, User},
    error::{AppError, Result},
    repository::UserRepository,
};

#[derive(FromRow)]
struct UserRow {
    id: String,
    full_name: String,
    email: String,
    document_vatid: String,
    document_type: String,
    born_at: Option<NaiveDate>,
    address: String,
    town_name: String,
    postal_code: String,
    country: String,
    militant: i32,
    deleted_at: Option<NaiveDateTime>,
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: UserRow) -> Result<User> {
        Ok(User {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            full_name: row.full_name,
            email: row.email,
            document_vatid: row.document_vatid,
            document_type: DocumentType::from_str(&row.document_type)
                .ok_or_else(|| AppError::Database(format!("Invalid document type: {}", row.document_type)))?,
            born_at: row.born_at,
            address: row.address,
            town_name: row.town_name,
            postal_code: row.postal_code,
            country: row.country,
            militant: row.militant != 0,
            deleted_at: row.deleted_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: CreateUserRequest) -> Result<User> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO users (
                id, full_name, email, document_vatid, document_type,
                born_at, town_name, militant, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.document_vatid)
        .bind(user.document_type.as_str())
        .bind(user.born_at)
        .bind(&user.town_name)
        .bind(user.militant as i32)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created user".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, full_name, email, document_vatid, document_type,
                   born_at, address, town_name, postal_code, country,
                   militant, deleted_at
            FROM users
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_user).transpose()
    }
}
