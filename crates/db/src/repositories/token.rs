use sqlx::Row;

use dealgate_core::domain::deal::DealId;
use dealgate_core::domain::token::{ApprovalToken, ApprovalTokenId};

use super::deal::decode_timestamp;
use super::{RepositoryError, TokenRepository};
use crate::DbPool;

pub struct SqlTokenRepository {
    pool: DbPool,
}

impl SqlTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalToken, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deal_id: String =
        row.try_get("deal_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let token_hash: String =
        row.try_get("token_hash").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at_str: String =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let used_at_str: Option<String> =
        row.try_get("used_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let used_at = match used_at_str {
        Some(raw) => Some(decode_timestamp(&raw, "used_at")?),
        None => None,
    };

    Ok(ApprovalToken {
        id: ApprovalTokenId(id),
        deal_id: DealId(deal_id),
        token_hash,
        expires_at: decode_timestamp(&expires_at_str, "expires_at")?,
        used_at,
        created_at: decode_timestamp(&created_at_str, "created_at")?,
    })
}

#[async_trait::async_trait]
impl TokenRepository for SqlTokenRepository {
    async fn insert(&self, token: ApprovalToken) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_token (id, deal_id, token_hash, expires_at, used_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&token.id.0)
        .bind(&token.deal_id.0)
        .bind(&token.token_hash)
        .bind(token.expires_at.to_rfc3339())
        .bind(token.used_at.map(|dt| dt.to_rfc3339()))
        .bind(token.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ApprovalToken>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, deal_id, token_hash, expires_at, used_at, created_at
             FROM approval_token WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_token(r)?)),
            None => Ok(None),
        }
    }
}
