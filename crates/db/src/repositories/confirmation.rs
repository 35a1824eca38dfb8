use chrono::{DateTime, Utc};

use dealgate_core::domain::deal::{DealId, DealStatus};
use dealgate_core::domain::token::ApprovalTokenId;

use super::deal::deal_status_as_str;
use super::{ConfirmOutcome, ConfirmationRepository, RepositoryError};
use crate::DbPool;

/// The transactional heart of the confirm operation.
///
/// Marking the token used and moving the deal to its terminal status commit
/// together or not at all: a deal must never read APPROVED/REJECTED while its
/// token is unused, and a used token always has a matching status change.
pub struct SqlConfirmationRepository {
    pool: DbPool,
}

impl SqlConfirmationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConfirmationRepository for SqlConfirmationRepository {
    async fn consume_and_transition(
        &self,
        token_id: &ApprovalTokenId,
        deal_id: &DealId,
        status: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Single-use gate: the guarded update affects at most one row. The
        // loser of a concurrent race sees zero rows and writes nothing.
        let consumed = sqlx::query(
            "UPDATE approval_token SET used_at = ? WHERE id = ? AND used_at IS NULL",
        )
        .bind(now.to_rfc3339())
        .bind(&token_id.0)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ConfirmOutcome::AlreadyUsed);
        }

        sqlx::query("UPDATE deal SET status = ?, updated_at = ? WHERE id = ?")
            .bind(deal_status_as_str(status))
            .bind(now.to_rfc3339())
            .bind(&deal_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ConfirmOutcome::Applied)
    }
}
