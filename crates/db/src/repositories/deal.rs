use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use dealgate_core::domain::deal::{Deal, DealId, DealLine, DealStatus};

use super::{DealRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDealRepository {
    pool: DbPool,
}

impl SqlDealRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub fn deal_status_as_str(status: DealStatus) -> &'static str {
    match status {
        DealStatus::Draft => "draft",
        DealStatus::Sent => "sent",
        DealStatus::Approved => "approved",
        DealStatus::Rejected => "rejected",
        DealStatus::Expired => "expired",
    }
}

pub fn parse_deal_status(s: &str) -> DealStatus {
    match s {
        "sent" => DealStatus::Sent,
        "approved" => DealStatus::Approved,
        "rejected" => DealStatus::Rejected,
        "expired" => DealStatus::Expired,
        _ => DealStatus::Draft,
    }
}

pub(crate) fn decode_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_deal(
    row: &sqlx::sqlite::SqliteRow,
    lines: Vec<DealLine>,
) -> Result<Deal, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let client_name: String =
        row.try_get("client_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let client_email: Option<String> =
        row.try_get("client_email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total: i64 = row.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Deal {
        id: DealId(id),
        client_name,
        client_email,
        currency,
        total,
        lines,
        status: parse_deal_status(&status_str),
        created_at: decode_timestamp(&created_at_str, "created_at")?,
        updated_at: decode_timestamp(&updated_at_str, "updated_at")?,
    })
}

fn row_to_line(row: &sqlx::sqlite::SqliteRow) -> Result<DealLine, RepositoryError> {
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quantity_str: String =
        row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_price: i64 =
        row.try_get("unit_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let quantity = Decimal::from_str(&quantity_str)
        .map_err(|e| RepositoryError::Decode(format!("quantity: {e}")))?;

    Ok(DealLine { description, quantity, unit_price })
}

impl SqlDealRepository {
    async fn lines_for_deal(&self, deal_id: &str) -> Result<Vec<DealLine>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT description, quantity, unit_price
             FROM deal_line WHERE deal_id = ? ORDER BY position ASC",
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_line).collect()
    }
}

#[async_trait::async_trait]
impl DealRepository for SqlDealRepository {
    async fn insert(&self, deal: Deal) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO deal (id, client_name, client_email, currency, total, status,
                               created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&deal.id.0)
        .bind(&deal.client_name)
        .bind(&deal.client_email)
        .bind(&deal.currency)
        .bind(deal.total)
        .bind(deal_status_as_str(deal.status))
        .bind(deal.created_at.to_rfc3339())
        .bind(deal.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, line) in deal.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO deal_line (id, deal_id, position, description, quantity, unit_price)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(sqlx::types::Uuid::new_v4().simple().to_string())
            .bind(&deal.id.0)
            .bind(position as i64)
            .bind(&line.description)
            .bind(line.quantity.to_string())
            .bind(line.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, client_name, client_email, currency, total, status,
                    created_at, updated_at
             FROM deal WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => {
                let lines = self.lines_for_deal(&id.0).await?;
                Ok(Some(row_to_deal(r, lines)?))
            }
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Deal>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, client_name, client_email, currency, total, status,
                    created_at, updated_at
             FROM deal ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut deals = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String =
                row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let lines = self.lines_for_deal(&id).await?;
            deals.push(row_to_deal(row, lines)?);
        }

        Ok(deals)
    }
}
