use sqlx::Row;

use dealgate_core::domain::deal::DealId;
use dealgate_core::domain::webhook::{WebhookConfig, WebhookConfigId};

use super::deal::decode_timestamp;
use super::event::{event_type_as_str, parse_event_type};
use super::{RepositoryError, WebhookConfigRepository};
use crate::DbPool;

pub struct SqlWebhookConfigRepository {
    pool: DbPool,
}

impl SqlWebhookConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn events_as_csv(config: &WebhookConfig) -> String {
    config
        .events
        .iter()
        .map(|event| event_type_as_str(*event))
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_events_csv(raw: &str) -> Result<Vec<dealgate_core::ApprovalEventType>, RepositoryError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_event_type)
        .collect()
}

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<WebhookConfig, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deal_id: Option<String> =
        row.try_get("deal_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let url: String = row.try_get("url").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let events_str: String =
        row.try_get("events").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let secret: Option<String> =
        row.try_get("secret").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_active: i64 =
        row.try_get("is_active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(WebhookConfig {
        id: WebhookConfigId(id),
        deal_id: deal_id.map(DealId),
        url,
        events: parse_events_csv(&events_str)?,
        secret,
        active: is_active != 0,
        created_at: decode_timestamp(&created_at_str, "created_at")?,
        updated_at: decode_timestamp(&updated_at_str, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl WebhookConfigRepository for SqlWebhookConfigRepository {
    async fn insert(&self, config: WebhookConfig) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO webhook_config (id, deal_id, url, events, secret, is_active,
                                         created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&config.id.0)
        .bind(config.deal_id.as_ref().map(|id| id.0.clone()))
        .bind(&config.url)
        .bind(events_as_csv(&config))
        .bind(&config.secret)
        .bind(if config.active { 1_i64 } else { 0_i64 })
        .bind(config.created_at.to_rfc3339())
        .bind(config.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active_for_deal(
        &self,
        deal_id: &DealId,
    ) -> Result<Vec<WebhookConfig>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, deal_id, url, events, secret, is_active, created_at, updated_at
             FROM webhook_config
             WHERE is_active = 1 AND (deal_id = ? OR deal_id IS NULL)
             ORDER BY created_at ASC",
        )
        .bind(&deal_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_config).collect()
    }
}
