use sqlx::Row;

use dealgate_core::domain::deal::DealId;
use dealgate_core::domain::event::{
    ApprovalEvent, ApprovalEventId, ApprovalEventType, EventMetadata,
};

use super::deal::decode_timestamp;
use super::{EventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEventRepository {
    pool: DbPool,
}

impl SqlEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub fn event_type_as_str(event_type: ApprovalEventType) -> &'static str {
    match event_type {
        ApprovalEventType::Sent => "sent",
        ApprovalEventType::Viewed => "viewed",
        ApprovalEventType::Approved => "approved",
        ApprovalEventType::Rejected => "rejected",
    }
}

pub fn parse_event_type(s: &str) -> Result<ApprovalEventType, RepositoryError> {
    match s {
        "sent" => Ok(ApprovalEventType::Sent),
        "viewed" => Ok(ApprovalEventType::Viewed),
        "approved" => Ok(ApprovalEventType::Approved),
        "rejected" => Ok(ApprovalEventType::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown event type `{other}`"))),
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalEvent, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deal_id: String =
        row.try_get("deal_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_type_str: String =
        row.try_get("event_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let ip: String = row.try_get("ip").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_agent: String =
        row.try_get("user_agent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalEvent {
        id: ApprovalEventId(id),
        deal_id: DealId(deal_id),
        event_type: parse_event_type(&event_type_str)?,
        metadata: EventMetadata::new(ip, user_agent),
        created_at: decode_timestamp(&created_at_str, "created_at")?,
    })
}

#[async_trait::async_trait]
impl EventRepository for SqlEventRepository {
    async fn append(&self, event: ApprovalEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_event (id, deal_id, event_type, ip, user_agent, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(&event.deal_id.0)
        .bind(event_type_as_str(event.event_type))
        .bind(&event.metadata.ip)
        .bind(&event.metadata.user_agent)
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<ApprovalEvent>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, deal_id, event_type, ip, user_agent, created_at
             FROM approval_event WHERE deal_id = ? ORDER BY created_at ASC",
        )
        .bind(&deal_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use dealgate_core::domain::event::{ApprovalEvent, ApprovalEventType, EventMetadata};

    use super::SqlEventRepository;
    use crate::repositories::deal::tests::sample_deal;
    use crate::repositories::{DealRepository, EventRepository, SqlDealRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn append_and_list_preserves_order_and_metadata() {
        let pool = setup().await;
        let deal = sample_deal("Acme");
        SqlDealRepository::new(pool.clone()).insert(deal.clone()).await.expect("parent deal");

        let repo = SqlEventRepository::new(pool);
        let base = Utc::now();
        let metadata = EventMetadata::new("203.0.113.7", "Mozilla/5.0");

        repo.append(ApprovalEvent::record(
            deal.id.clone(),
            ApprovalEventType::Sent,
            metadata.clone(),
            base,
        ))
        .await
        .expect("append sent");
        repo.append(ApprovalEvent::record(
            deal.id.clone(),
            ApprovalEventType::Viewed,
            metadata.clone(),
            base + Duration::seconds(5),
        ))
        .await
        .expect("append viewed");
        repo.append(ApprovalEvent::record(
            deal.id.clone(),
            ApprovalEventType::Approved,
            metadata,
            base + Duration::seconds(10),
        ))
        .await
        .expect("append approved");

        let trail = repo.list_for_deal(&deal.id).await.expect("list");
        let types: Vec<_> = trail.iter().map(|event| event.event_type).collect();
        assert_eq!(
            types,
            vec![ApprovalEventType::Sent, ApprovalEventType::Viewed, ApprovalEventType::Approved]
        );
        assert_eq!(trail[0].metadata.ip, "203.0.113.7");
        assert_eq!(trail[0].metadata.user_agent, "Mozilla/5.0");
    }

    #[tokio::test]
    async fn repeated_viewed_events_are_all_kept() {
        let pool = setup().await;
        let deal = sample_deal("Acme");
        SqlDealRepository::new(pool.clone()).insert(deal.clone()).await.expect("parent deal");

        let repo = SqlEventRepository::new(pool);
        let base = Utc::now();
        for offset in 0..3 {
            repo.append(ApprovalEvent::record(
                deal.id.clone(),
                ApprovalEventType::Viewed,
                EventMetadata::unknown(),
                base + Duration::seconds(offset),
            ))
            .await
            .expect("append viewed");
        }

        let trail = repo.list_for_deal(&deal.id).await.expect("list");
        assert_eq!(trail.len(), 3, "audit trail must not de-duplicate views");
    }
}
