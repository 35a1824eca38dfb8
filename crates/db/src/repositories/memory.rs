use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use dealgate_core::domain::deal::{Deal, DealId, DealStatus};
use dealgate_core::domain::event::ApprovalEvent;
use dealgate_core::domain::token::{ApprovalToken, ApprovalTokenId};
use dealgate_core::domain::webhook::WebhookConfig;

use super::{
    ConfirmOutcome, ConfirmationRepository, DealRepository, EventRepository, RepositoryError,
    TokenRepository, WebhookConfigRepository,
};

#[derive(Default)]
struct StoreInner {
    deals: HashMap<String, Deal>,
    tokens: HashMap<String, ApprovalToken>,
    events: Vec<ApprovalEvent>,
    webhooks: Vec<WebhookConfig>,
}

/// In-memory stand-in for the whole persistence contract.
///
/// A single lock guards all aggregates so `consume_and_transition` gets the
/// same atomicity the SQL implementation takes from its transaction.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    inner: Mutex<StoreInner>,
}

#[async_trait::async_trait]
impl DealRepository for InMemoryWorkflowStore {
    async fn insert(&self, deal: Deal) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner.deals.insert(deal.id.0.clone(), deal);
        Ok(())
    }

    async fn find_by_id(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.deals.get(&id.0).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Deal>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut deals: Vec<Deal> = inner.deals.values().cloned().collect();
        deals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deals)
    }
}

#[async_trait::async_trait]
impl TokenRepository for InMemoryWorkflowStore {
    async fn insert(&self, token: ApprovalToken) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner.tokens.insert(token.id.0.clone(), token);
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ApprovalToken>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.tokens.values().find(|token| token.token_hash == token_hash).cloned())
    }
}

#[async_trait::async_trait]
impl EventRepository for InMemoryWorkflowStore {
    async fn append(&self, event: ApprovalEvent) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner.events.push(event);
        Ok(())
    }

    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<ApprovalEvent>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.events.iter().filter(|event| &event.deal_id == deal_id).cloned().collect())
    }
}

#[async_trait::async_trait]
impl WebhookConfigRepository for InMemoryWorkflowStore {
    async fn insert(&self, config: WebhookConfig) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner.webhooks.push(config);
        Ok(())
    }

    async fn list_active_for_deal(
        &self,
        deal_id: &DealId,
    ) -> Result<Vec<WebhookConfig>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .webhooks
            .iter()
            .filter(|config| {
                config.active
                    && config.deal_id.as_ref().map(|scoped| scoped == deal_id).unwrap_or(true)
            })
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ConfirmationRepository for InMemoryWorkflowStore {
    async fn consume_and_transition(
        &self,
        token_id: &ApprovalTokenId,
        deal_id: &DealId,
        status: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, RepositoryError> {
        let mut inner = self.inner.lock().await;

        match inner.tokens.get_mut(&token_id.0) {
            Some(token) if token.used_at.is_none() => token.used_at = Some(now),
            _ => return Ok(ConfirmOutcome::AlreadyUsed),
        }

        if let Some(deal) = inner.deals.get_mut(&deal_id.0) {
            deal.status = status;
            deal.updated_at = now;
        }

        Ok(ConfirmOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use dealgate_core::domain::deal::{Deal, DealLine, DealStatus};
    use dealgate_core::domain::token::ApprovalToken;
    use dealgate_core::token;

    use super::InMemoryWorkflowStore;
    use crate::repositories::{
        ConfirmOutcome, ConfirmationRepository, DealRepository, TokenRepository,
    };

    fn sample_deal() -> Deal {
        Deal::try_new(
            "Acme GmbH",
            None,
            "EUR",
            1000,
            vec![DealLine {
                description: "Consulting".to_string(),
                quantity: Decimal::from(2),
                unit_price: 500,
            }],
            Utc::now(),
        )
        .expect("valid deal")
    }

    #[tokio::test]
    async fn deal_round_trip() {
        let store = InMemoryWorkflowStore::default();
        let deal = sample_deal();

        DealRepository::insert(&store, deal.clone()).await.expect("insert");
        let found = store.find_by_id(&deal.id).await.expect("find");
        assert_eq!(found, Some(deal));
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let store = InMemoryWorkflowStore::default();
        let deal = sample_deal();
        DealRepository::insert(&store, deal.clone()).await.expect("insert deal");

        let issued =
            ApprovalToken::issue(deal.id.clone(), token::hash(&token::generate()), Utc::now());
        TokenRepository::insert(&store, issued.clone()).await.expect("insert token");

        let first = store
            .consume_and_transition(&issued.id, &deal.id, DealStatus::Approved, Utc::now())
            .await
            .expect("first");
        let second = store
            .consume_and_transition(&issued.id, &deal.id, DealStatus::Rejected, Utc::now())
            .await
            .expect("second");

        assert_eq!(first, ConfirmOutcome::Applied);
        assert_eq!(second, ConfirmOutcome::AlreadyUsed);

        let stored = store.find_by_id(&deal.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, DealStatus::Approved);
    }
}
