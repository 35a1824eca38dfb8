//! The deal approval state machine and its side-effect fan-out.
//!
//! `DealWorkflow` owns the whole lifecycle: creation with token issuance,
//! token-gated viewing, and the single terminal confirm transition. State
//! writes go through injected repositories; notifications and webhooks run as
//! ordered post-commit hooks whose failures are logged, never propagated, and
//! never rolled back into the committed transition.

use std::sync::Arc;

use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{info, warn};

use dealgate_core::config::AppConfig;
use dealgate_core::domain::deal::{format_amount, Deal, DealId, DealLine, DealStatus};
use dealgate_core::domain::event::{ApprovalEvent, ApprovalEventType, EventMetadata};
use dealgate_core::domain::token::ApprovalToken;
use dealgate_core::domain::webhook::{WebhookConfig, WebhookPayload};
use dealgate_core::{expiry, token, WorkflowError};
use dealgate_db::repositories::{
    ConfirmOutcome, ConfirmationRepository, DealRepository, EventRepository,
    InMemoryWorkflowStore, SqlConfirmationRepository, SqlDealRepository, SqlEventRepository,
    SqlTokenRepository, SqlWebhookConfigRepository, TokenRepository, WebhookConfigRepository,
};
use dealgate_db::DbPool;

use crate::email::EmailNotifier;
use crate::webhook::WebhookDispatcher;

/// Owner-supplied input for deal creation.
#[derive(Clone, Debug)]
pub struct DealDraft {
    pub client_name: String,
    pub client_email: Option<String>,
    pub currency: String,
    pub total: i64,
    pub items: Vec<DealLine>,
    pub webhook_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CreatedDeal {
    pub deal_id: DealId,
    pub approval_link: String,
    /// The raw secret. This response is the only place it ever appears.
    pub token: String,
}

/// Approver-facing projection of a deal. Deliberately excludes status, owner
/// fields and anything token-related.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealView {
    pub id: DealId,
    pub client_name: String,
    pub currency: String,
    pub total: i64,
    pub items: Vec<DealLine>,
    pub created_at: chrono::DateTime<Utc>,
}

/// Persistence collaborators of the workflow, injected at bootstrap.
pub struct WorkflowRepositories {
    pub deals: Arc<dyn DealRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub events: Arc<dyn EventRepository>,
    pub webhooks: Arc<dyn WebhookConfigRepository>,
    pub confirmations: Arc<dyn ConfirmationRepository>,
}

impl WorkflowRepositories {
    pub fn sql(pool: &DbPool) -> Self {
        Self {
            deals: Arc::new(SqlDealRepository::new(pool.clone())),
            tokens: Arc::new(SqlTokenRepository::new(pool.clone())),
            events: Arc::new(SqlEventRepository::new(pool.clone())),
            webhooks: Arc::new(SqlWebhookConfigRepository::new(pool.clone())),
            confirmations: Arc::new(SqlConfirmationRepository::new(pool.clone())),
        }
    }

    pub fn in_memory(store: Arc<InMemoryWorkflowStore>) -> Self {
        Self {
            deals: store.clone(),
            tokens: store.clone(),
            events: store.clone(),
            webhooks: store.clone(),
            confirmations: store,
        }
    }
}

pub struct DealWorkflow {
    deals: Arc<dyn DealRepository>,
    tokens: Arc<dyn TokenRepository>,
    events: Arc<dyn EventRepository>,
    webhooks: Arc<dyn WebhookConfigRepository>,
    confirmations: Arc<dyn ConfirmationRepository>,
    notifier: EmailNotifier,
    dispatcher: WebhookDispatcher,
    frontend_base_url: String,
    owner_email: String,
    signing_secret: Option<String>,
}

impl DealWorkflow {
    pub fn new(
        repositories: WorkflowRepositories,
        notifier: EmailNotifier,
        dispatcher: WebhookDispatcher,
        config: &AppConfig,
    ) -> Self {
        Self {
            deals: repositories.deals,
            tokens: repositories.tokens,
            events: repositories.events,
            webhooks: repositories.webhooks,
            confirmations: repositories.confirmations,
            notifier,
            dispatcher,
            frontend_base_url: config.approval.frontend_base_url.trim_end_matches('/').to_string(),
            owner_email: config.approval.owner_email.clone(),
            signing_secret: config
                .webhook
                .signing_secret
                .as_ref()
                .map(|secret| secret.expose_secret().to_string()),
        }
    }

    /// Create a deal snapshot, issue its single approval token and fan out
    /// the SENT side effects.
    pub async fn create_deal(
        &self,
        draft: DealDraft,
        metadata: EventMetadata,
    ) -> Result<CreatedDeal, WorkflowError> {
        let DealDraft { client_name, client_email, currency, total, items, webhook_url } = draft;

        if let Some(url) = &webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(WorkflowError::Validation(format!(
                    "webhook url `{url}` must start with http:// or https://"
                )));
            }
        }

        let now = Utc::now();
        let deal = Deal::try_new(client_name, client_email, currency, total, items, now)?;
        self.deals.insert(deal.clone()).await.map_err(WorkflowError::storage)?;

        let secret = token::generate();
        let issued = ApprovalToken::issue(deal.id.clone(), token::hash(&secret), now);
        self.tokens.insert(issued).await.map_err(WorkflowError::storage)?;

        self.events
            .append(ApprovalEvent::record(deal.id.clone(), ApprovalEventType::Sent, metadata, now))
            .await
            .map_err(WorkflowError::storage)?;

        if let Some(url) = webhook_url {
            let config =
                WebhookConfig::for_deal(deal.id.clone(), url, self.signing_secret.clone(), now);
            self.webhooks.insert(config).await.map_err(WorkflowError::storage)?;
        }

        let approval_link = format!("{}/approve/{secret}", self.frontend_base_url);

        // Post-commit hooks, ordered, each independent of the others.
        if let Some(email) = &deal.client_email {
            let amount = format_amount(&deal.currency, deal.total);
            let sent = self
                .notifier
                .send_approval_link(email, &deal.client_name, &approval_link, &amount)
                .await;
            if !sent {
                warn!(
                    event_name = "deal.notification_undelivered",
                    deal_id = %deal.id.0,
                    "approval link email was not delivered"
                );
            }
        }
        self.dispatch_webhooks(&deal, ApprovalEventType::Sent).await;

        info!(
            event_name = "deal.created",
            deal_id = %deal.id.0,
            total = deal.total,
            currency = %deal.currency,
            "deal snapshot created and sent for approval"
        );

        Ok(CreatedDeal { deal_id: deal.id.clone(), approval_link, token: secret })
    }

    /// Token-gated read for the approver. Appends a VIEWED audit event on
    /// every call; repeated views are not de-duplicated.
    pub async fn view_deal(
        &self,
        raw_token: &str,
        metadata: EventMetadata,
    ) -> Result<DealView, WorkflowError> {
        let now = Utc::now();
        let (_stored, deal) = self.resolve_consumable_token(raw_token, now).await?;

        self.events
            .append(ApprovalEvent::record(
                deal.id.clone(),
                ApprovalEventType::Viewed,
                metadata,
                now,
            ))
            .await
            .map_err(WorkflowError::storage)?;

        Ok(DealView {
            id: deal.id,
            client_name: deal.client_name,
            currency: deal.currency,
            total: deal.total,
            items: deal.lines,
            created_at: deal.created_at,
        })
    }

    /// Consume the token and apply the terminal transition.
    ///
    /// The used-mark and the status change are one transaction inside the
    /// confirmation repository; the token CAS makes the whole operation
    /// single-shot under concurrency.
    pub async fn confirm_deal(
        &self,
        raw_token: &str,
        approved: bool,
        metadata: EventMetadata,
    ) -> Result<DealStatus, WorkflowError> {
        let now = Utc::now();
        let (stored, deal) = self.resolve_consumable_token(raw_token, now).await?;

        let next = if approved { DealStatus::Approved } else { DealStatus::Rejected };

        let outcome = self
            .confirmations
            .consume_and_transition(&stored.id, &deal.id, next, now)
            .await
            .map_err(WorkflowError::storage)?;
        if outcome == ConfirmOutcome::AlreadyUsed {
            return Err(WorkflowError::AlreadyUsed);
        }

        // Mirror the committed write on the local copy for the hooks below.
        let mut deal = deal;
        deal.transition_to(next).map_err(|_| WorkflowError::AlreadyUsed)?;
        deal.updated_at = now;

        let event_type =
            if approved { ApprovalEventType::Approved } else { ApprovalEventType::Rejected };
        self.events
            .append(ApprovalEvent::record(deal.id.clone(), event_type, metadata, now))
            .await
            .map_err(WorkflowError::storage)?;

        // Post-commit hooks; the transition above is final regardless of what
        // happens here.
        let amount = format_amount(&deal.currency, deal.total);
        let sent = self
            .notifier
            .send_decision(&self.owner_email, &deal.client_name, &amount, now, approved)
            .await;
        if !sent {
            warn!(
                event_name = "deal.notification_undelivered",
                deal_id = %deal.id.0,
                "decision email was not delivered"
            );
        }
        self.dispatch_webhooks(&deal, event_type).await;

        info!(
            event_name = "deal.confirmed",
            deal_id = %deal.id.0,
            approved = approved,
            "deal decision recorded"
        );

        Ok(next)
    }

    /// Owner dashboard: all deals, newest first.
    pub async fn list_deals(&self) -> Result<Vec<Deal>, WorkflowError> {
        self.deals.list_all().await.map_err(WorkflowError::storage)
    }

    /// Owner dashboard: one deal plus its ordered audit trail.
    pub async fn deal_detail(
        &self,
        deal_id: &DealId,
    ) -> Result<(Deal, Vec<ApprovalEvent>), WorkflowError> {
        let deal = self
            .deals
            .find_by_id(deal_id)
            .await
            .map_err(WorkflowError::storage)?
            .ok_or(WorkflowError::NotFound)?;
        let trail = self.events.list_for_deal(deal_id).await.map_err(WorkflowError::storage)?;
        Ok((deal, trail))
    }

    /// Shared token checks for view/confirm. Expiry is the outermost validity
    /// bound, so it is judged before the used-mark.
    async fn resolve_consumable_token(
        &self,
        raw_token: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<(ApprovalToken, Deal), WorkflowError> {
        let digest = token::hash(raw_token);
        let stored = self
            .tokens
            .find_by_hash(&digest)
            .await
            .map_err(WorkflowError::storage)?
            .ok_or(WorkflowError::NotFound)?;

        if expiry::is_expired(stored.expires_at, now) {
            return Err(WorkflowError::Expired);
        }
        if stored.used_at.is_some() {
            return Err(WorkflowError::AlreadyUsed);
        }

        let deal = self
            .deals
            .find_by_id(&stored.deal_id)
            .await
            .map_err(WorkflowError::storage)?
            .ok_or(WorkflowError::NotFound)?;

        Ok((stored, deal))
    }

    /// Best-effort webhook fan-out for one lifecycle event. Config lookup and
    /// every delivery are independent; failures end up in the log only.
    async fn dispatch_webhooks(&self, deal: &Deal, event: ApprovalEventType) {
        let configs = match self.webhooks.list_active_for_deal(&deal.id).await {
            Ok(configs) => configs,
            Err(lookup_error) => {
                warn!(
                    event_name = "deal.webhook_lookup_failed",
                    deal_id = %deal.id.0,
                    error = %lookup_error,
                    "skipping webhook dispatch"
                );
                return;
            }
        };

        let now = Utc::now();
        for config in configs.into_iter().filter(|config| config.subscribes_to(event)) {
            let payload = WebhookPayload::for_deal(event, deal, None, now);
            let delivered =
                self.dispatcher.deliver(&config.url, config.secret.as_deref(), &payload).await;
            if !delivered {
                warn!(
                    event_name = "deal.webhook_undelivered",
                    deal_id = %deal.id.0,
                    url = %config.url,
                    "webhook delivery failed after retries"
                );
            }
        }
    }
}
