use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use dealgate_core::domain::deal::{Deal, DealId, DealStatus};
use dealgate_core::domain::event::ApprovalEvent;
use dealgate_core::domain::token::{ApprovalToken, ApprovalTokenId};
use dealgate_core::domain::webhook::WebhookConfig;

pub mod confirmation;
pub mod deal;
pub mod event;
pub mod memory;
pub mod token;
pub mod webhook;

pub use confirmation::SqlConfirmationRepository;
pub use deal::SqlDealRepository;
pub use event::SqlEventRepository;
pub use memory::InMemoryWorkflowStore;
pub use token::SqlTokenRepository;
pub use webhook::SqlWebhookConfigRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DealRepository: Send + Sync {
    async fn insert(&self, deal: Deal) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError>;
    /// All deals, newest first (owner dashboard).
    async fn list_all(&self) -> Result<Vec<Deal>, RepositoryError>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: ApprovalToken) -> Result<(), RepositoryError>;
    async fn find_by_hash(&self, token_hash: &str)
        -> Result<Option<ApprovalToken>, RepositoryError>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn append(&self, event: ApprovalEvent) -> Result<(), RepositoryError>;
    /// Audit trail in insertion order (oldest first).
    async fn list_for_deal(&self, deal_id: &DealId) -> Result<Vec<ApprovalEvent>, RepositoryError>;
}

#[async_trait]
pub trait WebhookConfigRepository: Send + Sync {
    async fn insert(&self, config: WebhookConfig) -> Result<(), RepositoryError>;
    /// Active configs scoped to the deal plus global (unscoped) ones.
    async fn list_active_for_deal(
        &self,
        deal_id: &DealId,
    ) -> Result<Vec<WebhookConfig>, RepositoryError>;
}

/// Outcome of the single-use gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Applied,
    AlreadyUsed,
}

#[async_trait]
pub trait ConfirmationRepository: Send + Sync {
    /// Mark the token used and move the deal to its terminal status as one
    /// atomic unit. The token update is guarded by `used_at IS NULL`; a
    /// concurrent caller that loses the race observes `AlreadyUsed` and no
    /// state is written on its behalf.
    async fn consume_and_transition(
        &self,
        token_id: &ApprovalTokenId,
        deal_id: &DealId,
        status: DealStatus,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, RepositoryError>;
}
