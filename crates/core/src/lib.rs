pub mod config;
pub mod domain;
pub mod errors;
pub mod expiry;
pub mod token;

pub use domain::deal::{format_amount, Deal, DealId, DealLine, DealStatus};
pub use domain::event::{ApprovalEvent, ApprovalEventId, ApprovalEventType, EventMetadata};
pub use domain::token::{ApprovalToken, ApprovalTokenId};
pub use domain::webhook::{WebhookConfig, WebhookConfigId, WebhookPayload};
pub use errors::{DomainError, WorkflowError};
