use thiserror::Error;

use crate::domain::deal::DealStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid deal transition from {from:?} to {to:?}")]
    InvalidDealTransition { from: DealStatus, to: DealStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure taxonomy of the approval workflow.
///
/// Token/state failures are user-visible and final; storage failures are hard
/// failures of the triggering request. Email and webhook delivery failures
/// are deliberately absent: delivery is advisory, retried internally where
/// applicable, then logged and absorbed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("token or deal not found")]
    NotFound,
    #[error("approval token already used")]
    AlreadyUsed,
    #[error("approval token expired")]
    Expired,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn storage(source: impl std::fmt::Display) -> Self {
        Self::Storage(source.to_string())
    }

    /// Message safe to show an approver or owner; no internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "This approval link is not valid.",
            Self::AlreadyUsed => "This approval link has already been used.",
            Self::Expired => "This approval link has expired.",
            Self::Validation(_) => "The request could not be processed. Check inputs and try again.",
            Self::Storage(_) => "The service is temporarily unavailable. Please retry shortly.",
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(value: DomainError) -> Self {
        Self::Validation(value.to_string())
    }
}
