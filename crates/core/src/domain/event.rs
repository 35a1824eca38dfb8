use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deal::DealId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalEventId(pub String);

impl ApprovalEventId {
    pub fn generate() -> Self {
        Self(format!("EV-{}", &Uuid::new_v4().simple().to_string()[..12]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalEventType {
    Sent,
    Viewed,
    Approved,
    Rejected,
}

/// Request context recorded with every audit event.
///
/// Both values are client-supplied and spoofable; they are kept for
/// audit/forensics only and must never feed authorization decisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub ip: String,
    pub user_agent: String,
}

impl EventMetadata {
    /// Normalizes at construction: blank values become `"unknown"` so the
    /// trail never carries empty fields.
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self { ip: or_unknown(ip.into()), user_agent: or_unknown(user_agent.into()) }
    }

    pub fn unknown() -> Self {
        Self::new("", "")
    }
}

fn or_unknown(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// One immutable entry of a deal's audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub id: ApprovalEventId,
    pub deal_id: DealId,
    pub event_type: ApprovalEventType,
    pub metadata: EventMetadata,
    pub created_at: DateTime<Utc>,
}

impl ApprovalEvent {
    pub fn record(
        deal_id: DealId,
        event_type: ApprovalEventType,
        metadata: EventMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self { id: ApprovalEventId::generate(), deal_id, event_type, metadata, created_at: now }
    }
}

#[cfg(test)]
mod tests {
    use super::EventMetadata;

    #[test]
    fn metadata_normalizes_blank_values_to_unknown() {
        let metadata = EventMetadata::new("  ", "");
        assert_eq!(metadata.ip, "unknown");
        assert_eq!(metadata.user_agent, "unknown");
    }

    #[test]
    fn metadata_trims_but_keeps_real_values() {
        let metadata = EventMetadata::new(" 203.0.113.7 ", "Mozilla/5.0");
        assert_eq!(metadata.ip, "203.0.113.7");
        assert_eq!(metadata.user_agent, "Mozilla/5.0");
    }
}
