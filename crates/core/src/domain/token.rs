use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deal::DealId;
use crate::expiry;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalTokenId(pub String);

impl ApprovalTokenId {
    pub fn generate() -> Self {
        Self(format!("TK-{}", &Uuid::new_v4().simple().to_string()[..12]))
    }
}

/// Persisted form of an approval token. Carries only the digest of the
/// secret; the raw secret never reaches storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalToken {
    pub id: ApprovalTokenId,
    pub deal_id: DealId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalToken {
    pub fn issue(deal_id: DealId, token_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: ApprovalTokenId::generate(),
            deal_id,
            token_hash,
            expires_at: expiry::expiration_from(now),
            used_at: None,
            created_at: now,
        }
    }

    /// A token grants exactly one decision: unused and inside its window.
    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && !expiry::is_expired(self.expires_at, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::deal::DealId;

    use super::ApprovalToken;

    #[test]
    fn issued_token_is_consumable_for_fourteen_days() {
        let now = Utc::now();
        let token = ApprovalToken::issue(DealId("DL-1".to_string()), "digest".to_string(), now);
        assert!(token.is_consumable(now));
        assert!(token.is_consumable(now + Duration::days(13)));
        assert!(!token.is_consumable(now + Duration::days(15)));
    }

    #[test]
    fn used_token_is_never_consumable() {
        let now = Utc::now();
        let mut token = ApprovalToken::issue(DealId("DL-1".to_string()), "digest".to_string(), now);
        token.used_at = Some(now);
        assert!(!token.is_consumable(now));
    }
}
