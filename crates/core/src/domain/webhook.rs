use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::deal::{Deal, DealId, DealStatus};
use crate::domain::event::ApprovalEventType;
use crate::token::encode_hex;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Header value for configs that have no signing secret provisioned.
pub const UNSIGNED: &str = "unsigned";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookConfigId(pub String);

impl WebhookConfigId {
    pub fn generate() -> Self {
        Self(format!("WH-{}", &Uuid::new_v4().simple().to_string()[..12]))
    }
}

/// Registered callback target. Created when a deal owner supplies a callback
/// URL; read at dispatch time, never mutated by the workflow (deactivation is
/// an external admin action).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub id: WebhookConfigId,
    /// `None` means the config applies to every deal.
    pub deal_id: Option<DealId>,
    pub url: String,
    pub events: Vec<ApprovalEventType>,
    pub secret: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookConfig {
    pub fn for_deal(
        deal_id: DealId,
        url: impl Into<String>,
        secret: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WebhookConfigId::generate(),
            deal_id: Some(deal_id),
            url: url.into(),
            events: vec![
                ApprovalEventType::Sent,
                ApprovalEventType::Approved,
                ApprovalEventType::Rejected,
            ],
            secret,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn subscribes_to(&self, event: ApprovalEventType) -> bool {
        self.events.contains(&event)
    }
}

/// Outbound event body. Field names follow the published contract, hence
/// camelCase on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event: ApprovalEventType,
    pub deal_id: DealId,
    pub deal_status: DealStatus,
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    pub total: i64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WebhookPayload {
    pub fn for_deal(
        event: ApprovalEventType,
        deal: &Deal,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            deal_id: deal.id.clone(),
            deal_status: deal.status,
            client_name: deal.client_name.clone(),
            client_email: deal.client_email.clone(),
            total: deal.total,
            currency: deal.currency.clone(),
            timestamp: now,
            metadata,
        }
    }
}

/// `X-Webhook-Signature` value: HMAC-SHA256 over the exact serialized body
/// bytes, keyed with the per-webhook secret, as `sha256=<hex>`.
pub fn sign_payload(secret: &[u8], body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return UNSIGNED.to_string(),
    };
    mac.update(body);
    format!("sha256={}", encode_hex(mac.finalize().into_bytes().as_slice()))
}
