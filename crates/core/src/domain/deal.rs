use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealId(pub String);

impl DealId {
    pub fn generate() -> Self {
        Self(format!("DL-{}", &Uuid::new_v4().simple().to_string()[..12]))
    }
}

/// Deal lifecycle. `Sent -> {Approved | Rejected}` is the only stored
/// transition; `Draft` and `Expired` are representable but never written by
/// the base flow (`Expired` is a read-time judgment on the token).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealLine {
    pub description: String,
    pub quantity: Decimal,
    /// Price per unit in minor currency units (cents).
    pub unit_price: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub client_name: String,
    pub client_email: Option<String>,
    pub currency: String,
    /// Total in minor currency units. Fixed at creation; never re-derived.
    pub total: i64,
    pub lines: Vec<DealLine>,
    pub status: DealStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// Build a validated deal snapshot in `Sent` status.
    ///
    /// The declared total must equal the rounded sum of quantity x unit price
    /// across lines; the caller owns the arithmetic, this only refuses
    /// mismatches.
    pub fn try_new(
        client_name: impl Into<String>,
        client_email: Option<String>,
        currency: impl Into<String>,
        total: i64,
        lines: Vec<DealLine>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let client_name = client_name.into();
        let currency: String = currency.into();

        if client_name.trim().is_empty() {
            return Err(DomainError::InvariantViolation("client name must not be empty".to_owned()));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::InvariantViolation(format!(
                "currency must be a 3-letter code, got `{currency}`"
            )));
        }
        if lines.is_empty() {
            return Err(DomainError::InvariantViolation(
                "a deal needs at least one line item".to_owned(),
            ));
        }
        for line in &lines {
            if line.quantity <= Decimal::ZERO {
                return Err(DomainError::InvariantViolation(format!(
                    "line `{}` has non-positive quantity",
                    line.description
                )));
            }
            if line.unit_price <= 0 {
                return Err(DomainError::InvariantViolation(format!(
                    "line `{}` has non-positive unit price",
                    line.description
                )));
            }
        }
        if total <= 0 {
            return Err(DomainError::InvariantViolation("total must be positive".to_owned()));
        }
        let expected = rounded_total(&lines);
        if total != expected {
            return Err(DomainError::InvariantViolation(format!(
                "declared total {total} does not match line total {expected}"
            )));
        }

        let email = client_email.map(|value| value.trim().to_owned()).filter(|v| !v.is_empty());
        if let Some(ref email) = email {
            if !email.contains('@') {
                return Err(DomainError::InvariantViolation(format!(
                    "client email `{email}` is not an email address"
                )));
            }
        }

        Ok(Self {
            id: DealId::generate(),
            client_name: client_name.trim().to_owned(),
            client_email: email,
            currency: currency.to_ascii_uppercase(),
            total,
            lines,
            status: DealStatus::Sent,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn can_transition_to(&self, next: DealStatus) -> bool {
        matches!(
            (self.status, next),
            (DealStatus::Sent, DealStatus::Approved) | (DealStatus::Sent, DealStatus::Rejected)
        )
    }

    pub fn transition_to(&mut self, next: DealStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidDealTransition { from: self.status, to: next })
    }
}

/// Sum of quantity x unit price across lines, rounded to whole minor units.
pub fn rounded_total(lines: &[DealLine]) -> i64 {
    let sum: Decimal =
        lines.iter().map(|line| line.quantity * Decimal::from(line.unit_price)).sum();
    sum.round().to_i64().unwrap_or(i64::MAX)
}

/// Human-readable amount for notifications, e.g. `EUR 10.00` from 1000 cents.
pub fn format_amount(currency: &str, minor_units: i64) -> String {
    format!("{currency} {}.{:02}", minor_units / 100, (minor_units % 100).abs())
}
