//! Outbound webhook delivery with bounded retries.
//!
//! Delivery is a post-commit side effect: a failed webhook never rolls back
//! the deal transition that triggered it. Server errors and network failures
//! are retried with exponential backoff; client errors (4xx) mean the request
//! itself is malformed and retries cannot succeed, so they stop the loop.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{error, info, warn};

use dealgate_core::domain::webhook::{sign_payload, WebhookPayload, SIGNATURE_HEADER, UNSIGNED};

#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
    max_attempts: u32,
    base_delay: Duration,
}

impl WebhookDispatcher {
    pub fn new(max_attempts: u32) -> Self {
        Self { client: Client::new(), max_attempts: max_attempts.max(1), base_delay: Duration::from_secs(1) }
    }

    /// Shrinks the backoff base; delivery tests use this to keep retry
    /// sequences fast.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// POST the payload to `url`, retrying per policy. Returns whether any
    /// attempt got a 2xx back.
    pub async fn deliver(&self, url: &str, secret: Option<&str>, payload: &WebhookPayload) -> bool {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(serialize_error) => {
                error!(
                    event_name = "webhook.serialize_failed",
                    url = %url,
                    error = %serialize_error,
                    "webhook payload serialization failed"
                );
                return false;
            }
        };

        let signature = match secret {
            Some(secret) => sign_payload(secret.as_bytes(), &body),
            None => UNSIGNED.to_string(),
        };

        for attempt in 1..=self.max_attempts {
            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .header(SIGNATURE_HEADER, &signature)
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    info!(
                        event_name = "webhook.delivered",
                        url = %url,
                        attempt = attempt,
                        "webhook delivered"
                    );
                    return true;
                }
                Ok(response) if response.status().is_client_error() => {
                    warn!(
                        event_name = "webhook.rejected",
                        url = %url,
                        status = %response.status(),
                        attempt = attempt,
                        "webhook rejected by target, not retrying"
                    );
                    return false;
                }
                Ok(response) => {
                    warn!(
                        event_name = "webhook.attempt_failed",
                        url = %url,
                        status = %response.status(),
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        "webhook target returned server error"
                    );
                }
                Err(send_error) => {
                    warn!(
                        event_name = "webhook.attempt_failed",
                        url = %url,
                        error = %send_error,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        "webhook request failed"
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.base_delay * 2u32.pow(attempt - 1)).await;
            }
        }

        error!(
            event_name = "webhook.exhausted",
            url = %url,
            max_attempts = self.max_attempts,
            "all webhook delivery attempts failed"
        );
        false
    }
}
