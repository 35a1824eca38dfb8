//! Owner and approver notification emails.
//!
//! Rendering happens through embedded Tera templates with HTML autoescaping,
//! so client-controlled strings cannot inject markup into the message body.
//! Delivery is fire-and-forget: a failed send returns `false`, is logged, and
//! never aborts the surrounding workflow step.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tera::{Context, Tera};
use tracing::{info, warn};

use dealgate_core::expiry::TOKEN_TTL_DAYS;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// External mail transport boundary. Production wiring is expected to plug a
/// real provider in here; the default transport just logs the message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> bool;
}

/// Logs outbound mail instead of sending it.
#[derive(Clone, Default)]
pub struct TracingMailTransport;

#[async_trait]
impl MailTransport for TracingMailTransport {
    async fn deliver(&self, message: &EmailMessage) -> bool {
        info!(
            event_name = "email.delivered",
            to = %message.to,
            subject = %message.subject,
            "outbound email (log transport)"
        );
        true
    }
}

/// Captures outbound mail for inspection in tests.
#[derive(Clone, Default)]
pub struct InMemoryMailTransport {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl InMemoryMailTransport {
    pub fn messages(&self) -> Vec<EmailMessage> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MailTransport for InMemoryMailTransport {
    async fn deliver(&self, message: &EmailMessage) -> bool {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        true
    }
}

pub struct EmailNotifier {
    templates: Tera,
    transport: Arc<dyn MailTransport>,
}

fn init_templates() -> Tera {
    let mut tera = Tera::default();
    // Embedded fallbacks keep the binary self-contained; names end in .html
    // so Tera's autoescaping applies.
    tera.add_raw_template(
        "approval_link.html",
        include_str!("../../../templates/email/approval_link.html"),
    )
    .ok();
    tera.add_raw_template(
        "approval_confirmed.html",
        include_str!("../../../templates/email/approval_confirmed.html"),
    )
    .ok();
    tera.add_raw_template(
        "approval_rejected.html",
        include_str!("../../../templates/email/approval_rejected.html"),
    )
    .ok();
    tera
}

impl EmailNotifier {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { templates: init_templates(), transport }
    }

    /// Approval request sent to the client when a deal is created.
    pub async fn send_approval_link(
        &self,
        to: &str,
        client_name: &str,
        approval_link: &str,
        amount: &str,
    ) -> bool {
        let mut context = Context::new();
        context.insert("client_name", client_name);
        context.insert("approval_link", approval_link);
        context.insert("amount", amount);
        context.insert("ttl_days", &TOKEN_TTL_DAYS);

        self.render_and_send(to, &format!("Deal Approval Required - {amount}"), "approval_link.html", context)
            .await
    }

    /// Outcome notification for the deal owner.
    pub async fn send_decision(
        &self,
        to: &str,
        client_name: &str,
        amount: &str,
        decided_at: DateTime<Utc>,
        approved: bool,
    ) -> bool {
        let mut context = Context::new();
        context.insert("client_name", client_name);
        context.insert("amount", amount);
        context.insert("decided_at", &decided_at.to_rfc3339());

        let (subject, template) = if approved {
            (format!("Deal Approved - {client_name}"), "approval_confirmed.html")
        } else {
            (format!("Deal Rejected - {client_name}"), "approval_rejected.html")
        };

        self.render_and_send(to, &subject, template, context).await
    }

    async fn render_and_send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: Context,
    ) -> bool {
        let html = match self.templates.render(template, &context) {
            Ok(html) => html,
            Err(error) => {
                warn!(
                    event_name = "email.render_failed",
                    template = %template,
                    error = %error,
                    "email template rendering failed"
                );
                return false;
            }
        };

        let message = EmailMessage { to: to.to_string(), subject: subject.to_string(), html };
        let delivered = self.transport.deliver(&message).await;
        if !delivered {
            warn!(
                event_name = "email.delivery_failed",
                to = %message.to,
                subject = %message.subject,
                "email transport reported failure"
            );
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::{EmailNotifier, InMemoryMailTransport};

    fn notifier() -> (EmailNotifier, InMemoryMailTransport) {
        let transport = InMemoryMailTransport::default();
        (EmailNotifier::new(Arc::new(transport.clone())), transport)
    }

    #[tokio::test]
    async fn approval_link_email_carries_link_and_amount() {
        let (notifier, transport) = notifier();

        let sent = notifier
            .send_approval_link(
                "buyer@acme.example",
                "Acme GmbH",
                "http://localhost:3000/approve/abc123",
                "EUR 10.00",
            )
            .await;
        assert!(sent);

        let messages = transport.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "buyer@acme.example");
        assert!(messages[0].subject.contains("EUR 10.00"));
        assert!(messages[0].html.contains("http://localhost:3000/approve/abc123"));
        assert!(messages[0].html.contains("14 days"));
    }

    #[tokio::test]
    async fn interpolated_client_values_are_html_escaped() {
        let (notifier, transport) = notifier();

        notifier
            .send_approval_link(
                "buyer@acme.example",
                "<script>alert('x')</script>",
                "http://localhost:3000/approve/abc123",
                "EUR 10.00",
            )
            .await;

        let html = &transport.messages()[0].html;
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn decision_emails_pick_the_right_template() {
        let (notifier, transport) = notifier();
        let now = Utc::now();

        notifier.send_decision("owner@example.com", "Acme GmbH", "EUR 10.00", now, true).await;
        notifier.send_decision("owner@example.com", "Acme GmbH", "EUR 10.00", now, false).await;

        let messages = transport.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].subject.starts_with("Deal Approved"));
        assert!(messages[0].html.contains("proceed with invoicing"));
        assert!(messages[1].subject.starts_with("Deal Rejected"));
        assert!(messages[1].html.contains("contact the client"));
    }
}
