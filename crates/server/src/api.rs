//! HTTP surface of the approval workflow.
//!
//! Owner endpoints (deal creation and dashboard reads) sit under `/api/v1/deals`;
//! session handling for them is an external concern at this boundary. Approver
//! endpoints are token-gated and need no other authentication:
//!
//! - `POST /api/v1/deals`                        — create a deal, issue its token
//! - `GET  /api/v1/deals`                        — list deals, newest first
//! - `GET  /api/v1/deals/{deal_id}`              — deal plus audit trail
//! - `GET  /api/v1/approval/{token}`             — approver view of a deal
//! - `POST /api/v1/approval/{token}/confirm`     — approve or reject

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use dealgate_core::domain::deal::{Deal, DealLine, DealStatus};
use dealgate_core::domain::event::ApprovalEvent;
use dealgate_core::{ApprovalEventType, DealId, WorkflowError};

use crate::context;
use crate::workflow::{CreatedDeal, DealDraft, DealView, DealWorkflow};

#[derive(Clone)]
pub struct ApiState {
    workflow: Arc<DealWorkflow>,
}

pub fn router(workflow: Arc<DealWorkflow>) -> Router {
    Router::new()
        .route("/api/v1/deals", post(create_deal).get(list_deals))
        .route("/api/v1/deals/{deal_id}", get(deal_detail))
        .route("/api/v1/approval/{token}", get(view_deal))
        .route("/api/v1/approval/{token}/confirm", post(confirm_deal))
        .with_state(ApiState { workflow })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDealRequest {
    pub client_name: String,
    pub client_email: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Declared total in minor units; must match the line arithmetic.
    pub total: i64,
    pub items: Vec<DealLine>,
    pub webhook_url: Option<String>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDealResponse {
    pub deal_id: String,
    pub approval_link: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub approved: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub success: bool,
    pub status: DealStatus,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealSummary {
    pub id: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub currency: String,
    pub total: i64,
    pub status: DealStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Deal> for DealSummary {
    fn from(deal: &Deal) -> Self {
        Self {
            id: deal.id.0.clone(),
            client_name: deal.client_name.clone(),
            client_email: deal.client_email.clone(),
            currency: deal.currency.clone(),
            total: deal.total,
            status: deal.status,
            created_at: deal.created_at,
            updated_at: deal.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub event_type: ApprovalEventType,
    pub ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ApprovalEvent> for EventView {
    fn from(event: &ApprovalEvent) -> Self {
        Self {
            id: event.id.0.clone(),
            event_type: event.event_type,
            ip: event.metadata.ip.clone(),
            user_agent: event.metadata.user_agent.clone(),
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealDetailResponse {
    pub deal: DealSummary,
    pub items: Vec<DealLine>,
    pub audit_trail: Vec<EventView>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_deal(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<CreateDealRequest>,
) -> Result<(StatusCode, Json<CreateDealResponse>), (StatusCode, Json<ApiError>)> {
    let metadata = context::request_metadata(&headers, Some(peer));

    let CreatedDeal { deal_id, approval_link, token } = state
        .workflow
        .create_deal(
            DealDraft {
                client_name: body.client_name,
                client_email: body.client_email,
                currency: body.currency,
                total: body.total,
                items: body.items,
                webhook_url: body.webhook_url,
            },
            metadata,
        )
        .await
        .map_err(error_response)?;

    info!(
        event_name = "api.deal.created",
        deal_id = %deal_id.0,
        "deal created via API"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateDealResponse { deal_id: deal_id.0, approval_link, token }),
    ))
}

async fn list_deals(
    State(state): State<ApiState>,
) -> Result<Json<Vec<DealSummary>>, (StatusCode, Json<ApiError>)> {
    let deals = state.workflow.list_deals().await.map_err(error_response)?;
    Ok(Json(deals.iter().map(DealSummary::from).collect()))
}

async fn deal_detail(
    State(state): State<ApiState>,
    Path(deal_id): Path<String>,
) -> Result<Json<DealDetailResponse>, (StatusCode, Json<ApiError>)> {
    let (deal, trail) =
        state.workflow.deal_detail(&DealId(deal_id)).await.map_err(error_response)?;

    Ok(Json(DealDetailResponse {
        deal: DealSummary::from(&deal),
        items: deal.lines.clone(),
        audit_trail: trail.iter().map(EventView::from).collect(),
    }))
}

async fn view_deal(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Json<DealView>, (StatusCode, Json<ApiError>)> {
    let metadata = context::request_metadata(&headers, Some(peer));
    let view = state.workflow.view_deal(&token, metadata).await.map_err(error_response)?;
    Ok(Json(view))
}

async fn confirm_deal(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(token): Path<String>,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, (StatusCode, Json<ApiError>)> {
    let metadata = context::request_metadata(&headers, Some(peer));
    let status =
        state.workflow.confirm_deal(&token, body.approved, metadata).await.map_err(error_response)?;
    Ok(Json(ConfirmResponse { success: true, status }))
}

/// Map workflow failures onto the wire. The body carries the user-safe
/// message only; storage detail stays in the log.
fn error_response(error: WorkflowError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
        WorkflowError::NotFound => StatusCode::NOT_FOUND,
        WorkflowError::AlreadyUsed | WorkflowError::Expired => StatusCode::GONE,
        WorkflowError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    if let WorkflowError::Storage(ref detail) = error {
        error!(
            event_name = "api.storage_failure",
            error = %detail,
            "request failed on storage"
        );
    }

    (status, Json(ApiError { error: error.user_message().to_string() }))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::extract::{ConnectInfo, Path, State};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::Json;
    use rust_decimal::Decimal;

    use dealgate_core::config::AppConfig;
    use dealgate_core::domain::deal::{DealLine, DealStatus};
    use dealgate_db::{connect_with_settings, migrations};

    use crate::email::{EmailNotifier, InMemoryMailTransport};
    use crate::webhook::WebhookDispatcher;
    use crate::workflow::{DealWorkflow, WorkflowRepositories};

    use super::*;

    async fn state() -> State<ApiState> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let workflow = DealWorkflow::new(
            WorkflowRepositories::sql(&pool),
            EmailNotifier::new(Arc::new(InMemoryMailTransport::default())),
            WebhookDispatcher::new(1),
            &AppConfig::default(),
        );
        State(ApiState { workflow: Arc::new(workflow) })
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("198.51.100.4:55000".parse().expect("socket addr"))
    }

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("user-agent", HeaderValue::from_static("test-suite/1.0"));
        headers
    }

    fn create_request() -> CreateDealRequest {
        CreateDealRequest {
            client_name: "Acme GmbH".to_string(),
            client_email: Some("buyer@acme.example".to_string()),
            currency: "EUR".to_string(),
            total: 1000,
            items: vec![DealLine {
                description: "Consulting".to_string(),
                quantity: Decimal::from(2),
                unit_price: 500,
            }],
            webhook_url: None,
        }
    }

    #[tokio::test]
    async fn create_deal_returns_link_and_single_use_token() {
        let state = state().await;

        let (status, response) =
            create_deal(state.clone(), peer(), forwarded_headers(), Json(create_request()))
                .await
                .expect("create should succeed");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.0.token.len(), 64);
        assert!(response.0.approval_link.ends_with(&response.0.token));

        let detail = deal_detail(state, Path(response.0.deal_id.clone()))
            .await
            .expect("detail should succeed");
        assert_eq!(detail.0.deal.status, DealStatus::Sent);
        assert_eq!(detail.0.audit_trail.len(), 1);
        assert_eq!(detail.0.audit_trail[0].ip, "203.0.113.7");
        assert_eq!(detail.0.audit_trail[0].user_agent, "test-suite/1.0");
    }

    #[tokio::test]
    async fn create_deal_with_mismatched_total_is_bad_request() {
        let state = state().await;
        let mut request = create_request();
        request.total = 2500;

        let result = create_deal(state, peer(), forwarded_headers(), Json(request)).await;
        let (status, body) = result.expect_err("should fail validation");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.0.error.is_empty());
    }

    #[tokio::test]
    async fn approval_flow_view_then_confirm() {
        let state = state().await;
        let (_, created) =
            create_deal(state.clone(), peer(), forwarded_headers(), Json(create_request()))
                .await
                .expect("create");

        let view = view_deal(
            state.clone(),
            peer(),
            forwarded_headers(),
            Path(created.0.token.clone()),
        )
        .await
        .expect("view");
        assert_eq!(view.0.client_name, "Acme GmbH");
        assert_eq!(view.0.total, 1000);

        let confirmed = confirm_deal(
            state.clone(),
            peer(),
            forwarded_headers(),
            Path(created.0.token.clone()),
            Json(ConfirmRequest { approved: true }),
        )
        .await
        .expect("confirm");
        assert!(confirmed.0.success);
        assert_eq!(confirmed.0.status, DealStatus::Approved);

        let detail =
            deal_detail(state, Path(created.0.deal_id.clone())).await.expect("detail");
        assert_eq!(detail.0.deal.status, DealStatus::Approved);
    }

    #[tokio::test]
    async fn used_token_maps_to_gone() {
        let state = state().await;
        let (_, created) =
            create_deal(state.clone(), peer(), forwarded_headers(), Json(create_request()))
                .await
                .expect("create");

        confirm_deal(
            state.clone(),
            peer(),
            forwarded_headers(),
            Path(created.0.token.clone()),
            Json(ConfirmRequest { approved: false }),
        )
        .await
        .expect("first confirm");

        let result = confirm_deal(
            state,
            peer(),
            forwarded_headers(),
            Path(created.0.token.clone()),
            Json(ConfirmRequest { approved: true }),
        )
        .await;
        let (status, body) = result.expect_err("second confirm must fail");
        assert_eq!(status, StatusCode::GONE);
        assert!(body.0.error.contains("already been used"));
    }

    #[tokio::test]
    async fn unknown_token_maps_to_not_found() {
        let state = state().await;

        let result = view_deal(
            state,
            peer(),
            forwarded_headers(),
            Path(dealgate_core::token::generate()),
        )
        .await;
        let (status, _) = result.expect_err("unknown token");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_deal_detail_maps_to_not_found() {
        let state = state().await;

        let result = deal_detail(state, Path("DL-missing".to_string())).await;
        let (status, _) = result.expect_err("unknown deal");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_deals_reflects_created_deals() {
        let state = state().await;
        create_deal(state.clone(), peer(), forwarded_headers(), Json(create_request()))
            .await
            .expect("create");

        let deals = list_deals(state).await.expect("list");
        assert_eq!(deals.0.len(), 1);
        assert_eq!(deals.0[0].client_name, "Acme GmbH");
    }
}
