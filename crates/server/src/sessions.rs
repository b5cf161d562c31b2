//! Thin HTTP surface over the agent runtime: one route per conversation
//! operation, all errors mapped to user-safe bodies with a correlation id.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tripcover_agent::integrations::{IntegrationError, SandboxPaymentGateway};
use tripcover_agent::runtime::{AgentRuntime, Attachment, InboundMessage, TurnResponse};
use tripcover_core::domain::document::DocumentType;
use tripcover_core::{ApplicationError, InterfaceError, PaymentStatus, StateSummary};
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionsState {
    runtime: Arc<AgentRuntime>,
    gateway: Arc<SandboxPaymentGateway>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
    #[serde(default)]
    pub attachment: Option<AttachmentPayload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AttachmentPayload {
    pub content_base64: String,
    #[serde(default)]
    pub document_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentEventRequest {
    pub payment_reference_id: String,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnBody {
    pub session_id: String,
    pub assistant_text: String,
    pub state_summary: StateSummary,
    pub requires_human: bool,
    pub decisions: Vec<String>,
}

impl From<TurnResponse> for TurnBody {
    fn from(turn: TurnResponse) -> Self {
        Self {
            session_id: turn.session_id,
            assistant_text: turn.assistant_text,
            state_summary: turn.state_summary,
            requires_human: turn.requires_human,
            decisions: turn.decisions.iter().map(|decision| decision.label()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(runtime: Arc<AgentRuntime>, gateway: Arc<SandboxPaymentGateway>) -> Router {
    Router::new()
        .route("/sessions/{session_id}", get(session_summary))
        .route("/sessions/{session_id}/messages", post(post_message))
        .route("/sessions/{session_id}/payment-events", post(post_payment_event))
        .with_state(SessionsState { runtime, gateway })
}

pub async fn post_message(
    State(state): State<SessionsState>,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<TurnBody>, ApiError> {
    let mut message = InboundMessage::text(request.text);
    if let Some(payload) = request.attachment {
        let bytes = BASE64
            .decode(payload.content_base64.trim())
            .map_err(|_| bad_request("attachment content is not valid base64"))?;
        let type_hint = payload.document_type.as_deref().and_then(DocumentType::parse);
        message = message.with_attachment(Attachment { bytes, type_hint });
    }

    let turn = state
        .runtime
        .send_message(&session_id, message)
        .await
        .map_err(|error| reject(&session_id, error))?;
    Ok(Json(TurnBody::from(turn)))
}

/// Gateway callback. The sandbox gateway records the status first so later
/// polls agree with the notification.
pub async fn post_payment_event(
    State(state): State<SessionsState>,
    Path(session_id): Path<String>,
    Json(request): Json<PaymentEventRequest>,
) -> Result<Json<TurnBody>, ApiError> {
    let status = PaymentStatus::parse(&request.status)
        .ok_or_else(|| bad_request("status must be pending|completed|failed|expired"))?;

    if let Err(error) = state.gateway.settle(&request.payment_reference_id, status).await {
        return Err(match error {
            IntegrationError::UnknownReference(_) => bad_request("unknown payment reference"),
            other => reject(&session_id, ApplicationError::Integration(other.to_string())),
        });
    }
    info!(
        event_name = "payment.notification.received",
        correlation_id = "payment",
        session_id = %session_id,
        payment_reference_id = %request.payment_reference_id,
        status = status.as_str(),
        "payment notification received"
    );

    let turn = state
        .runtime
        .record_payment_notification(&session_id, &request.payment_reference_id, status)
        .await
        .map_err(|error| reject(&session_id, error))?;
    Ok(Json(TurnBody::from(turn)))
}

pub async fn session_summary(
    State(state): State<SessionsState>,
    Path(session_id): Path<String>,
) -> Result<Json<StateSummary>, ApiError> {
    match state.runtime.session_summary(&session_id).await {
        Ok(Some(summary)) => Ok(Json(summary)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "session not found".to_owned(),
                correlation_id: Uuid::new_v4().to_string(),
            }),
        )),
        Err(error) => Err(reject(&session_id, error)),
    }
}

fn bad_request(detail: &str) -> ApiError {
    let correlation_id = Uuid::new_v4().to_string();
    warn!(
        event_name = "http.request.rejected",
        correlation_id = %correlation_id,
        detail,
        "request rejected"
    );
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: detail.to_owned(), correlation_id }))
}

fn reject(session_id: &str, error: ApplicationError) -> ApiError {
    let interface = error.into_interface(Uuid::new_v4().to_string());
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    error!(
        event_name = "http.request.failed",
        correlation_id = %interface.correlation_id(),
        session_id = %session_id,
        status = status.as_u16(),
        error = %interface,
        "session request failed"
    );
    (
        status,
        Json(ErrorBody {
            error: interface.user_message().to_owned(),
            correlation_id: interface.correlation_id().to_owned(),
        }),
    )
}
