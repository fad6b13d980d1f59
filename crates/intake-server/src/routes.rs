//! Request handlers and wire shapes

use crate::error::ApiError;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use intake_core::{
    ApplicationId, ApplicationRecord, BackgroundNotify, ConsentSet, CreateApplication,
    FinalizeOutcome, IntakeError, NotifyRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header carrying the session marker on notify
pub const SESSION_MARKER_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(alias = "licenceStatus")]
    pub firearm_licence_status: Option<String>,
    pub source: Option<String>,
    pub agent_id: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub token: String,
    pub application_id: ApplicationId,
    pub session_id: String,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(default)]
    pub token: String,
    pub data: Option<Map<String, Value>>,
    pub step_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub consents: ConsentSet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyBody {
    #[serde(alias = "applicantId")]
    pub application_id: Option<String>,
    pub session_marker: Option<String>,
    pub event_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub record: Value,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub message: &'static str,
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<CreateResponse>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::InvalidBody)?;
    let user_agent = body.user_agent.or_else(|| {
        headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let created = state
        .service
        .create(CreateApplication {
            licence_status: body.firearm_licence_status,
            source: body.source,
            agent_id: body.agent_id,
            user_agent,
        })
        .await?;

    Ok(Json(CreateResponse {
        token: created.token,
        application_id: created.application_id,
        session_id: created.session_marker,
        expires_at: created.expires_at,
    }))
}

pub async fn update(
    State(state): State<AppState>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<RecordResponse>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::InvalidBody)?;
    let step = body
        .step_number
        .ok_or(IntakeError::MissingField("stepNumber"))?;
    let data = body.data.ok_or(IntakeError::MissingField("data"))?;

    let record = state.service.update(&body.token, step, &data).await?;
    Ok(Json(RecordResponse {
        success: true,
        message: None,
        record: record_json(&record),
    }))
}

pub async fn finalize(
    State(state): State<AppState>,
    body: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Result<Json<RecordResponse>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::InvalidBody)?;

    let response = match state.service.finalize(&body.token, body.consents).await? {
        FinalizeOutcome::Completed(record) => RecordResponse {
            success: true,
            message: None,
            record: record_json(&record),
        },
        FinalizeOutcome::AlreadyComplete(record) => RecordResponse {
            success: true,
            message: Some("Application already complete"),
            record: record_json(&record),
        },
    };
    Ok(Json(response))
}

pub async fn notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NotifyBody>, JsonRejection>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::InvalidBody)?;
    let application_id: ApplicationId = body
        .application_id
        .ok_or(IntakeError::MissingField("applicationId"))?
        .parse()?;
    let session_marker = headers
        .get(SESSION_MARKER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(body.session_marker)
        .unwrap_or_default();

    let request = NotifyRequest {
        application_id,
        session_marker,
        event_correlation_id: body.event_id,
    };
    let message = match state.service.notify_in_background(&request).await? {
        BackgroundNotify::Spawned(_) => "Confirmation queued",
        BackgroundNotify::AlreadyNotified => "Email already sent",
    };
    Ok(Json(NotifyResponse {
        success: true,
        message,
    }))
}

/// Record as returned to the wizard; the session marker is withheld
fn record_json(record: &ApplicationRecord) -> Value {
    let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
    if let Some(fields) = value.as_object_mut() {
        fields.remove("session_marker");
    }
    value
}
