//! JSON surface of the approval workflow.
//!
//! Every route sits behind the identity gateway: the gateway authenticates the
//! user and forwards the actor in `x-actor-id`/`x-actor-email`, proving itself
//! with the shared `x-gateway-token`.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use portaflow_core::config::AttachmentsConfig;
use portaflow_core::domain::approver::{Approver, CompanyId, UserId};
use portaflow_core::domain::attachment::FileUpload;
use portaflow_core::domain::request::{Request, RequestId, SubmissionFields, Verdict};
use portaflow_core::errors::{ApplicationError, InterfaceError};
use portaflow_core::workflow::{CallContext, DecideCommand, SubmitCommand, WorkflowService};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

pub const GATEWAY_TOKEN_HEADER: &str = "x-gateway-token";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    workflow: Arc<WorkflowService>,
    gateway_digest: [u8; 32],
}

impl ApiState {
    pub fn new(workflow: Arc<WorkflowService>, gateway_token: &SecretString) -> Self {
        Self { workflow, gateway_digest: digest(gateway_token.expose_secret()) }
    }

    fn token_matches(&self, presented: &str) -> bool {
        !presented.is_empty() && digest(presented) == self.gateway_digest
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

pub fn router(state: ApiState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/requests", post(submit).get(list_mine))
        .route("/api/v1/requests/{request_id}", get(get_request))
        .route("/api/v1/requests/{request_id}/decision", post(decide))
        .route("/api/v1/requests/{request_id}/cancel", post(cancel))
        .route("/api/v1/inbox", get(inbox))
        .route("/api/v1/approvers", get(approvers))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
}

/// Largest JSON body a full attachment batch can produce once base64-encoded.
pub fn body_limit(attachments: &AttachmentsConfig) -> usize {
    let raw = attachments.max_size_bytes.saturating_mul(attachments.max_files as u64);
    let encoded = raw.saturating_mul(4) / 3;
    usize::try_from(encoded.saturating_add(1024 * 1024)).unwrap_or(usize::MAX)
}

/// Authenticated caller, as asserted by the gateway.
pub struct Caller(pub CallContext);

impl FromRequestParts<ApiState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, ApiError> {
        let correlation_id = header_value(parts, CORRELATION_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !state.token_matches(header_value(parts, GATEWAY_TOKEN_HEADER).unwrap_or_default()) {
            warn!(
                event_name = "http.auth.gateway_rejected",
                correlation_id = %correlation_id,
                path = %parts.uri.path(),
                "request without a valid gateway token"
            );
            return Err(ApiError::Unauthenticated { correlation_id });
        }

        let Some(actor_id) = header_value(parts, ACTOR_ID_HEADER) else {
            return Err(ApiError::Unauthenticated { correlation_id });
        };

        let mut context = CallContext::new(UserId(actor_id.to_string()), correlation_id);
        if let Some(email) = header_value(parts, ACTOR_EMAIL_HEADER) {
            context = context.with_email(email);
        }
        Ok(Caller(context))
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated { correlation_id: String },
    PayloadTooLarge { correlation_id: String },
    Interface(InterfaceError),
}

impl ApiError {
    fn workflow(error: ApplicationError, caller: &CallContext) -> Self {
        warn!(
            event_name = "http.request.failed",
            correlation_id = %caller.correlation_id,
            actor_id = %caller.actor_id,
            error_class = error.error_class(),
            error = %error,
            "workflow operation failed"
        );
        Self::Interface(error.into_interface(caller.correlation_id.clone()))
    }

    fn bad_request(message: &str, details: Vec<String>, caller: &CallContext) -> Self {
        Self::Interface(InterfaceError::BadRequest {
            message: message.to_string(),
            details,
            correlation_id: caller.correlation_id.clone(),
        })
    }

    fn from_json(rejection: JsonRejection, caller: &CallContext) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge { correlation_id: caller.correlation_id.clone() };
        }
        Self::bad_request("malformed body", vec![rejection.body_text()], caller)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details, correlation_id, retry_after) = match self {
            Self::Unauthenticated { correlation_id } => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "Autenticação necessária.",
                Vec::new(),
                correlation_id,
                None,
            ),
            Self::PayloadTooLarge { correlation_id } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "Os arquivos enviados excedem o tamanho permitido.",
                Vec::new(),
                correlation_id,
                None,
            ),
            Self::Interface(error) => {
                let (status, code, retry_after) = match &error {
                    InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request", None),
                    InterfaceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden", None),
                    InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", None),
                    InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict", None),
                    InterfaceError::TooManyRequests { retry_after_secs, .. } => {
                        (StatusCode::TOO_MANY_REQUESTS, "too_many_requests", Some(*retry_after_secs))
                    }
                    InterfaceError::ServiceUnavailable { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", None)
                    }
                    InterfaceError::Internal { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal", None)
                    }
                };
                (
                    status,
                    code,
                    error.user_message(),
                    error.details().to_vec(),
                    error.correlation_id().to_string(),
                    retry_after,
                )
            }
        };

        let body = json!({
            "error": {
                "code": code,
                "message": message,
                "details": details,
                "correlationId": correlation_id,
                "retryAfterSecs": retry_after,
            }
        });
        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub company_id: String,
    #[serde(flatten)]
    pub fields: SubmissionFields,
    #[serde(default)]
    pub approver_ids: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBody {
    pub file_name: String,
    pub content_type: String,
    pub content_base64: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideBody {
    pub verdict: Verdict,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub expected_stage: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproversQuery {
    pub company_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: String,
    pub requester_id: String,
    pub company_id: String,
    pub title: String,
    pub description: String,
    pub period: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub priority: &'static str,
    pub justification: Option<String>,
    pub requested_amount: Option<String>,
    pub status: &'static str,
    pub stage_index: u32,
    pub current_approver_id: Option<String>,
    pub approver_chain: Vec<String>,
    pub completed_approvers: Vec<String>,
    pub decisions: Vec<DecisionView>,
    pub attachments: Vec<AttachmentView>,
    pub version: u64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionView {
    pub stage: u32,
    pub approver_id: String,
    pub verdict: &'static str,
    pub comment: Option<String>,
    pub decided_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub storage_ref: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproverView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub level: i32,
    pub role: Option<String>,
}

impl From<&Request> for RequestView {
    fn from(request: &Request) -> Self {
        let ids = |ids: &[UserId]| ids.iter().map(|id| id.0.clone()).collect::<Vec<_>>();
        Self {
            id: request.id.0.clone(),
            requester_id: request.requester_id.0.clone(),
            company_id: request.company_id.0.clone(),
            title: request.content.title.clone(),
            description: request.content.description.clone(),
            period: request.content.period.clone(),
            request_type: request.content.request_type.clone(),
            priority: request.content.priority.as_str(),
            justification: request.content.justification.clone(),
            requested_amount: request.content.requested_amount.map(|amount| amount.to_string()),
            status: request.status.as_str(),
            stage_index: request.stage_index,
            current_approver_id: request.current_approver_id.as_ref().map(|id| id.0.clone()),
            approver_chain: ids(request.approver_chain.as_slice()),
            completed_approvers: ids(&request.completed_approvers),
            decisions: request
                .decisions
                .iter()
                .map(|decision| DecisionView {
                    stage: decision.stage,
                    approver_id: decision.approver_id.0.clone(),
                    verdict: decision.verdict.as_str(),
                    comment: decision.comment.clone(),
                    decided_at: decision.decided_at.to_rfc3339(),
                })
                .collect(),
            attachments: request
                .attachments
                .iter()
                .map(|attachment| AttachmentView {
                    file_name: attachment.file_name.clone(),
                    size_bytes: attachment.size_bytes,
                    content_type: attachment.content_type.clone(),
                    storage_ref: attachment.storage_ref.0.clone(),
                })
                .collect(),
            version: request.version,
            created_at: request.created_at.to_rfc3339(),
            updated_at: request.updated_at.to_rfc3339(),
        }
    }
}

impl From<&Approver> for ApproverView {
    fn from(approver: &Approver) -> Self {
        Self {
            id: approver.id.0.clone(),
            name: approver.name.clone(),
            email: approver.email.clone(),
            level: approver.level,
            role: approver.role.clone(),
        }
    }
}

fn decode_files(files: Vec<FileBody>, caller: &CallContext) -> Result<Vec<FileUpload>, ApiError> {
    let mut uploads = Vec::with_capacity(files.len());
    let mut invalid = Vec::new();
    for file in files {
        match BASE64.decode(file.content_base64.trim()) {
            Ok(content) => uploads.push(FileUpload {
                file_name: file.file_name,
                content_type: file.content_type,
                content,
            }),
            Err(_) => invalid.push(format!("{}: conteúdo base64 inválido", file.file_name)),
        }
    }
    if invalid.is_empty() {
        Ok(uploads)
    } else {
        Err(ApiError::bad_request("attachments rejected", invalid, caller))
    }
}

async fn submit(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    payload: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    let Json(body) = payload.map_err(|rejection| ApiError::from_json(rejection, &caller))?;
    let command = SubmitCommand {
        company_id: CompanyId(body.company_id.trim().to_string()),
        fields: body.fields,
        approver_ids: body.approver_ids.into_iter().map(UserId).collect(),
        files: decode_files(body.files, &caller)?,
    };

    let request = state
        .workflow
        .submit(&caller, command)
        .await
        .map_err(|error| ApiError::workflow(error, &caller))?;
    Ok((StatusCode::CREATED, Json(RequestView::from(&request))))
}

async fn decide(
    State(state): State<ApiState>,
    Path(request_id): Path<String>,
    Caller(caller): Caller,
    payload: Result<Json<DecideBody>, JsonRejection>,
) -> Result<Json<RequestView>, ApiError> {
    let Json(body) = payload.map_err(|rejection| ApiError::from_json(rejection, &caller))?;
    let command = DecideCommand {
        request_id: RequestId(request_id),
        verdict: body.verdict,
        comment: body.comment,
        expected_stage: body.expected_stage,
    };

    let request = state
        .workflow
        .decide(&caller, command)
        .await
        .map_err(|error| ApiError::workflow(error, &caller))?;
    Ok(Json(RequestView::from(&request)))
}

async fn cancel(
    State(state): State<ApiState>,
    Path(request_id): Path<String>,
    Caller(caller): Caller,
) -> Result<Json<RequestView>, ApiError> {
    let request = state
        .workflow
        .cancel(&caller, &RequestId(request_id))
        .await
        .map_err(|error| ApiError::workflow(error, &caller))?;
    Ok(Json(RequestView::from(&request)))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(request_id): Path<String>,
    Caller(caller): Caller,
) -> Result<Json<RequestView>, ApiError> {
    let request = state
        .workflow
        .get(&caller, &RequestId(request_id))
        .await
        .map_err(|error| ApiError::workflow(error, &caller))?;
    Ok(Json(RequestView::from(&request)))
}

async fn list_mine(
    State(state): State<ApiState>,
    Caller(caller): Caller,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requests = state
        .workflow
        .list_mine(&caller)
        .await
        .map_err(|error| ApiError::workflow(error, &caller))?;
    let views: Vec<RequestView> = requests.iter().map(RequestView::from).collect();
    Ok(Json(json!({ "requests": views })))
}

async fn inbox(
    State(state): State<ApiState>,
    Caller(caller): Caller,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requests = state
        .workflow
        .inbox(&caller)
        .await
        .map_err(|error| ApiError::workflow(error, &caller))?;
    let views: Vec<RequestView> = requests.iter().map(RequestView::from).collect();
    Ok(Json(json!({ "requests": views })))
}

async fn approvers(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    query: Result<Query<ApproversQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::bad_request("malformed query", vec![rejection.body_text()], &caller)
    })?;
    let approvers = state
        .workflow
        .list_eligible_approvers(&caller, &CompanyId(query.company_id.trim().to_string()))
        .await
        .map_err(|error| ApiError::workflow(error, &caller))?;
    let views: Vec<ApproverView> = approvers.iter().map(ApproverView::from).collect();
    Ok(Json(json!({ "approvers": views })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use axum::Router;
    use base64::Engine as _;
    use portaflow_core::audit::InMemoryAuditSink;
    use portaflow_core::domain::approver::{Approver, CompanyId, UserId};
    use portaflow_core::guards::RateLimitRule;
    use portaflow_core::memory::{
        InMemoryApproverDirectory, InMemoryAttemptLog, InMemoryBlobStore, InMemoryNotifier,
        InMemoryRequestStore,
    };
    use portaflow_core::workflow::{WorkflowPorts, WorkflowService, WorkflowSettings};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, ApiState, ACTOR_ID_HEADER, CORRELATION_ID_HEADER, GATEWAY_TOKEN_HEADER};

    const TOKEN: &str = "gateway-token-0123456789";

    fn approver(id: &str, level: i32, can_approve: bool) -> Approver {
        Approver {
            id: UserId(id.to_owned()),
            name: format!("Pessoa {id}"),
            email: format!("{}@consultoria.com.br", id.to_lowercase()),
            level,
            role: None,
            can_approve,
        }
    }

    fn app_with(settings: WorkflowSettings) -> Router {
        let acme = CompanyId("acme".to_owned());
        let ports = WorkflowPorts {
            store: Arc::new(InMemoryRequestStore::default()),
            directory: Arc::new(InMemoryApproverDirectory::with_entries(vec![
                (acme.clone(), approver("L2", 2, true)),
                (acme.clone(), approver("L1", 1, true)),
                (acme, approver("analista", 0, false)),
            ])),
            blobs: Arc::new(InMemoryBlobStore::default()),
            attempts: Arc::new(InMemoryAttemptLog::default()),
            notifier: Arc::new(InMemoryNotifier::default()),
            audit: Arc::new(InMemoryAuditSink::default()),
        };
        let workflow = Arc::new(WorkflowService::new(ports, settings));
        router(ApiState::new(workflow, &SecretString::from(TOKEN.to_string())), 1024 * 1024)
    }

    fn app() -> Router {
        app_with(WorkflowSettings::default())
    }

    fn call(method: &str, uri: &str, actor: &str, body: Option<Value>) -> HttpRequest<Body> {
        let builder = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header(GATEWAY_TOKEN_HEADER, TOKEN)
            .header(ACTOR_ID_HEADER, actor)
            .header(CORRELATION_ID_HEADER, "corr-test");
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    async fn send(app: &Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
        (status, value)
    }

    fn submission(approvers: &[&str]) -> Value {
        json!({
            "companyId": "acme",
            "title": "Compra de Equipamento",
            "description": "Notebooks para auditoria",
            "period": "Janeiro/2024",
            "type": "compra",
            "priority": "Alta",
            "requestedAmount": "15000,00",
            "approverIds": approvers,
            "files": [{
                "fileName": "proposta.pdf",
                "contentType": "application/pdf",
                "contentBase64": base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.7"),
            }],
        })
    }

    async fn submitted(app: &Router, approvers: &[&str]) -> String {
        let (status, body) =
            send(app, call("POST", "/api/v1/requests", "solicitante", Some(submission(approvers)))).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().expect("id").to_owned()
    }

    #[tokio::test]
    async fn requests_without_gateway_token_are_unauthenticated() {
        let app = app();
        let request = HttpRequest::builder()
            .method("GET")
            .uri("/api/v1/inbox")
            .header(ACTOR_ID_HEADER, "L1")
            .body(Body::empty())
            .expect("request");

        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthenticated");
        assert!(body["error"]["correlationId"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn submit_returns_ascending_chain_and_stored_attachment() {
        let app = app();

        let (status, body) =
            send(&app, call("POST", "/api/v1/requests", "solicitante", Some(submission(&["L2", "L1"])))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["approverChain"], json!(["L1", "L2"]));
        assert_eq!(body["status"], "in_review");
        assert_eq!(body["stageIndex"], 1);
        assert_eq!(body["currentApproverId"], "L1");
        assert_eq!(body["requestedAmount"], "15000.00");
        assert_eq!(body["priority"], "high");
        assert_eq!(body["attachments"][0]["sizeBytes"], 8);
    }

    #[tokio::test]
    async fn validation_failures_carry_field_details() {
        let app = app();
        let mut payload = submission(&["L1"]);
        payload["title"] = json!("a".repeat(201));

        let (status, body) = send(&app, call("POST", "/api/v1/requests", "solicitante", Some(payload))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"], json!(["título excede 200 caracteres"]));
        assert_eq!(body["error"]["correlationId"], "corr-test");
    }

    #[tokio::test]
    async fn invalid_base64_is_a_bad_request() {
        let app = app();
        let mut payload = submission(&["L1"]);
        payload["files"][0]["contentBase64"] = json!("***");

        let (status, body) = send(&app, call("POST", "/api/v1/requests", "solicitante", Some(payload))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"], json!(["proposta.pdf: conteúdo base64 inválido"]));
    }

    #[tokio::test]
    async fn out_of_turn_and_terminal_decisions_use_the_state_message() {
        let app = app();
        let id = submitted(&app, &["L1"]).await;
        let uri = format!("/api/v1/requests/{id}/decision");

        let (status, body) = send(&app, call("POST", &uri, "L2", Some(json!({"verdict": "approve"})))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["message"], "Esta solicitação não pode mais ser processada desta forma.");

        let (status, body) = send(
            &app,
            call("POST", &uri, "L1", Some(json!({"verdict": "reject", "comment": "sem orçamento"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["decisions"][0]["comment"], "sem orçamento");

        let (status, body) = send(&app, call("POST", &uri, "L1", Some(json!({"verdict": "approve"})))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "Esta solicitação não pode mais ser processada desta forma.");
    }

    #[tokio::test]
    async fn throttled_submit_returns_retry_after() {
        let app = app_with(WorkflowSettings {
            submit_limit: RateLimitRule { max_attempts: 1, window_minutes: 60 },
            ..WorkflowSettings::default()
        });
        submitted(&app, &["L1"]).await;

        let response = app
            .clone()
            .oneshot(call("POST", "/api/v1/requests", "solicitante", Some(submission(&["L1"]))))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .expect("retry-after header");
        assert!(retry_after > 0 && retry_after <= 3600);
    }

    #[tokio::test]
    async fn reads_follow_visibility_and_inbox_rules() {
        let app = app();
        let id = submitted(&app, &["L1", "L2"]).await;

        let (status, _) = send(&app, call("GET", &format!("/api/v1/requests/{id}"), "L2", None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, call("GET", &format!("/api/v1/requests/{id}"), "outsider", None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, call("GET", "/api/v1/requests/REQ-missing", "L1", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, inbox) = send(&app, call("GET", "/api/v1/inbox", "L1", None)).await;
        assert_eq!(inbox["requests"].as_array().map(Vec::len), Some(1));
        let (_, mine) = send(&app, call("GET", "/api/v1/requests", "solicitante", None)).await;
        assert_eq!(mine["requests"][0]["id"], json!(id));

        let (status, _) = send(&app, call("POST", &format!("/api/v1/requests/{id}/cancel"), "solicitante", None)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, inbox) = send(&app, call("GET", "/api/v1/inbox", "L1", None)).await;
        assert_eq!(inbox["requests"], json!([]));
    }

    #[tokio::test]
    async fn approver_directory_lists_only_eligible_entries() {
        let app = app();

        let (status, body) = send(&app, call("GET", "/api/v1/approvers?companyId=acme", "solicitante", None)).await;

        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body["approvers"]
            .as_array()
            .expect("approvers")
            .iter()
            .filter_map(|approver| approver["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["L1", "L2"]);
    }
}
