//! HTTP API over the approval engine and the graph generator

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use workflow_core::generator::{self, CommonNodeTemplates, PlatformConfig, WorkflowGraphDocument};
use workflow_core::workflow::{ActorId, ApprovalEngine, DefinitionId, InstanceId, RequestContext, WorkflowDefinition};
use workflow_core::WorkflowError;
use workflow_types::{
    ApprovalInstanceView, ApprovalListView, ApprovalStatus, CreateApprovalRequest, CreateDelegationRequest,
    ErrorKind, HealthView, ListApprovalsQuery, ListDelegationsQuery, RecordDecisionRequest,
};

/// Header carrying the caller identity resolved by the gateway
pub const HEADER_ACTOR_ID: &str = "X-Actor-Id";

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<ApprovalEngine>,
    pub templates: Arc<CommonNodeTemplates>,
}

/// Every failure leaves the API as `{"kind": ..., "message": ...}`
#[derive(Debug)]
pub struct ApiError(WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(WorkflowError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(WorkflowError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(WorkflowError::Validation(rejection.body_text()))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.0.to_body();
        let status = status_for(body.kind);
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        } else {
            log::debug!("Request rejected: {}", self.0);
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Identity of the caller, taken from the `X-Actor-Id` header
#[derive(Debug)]
pub struct Actor(pub ActorId);

impl FromRequestParts<ServerState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &ServerState) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(HEADER_ACTOR_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Actor(ActorId::new(v)))
            .ok_or_else(|| {
                ApiError(WorkflowError::Validation(format!("Missing {} header", HEADER_ACTOR_ID)))
            })
    }
}

type PathParam = Result<Path<String>, PathRejection>;

fn instance_id(path: PathParam) -> ApiResult<InstanceId> {
    let Path(raw) = path?;
    Ok(InstanceId::from_string(&raw)?)
}

fn definition_id(raw: &str) -> ApiResult<DefinitionId> {
    Ok(DefinitionId::parse(raw)?)
}

fn definition_path(path: PathParam) -> ApiResult<DefinitionId> {
    let Path(raw) = path?;
    definition_id(&raw)
}

// ---- approvals ----

async fn create_approval(
    State(state): State<ServerState>,
    Actor(actor): Actor,
    payload: Result<Json<CreateApprovalRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApprovalInstanceView>)> {
    let Json(request) = payload?;
    let definition = request.definition_id.as_deref().map(definition_id).transpose()?;

    let context = RequestContext {
        request_type: request.request_type,
        requested_by: actor,
        payload: request.context,
    };

    let instance = state.engine.create(definition.as_ref(), context).await?;
    Ok((StatusCode::CREATED, Json(state.engine.view(&instance)?)))
}

async fn list_approvals(
    State(state): State<ServerState>,
    query: Result<Query<ListApprovalsQuery>, QueryRejection>,
) -> ApiResult<Json<ApprovalListView>> {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<ApprovalStatus>())
        .transpose()
        .map_err(WorkflowError::Validation)?;

    let approvals = state
        .engine
        .list(status)?
        .iter()
        .map(|instance| state.engine.view(instance))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ApprovalListView {
        total_count: approvals.len(),
        approvals,
    }))
}

async fn get_approval(
    State(state): State<ServerState>,
    id: PathParam,
) -> ApiResult<Json<ApprovalInstanceView>> {
    let instance = state.engine.get(&instance_id(id)?)?;
    Ok(Json(state.engine.view(&instance)?))
}

async fn record_decision(
    State(state): State<ServerState>,
    id: PathParam,
    Actor(actor): Actor,
    payload: Result<Json<RecordDecisionRequest>, JsonRejection>,
) -> ApiResult<Json<ApprovalInstanceView>> {
    let Json(request) = payload?;
    let instance = state
        .engine
        .record_decision_at_step(&instance_id(id)?, &actor, request.outcome, request.comment, request.step)
        .await?;
    Ok(Json(state.engine.view(&instance)?))
}

async fn cancel_approval(
    State(state): State<ServerState>,
    id: PathParam,
    Actor(actor): Actor,
) -> ApiResult<Json<ApprovalInstanceView>> {
    let instance = state.engine.cancel(&instance_id(id)?, &actor).await?;
    Ok(Json(state.engine.view(&instance)?))
}

// ---- definitions ----

async fn publish_definition(
    State(state): State<ServerState>,
    Actor(actor): Actor,
    payload: Result<Json<WorkflowDefinition>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    let Json(definition) = payload?;
    let stored = state.engine.publish_definition(definition)?;
    log::info!("{} published definition {} v{}", actor, stored.id, stored.version);
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn list_definitions(State(state): State<ServerState>) -> ApiResult<Json<Vec<WorkflowDefinition>>> {
    Ok(Json(state.engine.definitions()?))
}

async fn get_definition(
    State(state): State<ServerState>,
    id: PathParam,
) -> ApiResult<Json<WorkflowDefinition>> {
    Ok(Json(state.engine.definition(&definition_path(id)?)?))
}

async fn deactivate_definition(
    State(state): State<ServerState>,
    id: PathParam,
    Actor(actor): Actor,
) -> ApiResult<Json<WorkflowDefinition>> {
    let stored = state.engine.deactivate_definition(&definition_path(id)?)?;
    log::info!("{} deactivated definition {}", actor, stored.id);
    Ok(Json(stored))
}

// ---- delegations ----

async fn create_delegation(
    State(state): State<ServerState>,
    Actor(actor): Actor,
    payload: Result<Json<CreateDelegationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<workflow_core::Delegation>)> {
    let Json(request) = payload?;

    let approver = request.approver.map(ActorId::new).unwrap_or_else(|| actor.clone());
    if approver != actor {
        return Err(WorkflowError::Forbidden(format!(
            "{} cannot delegate authority of {}",
            actor, approver
        ))
        .into());
    }

    let delegation = state.engine.add_delegation(
        approver,
        ActorId::new(request.delegate),
        request.starts_at,
        request.ends_at,
        request.reason,
    )?;
    Ok((StatusCode::CREATED, Json(delegation)))
}

async fn list_delegations(
    State(state): State<ServerState>,
    query: Result<Query<ListDelegationsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<workflow_core::Delegation>>> {
    let Query(query) = query?;
    let approver = query.approver.map(ActorId::new);
    Ok(Json(state.engine.delegations(approver.as_ref())?))
}

// ---- generator ----

/// Either a preset platform name or a full platform config
#[derive(Debug, Deserialize)]
pub struct GenerateWorkflowRequest {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub config: Option<PlatformConfig>,
    pub seed: String,
}

async fn generate_workflow(
    State(state): State<ServerState>,
    payload: Result<Json<GenerateWorkflowRequest>, JsonRejection>,
) -> ApiResult<Json<WorkflowGraphDocument>> {
    let Json(request) = payload?;

    let platform = match (request.platform, request.config) {
        (Some(name), None) => PlatformConfig::preset(&name)?,
        (None, Some(config)) => config,
        _ => {
            return Err(WorkflowError::Validation(
                "Provide exactly one of 'platform' or 'config'".to_string(),
            )
            .into())
        }
    };

    Ok(Json(generator::generate(&platform, &state.templates, &request.seed)?))
}

async fn health(State(state): State<ServerState>) -> Json<HealthView> {
    Json(state.engine.health())
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/approvals", post(create_approval).get(list_approvals))
        .route("/approvals/{id}", get(get_approval))
        .route("/approvals/{id}/decisions", post(record_decision))
        .route("/approvals/{id}/cancel", post(cancel_approval))
        .route("/definitions", post(publish_definition).get(list_definitions))
        .route("/definitions/{id}", get(get_definition))
        .route("/definitions/{id}/deactivate", post(deactivate_definition))
        .route("/delegations", post(create_delegation).get(list_delegations))
        .route("/generator/workflows", post(generate_workflow))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn run_server(state: ServerState, address: &str) -> anyhow::Result<()> {
    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(address).await?;

    log::info!("HTTP API listening on {}", address);
    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use workflow_core::clients::{RecordingNotifier, StaticDirectory};
    use workflow_core::InMemoryStore;

    fn app() -> Router {
        let engine = ApprovalEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticDirectory::default()),
            Arc::new(RecordingNotifier::new()),
        );
        make_app(ServerState {
            engine: Arc::new(engine),
            templates: Arc::new(CommonNodeTemplates::default()),
        })
    }

    fn request(method: &str, uri: &str, actor: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header(HEADER_ACTOR_ID, actor);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn single_step_definition() -> Value {
        json!({
            "id": "expense",
            "name": "Expense",
            "applies_to": ["expense"],
            "steps": [
                {"name": "manager", "approvers": {"user": "maria"}, "rule": "any-approve"}
            ]
        })
    }

    async fn create_instance(app: &Router) -> String {
        let (status, _) = send(app, request("POST", "/definitions", Some("admin"), Some(single_step_definition()))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            request(
                "POST",
                "/approvals",
                Some("ivan"),
                Some(json!({"request_type": "expense", "context": {"amount": 12}})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_approval_round_trip() {
        let app = app();
        let id = create_instance(&app).await;

        let (status, body) = send(&app, request("GET", &format!("/approvals/{}", id), None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["current_step_name"], "manager");
        assert_eq!(body["requested_by"], "ivan");

        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/approvals/{}/decisions", id),
                Some("maria"),
                Some(json!({"outcome": "approve", "comment": "fine"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");
        assert_eq!(body["current_step"], 1);
        assert_eq!(body["decisions"][0]["actor"], "maria");
        assert_eq!(body["decisions"][0]["comment"], "fine");

        let (status, body) = send(&app, request("GET", "/approvals?status=approved", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_count"], 1);

        let (_, body) = send(&app, request("GET", "/approvals?status=pending", None, None)).await;
        assert_eq!(body["total_count"], 0);
    }

    #[tokio::test]
    async fn test_error_kinds_map_to_statuses() {
        let app = app();
        let id = create_instance(&app).await;

        // Forbidden: not an approver
        let (status, body) = send(
            &app,
            request("POST", &format!("/approvals/{}/decisions", id), Some("mallory"), Some(json!({"outcome": "approve"}))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");

        // InvalidState: cancel twice
        let cancel = format!("/approvals/{}/cancel", id);
        let (status, _) = send(&app, request("POST", &cancel, Some("ivan"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, request("POST", &cancel, Some("ivan"), None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "invalid_state");
        assert!(body["message"].as_str().unwrap().contains("cancelled"));

        // NotFound
        let missing = InstanceId::new();
        let (status, body) = send(&app, request("GET", &format!("/approvals/{}", missing), None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        // Validation: missing actor header, bad status filter, malformed body
        let (status, body) = send(&app, request("POST", &cancel, None, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (status, _) = send(&app, request("GET", "/approvals?status=lost", None, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            request("POST", &format!("/approvals/{}/decisions", id), Some("maria"), Some(json!({"outcome": "maybe"}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn test_undecodable_path_segment_is_validation() {
        let app = app();

        for uri in ["/approvals/%FF", "/definitions/%C3%28"] {
            let (status, body) = send(&app, request("GET", uri, None, None)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["kind"], "validation");
            assert!(body["message"].is_string());
        }

        let (status, body) = send(&app, request("POST", "/approvals/%FF/cancel", Some("ivan"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn test_definition_endpoints() {
        let app = app();
        let (status, body) = send(&app, request("POST", "/definitions", Some("admin"), Some(single_step_definition()))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["version"], 1);

        let (status, body) = send(&app, request("POST", "/definitions/expense/deactivate", Some("admin"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);
        assert_eq!(body["version"], 2);

        let (_, body) = send(&app, request("GET", "/definitions/expense", None, None)).await;
        assert_eq!(body["version"], 2);

        let (status, body) = send(
            &app,
            request("POST", "/approvals", Some("ivan"), Some(json!({"definition_id": "expense", "request_type": "expense"}))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        let (status, _) = send(
            &app,
            request("POST", "/definitions", Some("admin"), Some(json!({"id": "empty", "name": "Empty", "steps": []}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delegation_endpoints() {
        let app = app();
        let now = chrono::Utc::now();
        let body = json!({
            "delegate": "nora",
            "starts_at": now - chrono::Duration::hours(1),
            "ends_at": now + chrono::Duration::hours(8),
            "reason": "vacation"
        });

        let (status, created) = send(&app, request("POST", "/delegations", Some("maria"), Some(body.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["approver"], "maria");

        let mut for_someone_else = body;
        for_someone_else["approver"] = json!("fred");
        let (status, _) = send(&app, request("POST", "/delegations", Some("maria"), Some(for_someone_else))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, listed) = send(&app, request("GET", "/delegations?approver=maria", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // Delegate approves for maria
        let id = create_instance(&app).await;
        let (status, decided) = send(
            &app,
            request("POST", &format!("/approvals/{}/decisions", id), Some("nora"), Some(json!({"outcome": "approve"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decided["decisions"][0]["on_behalf_of"], "maria");
    }

    #[tokio::test]
    async fn test_generator_endpoint_is_deterministic() {
        let app = app();
        let body = json!({"platform": "telegram", "seed": "salon-9"});

        let first = app.clone().oneshot(request("POST", "/generator/workflows", None, Some(body.clone()))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();

        let second = app.clone().oneshot(request("POST", "/generator/workflows", None, Some(body))).await.unwrap();
        let second = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(first, second);

        let (status, body) = send(&app, request("POST", "/generator/workflows", None, Some(json!({"seed": "x"})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (status, _) = send(
            &app,
            request("POST", "/generator/workflows", None, Some(json!({"platform": "fax", "seed": "x"}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        create_instance(&app).await;
        let (status, body) = send(&app, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["instance_counts"]["pending"], 1);
    }
}
