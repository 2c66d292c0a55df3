//! REST / SOAP API 統合テスト（インメモリリポジトリ使用）
//!
//! tower::ServiceExt + oneshot で Router を直接駆動する。

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::sync::mpsc;
use tower::ServiceExt;

use k1s0_approval_server::adapter::handler::{self, SOAP_ENDPOINT};
use k1s0_approval_server::domain::entity::workflow_step::{AssignmentKind, StepAssignment};
use k1s0_approval_server::domain::repository::WorkflowStore;
use k1s0_approval_server::infrastructure::acknowledgement::AcknowledgementJob;
use k1s0_approval_server::infrastructure::definition_loader::DefinitionLoader;
use k1s0_approval_server::test_support::{
    definition_with_steps, erp_envelope, make_test_app_state, InMemoryHarness,
};

struct TestApp {
    router: Router,
    harness: InMemoryHarness,
    acks: mpsc::Receiver<AcknowledgementJob>,
}

fn make_app() -> TestApp {
    let harness = InMemoryHarness::new();
    let (state, acks) = make_test_app_state(&harness);
    TestApp {
        router: handler::router(state),
        harness,
        acks,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn get_as(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user)
        .body(Body::empty())
        .unwrap()
}

fn post_json_as(uri: &str, user: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .header("x-user-name", format!("{user} san"))
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn action(instance_id: &str, user: &str, action: &str) -> Request<Body> {
    post_json_as(
        &format!("/api/v1/instances/{instance_id}/actions"),
        user,
        serde_json::json!({ "action": action, "comment": "checked" }),
    )
}

async fn start_instance(app: &TestApp, steps: &[(i32, &str)]) -> String {
    let def = definition_with_steps(steps);
    let def_id = def.id;
    app.harness.definitions.insert(def).await;

    let (status, json) = send(
        &app.router,
        post_json_as(
            "/api/v1/instances",
            "creator",
            serde_json::json!({
                "definition_id": def_id.to_string(),
                "doc_num": "PR-0001",
                "doc_type": "3101",
                "factory_id": 1,
                "department_id": 1,
                "payload": { "amount": 5000 },
                "comment": "new purchase"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["instance_id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Health / Readiness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_healthz_and_readyz() {
    let app = make_app();
    for uri in ["/healthz", "/readyz"] {
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// ---------------------------------------------------------------------------
// Approval flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_step_approval_flow() {
    let app = make_app();
    let instance_id = start_instance(&app, &[(10, "alice"), (20, "bob")]).await;

    let (status, json) = send(&app.router, get_as("/api/v1/tasks", "alice")).await;
    assert_eq!(status, StatusCode::OK);
    let tasks = json["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["instance_id"], instance_id.as_str());
    assert_eq!(tasks[0]["step_order"], 10);
    assert_eq!(tasks[0]["doc_num"], "PR-0001");

    // bob のタスクはまだ無い
    let (status, json) = send(&app.router, action(&instance_id, "bob", "APPROVE")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "SYS_APPROVAL_PERMISSION_DENIED");

    let (status, json) = send(&app.router, action(&instance_id, "alice", "APPROVE")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["instance"]["status"], "IN_PROGRESS");
    assert_eq!(json["instance"]["current_step"], 20);
    assert_eq!(json["log"]["actor_name"], "alice san");

    let (status, json) = send(&app.router, action(&instance_id, "bob", "APPROVE")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["instance"]["status"], "APPROVED");
    assert!(json["instance"]["completed_at"].is_string());

    let (status, json) = send(
        &app.router,
        get_as(&format!("/api/v1/instances/{instance_id}/history"), "auditor"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = json["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["SUBMIT", "APPROVE", "APPROVE"]);

    let (status, json) = send(
        &app.router,
        get_as(&format!("/api/v1/instances/{instance_id}/history/verify"), "auditor"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["all_valid"], true);
    assert_eq!(json["logs"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_reject_then_terminal_conflict() {
    let app = make_app();
    let instance_id = start_instance(&app, &[(10, "alice"), (20, "bob")]).await;

    let (status, json) = send(&app.router, action(&instance_id, "alice", "REJECT")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["instance"]["status"], "REJECTED");

    let (status, json) = send(&app.router, action(&instance_id, "alice", "APPROVE")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "SYS_APPROVAL_NOT_IN_PROGRESS");

    let (_, json) = send(&app.router, get_as("/api/v1/tasks", "bob")).await;
    assert!(json["tasks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_group_member_can_act_on_group_task() {
    let app = make_app();
    let mut def = definition_with_steps(&[(10, "alice")]);
    let step_id = def.steps[0].id;
    def.steps[0].assignments = vec![StepAssignment::new(step_id, AssignmentKind::Group, "ACC")];
    let def_id = def.id;
    app.harness.definitions.insert(def).await;
    app.harness.organization.add_membership("erin", "ACC").await;

    let (status, json) = send(
        &app.router,
        post_json_as(
            "/api/v1/instances",
            "creator",
            serde_json::json!({
                "definition_id": def_id.to_string(),
                "doc_num": "PR-0002",
                "factory_id": 1,
                "department_id": 1
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let instance_id = json["instance_id"].as_str().unwrap().to_string();

    let (_, json) = send(&app.router, get_as("/api/v1/tasks", "erin")).await;
    assert_eq!(json["tasks"][0]["is_group"], true);

    let (status, _) = send(&app.router, action(&instance_id, "alice", "APPROVE")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(&app.router, action(&instance_id, "erin", "APPROVE")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["instance"]["status"], "APPROVED");
}

#[tokio::test]
async fn test_sibling_task_after_step_advance_is_conflict() {
    let app = make_app();
    let mut def = definition_with_steps(&[(10, "alice"), (20, "dave")]);
    let step_id = def.steps[0].id;
    def.steps[0]
        .assignments
        .push(StepAssignment::new(step_id, AssignmentKind::User, "bob"));
    let def_id = def.id;
    app.harness.definitions.insert(def).await;

    let (status, json) = send(
        &app.router,
        post_json_as(
            "/api/v1/instances",
            "creator",
            serde_json::json!({
                "definition_id": def_id.to_string(),
                "doc_num": "PR-0003",
                "factory_id": 1,
                "department_id": 1
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let instance_id = json["instance_id"].as_str().unwrap().to_string();

    let (status, _) = send(&app.router, action(&instance_id, "alice", "APPROVE")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&app.router, get_as("/api/v1/tasks", "bob")).await;
    assert!(json["tasks"].as_array().unwrap().is_empty());

    let (status, json) = send(&app.router, action(&instance_id, "bob", "APPROVE")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "SYS_APPROVAL_TASK_NOT_FOUND");

    // 無関係のユーザーは従来どおり権限エラー
    let (status, json) = send(&app.router, action(&instance_id, "mallory", "APPROVE")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "SYS_APPROVAL_PERMISSION_DENIED");
}

// ---------------------------------------------------------------------------
// Validation / errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = make_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/tasks")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let app = make_app();
    let instance_id = start_instance(&app, &[(10, "alice")]).await;

    let (status, json) = send(&app.router, action(&instance_id, "alice", "approve")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "SYS_APPROVAL_VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_and_invalid_instance_ids() {
    let app = make_app();

    let unknown = uuid::Uuid::new_v4();
    let (status, _) = send(&app.router, action(&unknown.to_string(), "alice", "APPROVE")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        get_as(&format!("/api/v1/instances/{unknown}/history"), "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        get_as("/api/v1/instances/not-a-uuid/history", "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_initiate_with_unknown_definition_is_not_found() {
    let app = make_app();
    let (status, json) = send(
        &app.router,
        post_json_as(
            "/api/v1/instances",
            "creator",
            serde_json::json!({
                "definition_id": uuid::Uuid::new_v4().to_string(),
                "doc_num": "PR-0003",
                "factory_id": 1,
                "department_id": 1
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "SYS_APPROVAL_NOT_FOUND");
}

#[tokio::test]
async fn test_unroutable_definition_is_unprocessable() {
    let app = make_app();
    let mut def = definition_with_steps(&[(10, "alice")]);
    def.steps[0].assignments[0].factory_id = Some(42);
    let def_id = def.id;
    app.harness.definitions.insert(def).await;

    let (status, json) = send(
        &app.router,
        post_json_as(
            "/api/v1/instances",
            "creator",
            serde_json::json!({
                "definition_id": def_id.to_string(),
                "doc_num": "PR-0004",
                "factory_id": 1,
                "department_id": 1
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "SYS_APPROVAL_ROUTING_ERROR");
    assert_eq!(app.harness.store_impl.instance_count().await, 0);
}

// ---------------------------------------------------------------------------
// ERP SOAP endpoint
// ---------------------------------------------------------------------------

fn soap_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(SOAP_ENDPOINT)
        .header("content-type", "text/xml; charset=utf-8")
        .body(Body::from(body))
        .unwrap()
}

async fn soap_text(router: &Router, body: String) -> (StatusCode, String, String) {
    let response = router.clone().oneshot(soap_request(body)).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_soap_ingest_is_idempotent() {
    let mut app = make_app();
    app.harness
        .definitions
        .insert(definition_with_steps(&[(10, "1")]))
        .await;
    let envelope = erp_envelope("PURI05", "WEITWPURI05", "E0001", "3101", "20240101");

    for _ in 0..2 {
        let (status, content_type, body) = soap_text(&app.router, envelope.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/xml"));
        assert!(body.contains("<InvokeSrvResult>Success</InvokeSrvResult>"));
    }

    assert_eq!(app.harness.store_impl.instance_count().await, 1);
    let request = app
        .harness
        .store_impl
        .find_request("3101", "20240101")
        .await
        .unwrap()
        .unwrap();
    let instance_id = request.workflow_instance_id.unwrap();
    let logs = app.harness.store_impl.find_logs(instance_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].actor_name, "System Creator");

    let first = app.acks.recv().await.unwrap();
    let second = app.acks.recv().await.unwrap();
    assert_eq!(first.composite_key(), "3101||20240101");
    assert!(first.mirror_business_record);
    assert!(!second.mirror_business_record);

    // 代替ユーザー "1" に割り当てられたタスクが見える
    let (_, json) = send(&app.router, get_as("/api/v1/tasks", "1")).await;
    assert_eq!(json["tasks"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_soap_ingest_with_definitions_from_config_dir() {
    let app = make_app();
    let definitions = DefinitionLoader::new("config/definitions")
        .load_all()
        .await
        .unwrap();
    assert!(!definitions.is_empty());
    for def in definitions {
        app.harness.definitions.insert(def).await;
    }

    let envelope = erp_envelope("PURI05", "WEITWPURI05", "E0001", "3101", "20240102");
    let (status, _, body) = soap_text(&app.router, envelope).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<InvokeSrvResult>Success</InvokeSrvResult>"));
    assert_eq!(app.harness.store_impl.instance_count().await, 1);

    let (_, json) = send(&app.router, get_as("/api/v1/tasks", "1")).await;
    let tasks = json["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["doc_num"], "20240102");
}

#[tokio::test]
async fn test_soap_always_answers_success() {
    let mut app = make_app();

    // 解析できないエンベロープ
    let (status, _, body) = soap_text(&app.router, "<not-soap".to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Success"));

    // 定義が無い伝票
    let envelope = erp_envelope("PURI05", "WEITWPURI05", "E0001", "3101", "20240102");
    let (status, _, body) = soap_text(&app.router, envelope).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Success"));

    assert_eq!(app.harness.store_impl.instance_count().await, 0);
    assert_eq!(app.harness.store_impl.request_count().await, 0);
    assert!(app.acks.try_recv().is_err());
}

#[tokio::test]
async fn test_wsdl_is_served() {
    let app = make_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(SOAP_ENDPOINT)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("EFERPService"));
    assert!(body.contains("/EFNETService/EFERPService.asmx"));
}
