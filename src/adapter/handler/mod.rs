pub mod approval_handler;
pub mod error;
pub mod soap_handler;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::usecase::{
    GetHistoryUseCase, GetPendingTasksUseCase, IngestDocumentUseCase, InitiateWorkflowUseCase,
    ProcessActionUseCase, VerifyHistoryUseCase,
};

/// ERP が呼び出す固定のエンドポイント。
pub const SOAP_ENDPOINT: &str = "/EFNETService/EFERPService.asmx";

/// AppState はアプリケーション全体の共有状態を表す。
#[derive(Clone)]
pub struct AppState {
    pub initiate_workflow_uc: Arc<InitiateWorkflowUseCase>,
    pub process_action_uc: Arc<ProcessActionUseCase>,
    pub get_pending_tasks_uc: Arc<GetPendingTasksUseCase>,
    pub get_history_uc: Arc<GetHistoryUseCase>,
    pub verify_history_uc: Arc<VerifyHistoryUseCase>,
    pub ingest_document_uc: Arc<IngestDocumentUseCase>,
}

/// REST / SOAP ルーターを構築する。
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health / Readiness
        .route("/healthz", get(approval_handler::healthz))
        .route("/readyz", get(approval_handler::readyz))
        // Approval endpoints
        .route(
            "/api/v1/instances",
            post(approval_handler::initiate_workflow),
        )
        .route(
            "/api/v1/instances/{instance_id}/actions",
            post(approval_handler::process_action),
        )
        .route(
            "/api/v1/instances/{instance_id}/history",
            get(approval_handler::get_history),
        )
        .route(
            "/api/v1/instances/{instance_id}/history/verify",
            get(approval_handler::verify_history),
        )
        .route("/api/v1/tasks", get(approval_handler::list_pending_tasks))
        // ERP SOAP endpoint
        .route(
            SOAP_ENDPOINT,
            post(soap_handler::invoke_service).get(soap_handler::wsdl),
        )
        .with_state(state)
}

/// ErrorResponse は統一エラーレスポンス。
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                request_id: uuid::Uuid::new_v4().to_string(),
                details: vec![],
            },
        }
    }
}
