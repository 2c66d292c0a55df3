use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::ErrorResponse;
use crate::usecase::{InitiateWorkflowError, ProcessActionError};

/// ApprovalError は承認 API のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("stale task: {0}")]
    StaleTask(String),

    #[error("routing configuration error: {0}")]
    Routing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApprovalError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApprovalError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "SYS_APPROVAL_NOT_FOUND", msg.as_str())
            }
            ApprovalError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "SYS_APPROVAL_VALIDATION_ERROR",
                msg.as_str(),
            ),
            ApprovalError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                "SYS_APPROVAL_UNAUTHORIZED",
                msg.as_str(),
            ),
            ApprovalError::PermissionDenied(msg) => (
                StatusCode::FORBIDDEN,
                "SYS_APPROVAL_PERMISSION_DENIED",
                msg.as_str(),
            ),
            ApprovalError::Conflict(msg) => {
                (StatusCode::CONFLICT, "SYS_APPROVAL_NOT_IN_PROGRESS", msg.as_str())
            }
            ApprovalError::StaleTask(msg) => {
                (StatusCode::CONFLICT, "SYS_APPROVAL_TASK_NOT_FOUND", msg.as_str())
            }
            ApprovalError::Routing(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "SYS_APPROVAL_ROUTING_ERROR",
                msg.as_str(),
            ),
            ApprovalError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SYS_APPROVAL_INTERNAL_ERROR",
                msg.as_str(),
            ),
        };

        let body = ErrorResponse::new(code, message);
        (status, Json(body)).into_response()
    }
}

impl From<InitiateWorkflowError> for ApprovalError {
    fn from(e: InitiateWorkflowError) -> Self {
        match e {
            InitiateWorkflowError::DefinitionNotFound(_) => ApprovalError::NotFound(e.to_string()),
            InitiateWorkflowError::DefinitionEmpty(_)
            | InitiateWorkflowError::RoutingConfiguration { .. } => {
                ApprovalError::Routing(e.to_string())
            }
            InitiateWorkflowError::Internal(_) => ApprovalError::Internal(e.to_string()),
        }
    }
}

impl From<ProcessActionError> for ApprovalError {
    fn from(e: ProcessActionError) -> Self {
        match e {
            ProcessActionError::InstanceNotFound(_) => ApprovalError::NotFound(e.to_string()),
            ProcessActionError::NotInProgress(_) => ApprovalError::Conflict(e.to_string()),
            ProcessActionError::TaskNotFound { .. } => ApprovalError::StaleTask(e.to_string()),
            ProcessActionError::PermissionDenied { .. } => {
                ApprovalError::PermissionDenied(e.to_string())
            }
            ProcessActionError::RoutingConfiguration { .. } => {
                ApprovalError::Routing(e.to_string())
            }
            ProcessActionError::DefinitionNotFound(_) | ProcessActionError::Internal(_) => {
                ApprovalError::Internal(e.to_string())
            }
        }
    }
}
