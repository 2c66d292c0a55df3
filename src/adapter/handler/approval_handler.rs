use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ApprovalError;
use super::AppState;
use crate::domain::entity::workflow_instance::WorkflowInstance;
use crate::domain::entity::workflow_log::WorkflowLog;
use crate::domain::entity::workflow_task::PendingTask;
use crate::usecase::{ApprovalAction, InitiateWorkflowInput, LogVerification, ProcessActionInput};

const USER_ID_HEADER: &str = "x-user-id";
const USER_NAME_HEADER: &str = "x-user-name";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

// --- Request / Response DTOs ---

#[derive(Debug, Deserialize)]
pub struct InitiateWorkflowRequest {
    pub definition_id: String,
    #[serde(default)]
    pub service_code: String,
    pub doc_num: String,
    #[serde(default)]
    pub doc_type: String,
    pub factory_id: i64,
    pub department_id: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessActionRequest {
    pub action: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub instance_id: String,
    pub definition_id: String,
    pub service_code: String,
    pub doc_num: String,
    pub doc_type: String,
    pub creator_id: String,
    pub factory_id: i64,
    pub department_id: i64,
    pub current_step: i32,
    pub total_steps: i32,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl From<WorkflowInstance> for InstanceResponse {
    fn from(i: WorkflowInstance) -> Self {
        Self {
            instance_id: i.id.to_string(),
            definition_id: i.definition_id.to_string(),
            service_code: i.service_code,
            doc_num: i.doc_num,
            doc_type: i.doc_type,
            creator_id: i.creator_id,
            factory_id: i.factory_id,
            department_id: i.department_id,
            current_step: i.current_step,
            total_steps: i.total_steps,
            status: i.status.to_string(),
            started_at: i.started_at.to_rfc3339(),
            completed_at: i.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub id: String,
    pub step_order: i32,
    pub step_name: String,
    pub action: String,
    pub actor_id: String,
    pub actor_name: String,
    pub comment: String,
    pub signature_hash: String,
    pub data_snapshot_hash: String,
    pub signed_timestamp: i64,
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
    pub created_at: String,
}

impl From<WorkflowLog> for LogResponse {
    fn from(l: WorkflowLog) -> Self {
        Self {
            id: l.id.to_string(),
            step_order: l.step_order,
            step_name: l.step_name,
            action: l.action.to_string(),
            actor_id: l.actor_id,
            actor_name: l.actor_name,
            comment: l.comment,
            signature_hash: l.signature_hash,
            data_snapshot_hash: l.data_snapshot_hash,
            signed_timestamp: l.signed_timestamp,
            ip_address: l.ip_address,
            device_info: l.device_info,
            created_at: l.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessActionResponse {
    pub instance: InstanceResponse,
    pub log: LogResponse,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub instance_id: String,
    pub logs: Vec<LogResponse>,
}

#[derive(Debug, Serialize)]
pub struct LogVerificationResponse {
    pub log: LogResponse,
    pub signature_valid: bool,
    pub data_hash_valid: bool,
}

impl From<LogVerification> for LogVerificationResponse {
    fn from(v: LogVerification) -> Self {
        Self {
            log: v.log.into(),
            signature_valid: v.signature_valid,
            data_hash_valid: v.data_hash_valid,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyHistoryResponse {
    pub instance_id: String,
    pub all_valid: bool,
    pub logs: Vec<LogVerificationResponse>,
}

#[derive(Debug, Serialize)]
pub struct PendingTaskResponse {
    pub task_id: String,
    pub instance_id: String,
    pub step_order: i32,
    pub step_name: String,
    pub assigned_to: String,
    pub is_group: bool,
    pub due_at: Option<String>,
    pub created_at: String,
    pub service_code: String,
    pub doc_num: String,
    pub doc_type: String,
    pub creator_id: String,
    pub instance_status: String,
    pub total_steps: i32,
}

impl From<PendingTask> for PendingTaskResponse {
    fn from(p: PendingTask) -> Self {
        Self {
            task_id: p.task.id.to_string(),
            instance_id: p.task.instance_id.to_string(),
            step_order: p.task.step_order,
            step_name: p.task.step_name,
            assigned_to: p.task.assigned_to,
            is_group: p.task.is_group,
            due_at: p.task.due_at.map(|t| t.to_rfc3339()),
            created_at: p.task.created_at.to_rfc3339(),
            service_code: p.service_code,
            doc_num: p.doc_num,
            doc_type: p.doc_type,
            creator_id: p.creator_id,
            instance_status: p.instance_status.to_string(),
            total_steps: p.total_steps,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListPendingTasksResponse {
    pub tasks: Vec<PendingTaskResponse>,
}

/// Actor はリクエストヘッダーから取り出した操作者情報。
struct Actor {
    id: String,
    name: String,
    client_ip: Option<String>,
    device_info: Option<String>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApprovalError> {
    let id = header_value(headers, USER_ID_HEADER)
        .ok_or_else(|| ApprovalError::Unauthorized(format!("{USER_ID_HEADER} header is required")))?;
    let name = header_value(headers, USER_NAME_HEADER).unwrap_or_else(|| id.clone());
    let client_ip = header_value(headers, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()));
    let device_info = header_value(headers, axum::http::header::USER_AGENT.as_str());
    Ok(Actor {
        id,
        name,
        client_ip,
        device_info,
    })
}

fn parse_instance_id(raw: &str) -> Result<Uuid, ApprovalError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApprovalError::Validation(format!("invalid instance_id: {}", raw)))
}

// --- Handlers ---

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz() -> &'static str {
    "ok"
}

pub async fn initiate_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitiateWorkflowRequest>,
) -> Result<(StatusCode, Json<InstanceResponse>), ApprovalError> {
    let actor = actor_from_headers(&headers)?;
    let definition_id = Uuid::parse_str(&req.definition_id).map_err(|_| {
        ApprovalError::Validation(format!("invalid definition_id: {}", req.definition_id))
    })?;
    if req.doc_num.trim().is_empty() {
        return Err(ApprovalError::Validation("doc_num is required".to_string()));
    }

    let input = InitiateWorkflowInput {
        definition_id,
        service_code: req.service_code,
        doc_num: req.doc_num,
        doc_type: req.doc_type,
        creator_id: actor.id,
        creator_name: actor.name,
        factory_id: req.factory_id,
        department_id: req.department_id,
        payload: req.payload,
        comment: req.comment,
        client_ip: actor.client_ip,
        device_info: actor.device_info,
    };
    let instance = state.initiate_workflow_uc.execute(&input).await?;

    Ok((StatusCode::CREATED, Json(instance.into())))
}

pub async fn process_action(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ProcessActionRequest>,
) -> Result<Json<ProcessActionResponse>, ApprovalError> {
    let actor = actor_from_headers(&headers)?;
    let instance_id = parse_instance_id(&instance_id)?;
    let action = ApprovalAction::from_str_value(&req.action)
        .map_err(|e| ApprovalError::Validation(e.to_string()))?;

    let input = ProcessActionInput {
        instance_id,
        actor_id: actor.id,
        actor_name: actor.name,
        action,
        comment: req.comment,
        client_ip: actor.client_ip,
        device_info: actor.device_info,
    };
    let output = state.process_action_uc.execute(&input).await?;

    Ok(Json(ProcessActionResponse {
        instance: output.instance.into(),
        log: output.log.into(),
    }))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<HistoryResponse>, ApprovalError> {
    actor_from_headers(&headers)?;
    let id = parse_instance_id(&instance_id)?;

    let logs = state
        .get_history_uc
        .execute(id)
        .await
        .map_err(|e| ApprovalError::Internal(e.to_string()))?
        .ok_or_else(|| ApprovalError::NotFound(format!("workflow instance not found: {}", id)))?;

    Ok(Json(HistoryResponse {
        instance_id: id.to_string(),
        logs: logs.into_iter().map(Into::into).collect(),
    }))
}

pub async fn verify_history(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<VerifyHistoryResponse>, ApprovalError> {
    actor_from_headers(&headers)?;
    let id = parse_instance_id(&instance_id)?;

    let results = state
        .verify_history_uc
        .execute(id)
        .await
        .map_err(|e| ApprovalError::Internal(e.to_string()))?
        .ok_or_else(|| ApprovalError::NotFound(format!("workflow instance not found: {}", id)))?;

    let all_valid = results
        .iter()
        .all(|r| r.signature_valid && r.data_hash_valid);
    Ok(Json(VerifyHistoryResponse {
        instance_id: id.to_string(),
        all_valid,
        logs: results.into_iter().map(Into::into).collect(),
    }))
}

pub async fn list_pending_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListPendingTasksResponse>, ApprovalError> {
    let actor = actor_from_headers(&headers)?;

    let tasks = state
        .get_pending_tasks_uc
        .execute(&actor.id)
        .await
        .map_err(|e| ApprovalError::Internal(e.to_string()))?;

    Ok(Json(ListPendingTasksResponse {
        tasks: tasks.into_iter().map(Into::into).collect(),
    }))
}
