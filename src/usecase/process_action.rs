use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::workflow_instance::WorkflowInstance;
use crate::domain::entity::workflow_log::{LogAction, WorkflowLog};
use crate::domain::repository::WorkflowStore;
use crate::domain::service::{PermissionResolver, SignatureService, TaskDistributor};

/// ApprovalAction はタスクに対して実行できる操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "APPROVE" => Ok(Self::Approve),
            "REJECT" => Ok(Self::Reject),
            _ => anyhow::bail!("invalid action: {}", s),
        }
    }
}

impl From<ApprovalAction> for LogAction {
    fn from(action: ApprovalAction) -> Self {
        match action {
            ApprovalAction::Approve => LogAction::Approve,
            ApprovalAction::Reject => LogAction::Reject,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessActionInput {
    pub instance_id: Uuid,
    pub actor_id: String,
    pub actor_name: String,
    pub action: ApprovalAction,
    pub comment: String,
    pub client_ip: Option<String>,
    pub device_info: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessActionOutput {
    pub instance: WorkflowInstance,
    pub log: WorkflowLog,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessActionError {
    #[error("workflow instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("workflow instance is not in progress: {0}")]
    NotInProgress(Uuid),

    #[error("no pending task on instance {instance_id} for actor {actor_id}")]
    PermissionDenied { instance_id: Uuid, actor_id: String },

    #[error("task of step {task_step} on instance {instance_id} is stale, instance is at step {current_step}")]
    TaskNotFound {
        instance_id: Uuid,
        task_step: i32,
        current_step: i32,
    },

    #[error("workflow definition not found: {0}")]
    DefinitionNotFound(Uuid),

    #[error("no assignee matches step {step_order} of instance {instance_id}")]
    RoutingConfiguration { instance_id: Uuid, step_order: i32 },

    #[error("internal error: {0}")]
    Internal(String),
}

/// ProcessActionUseCase は承認・却下を 1 トランザクションで処理する。
/// タスク消費・ログ書き込み・状態遷移はすべて確定するか、すべて破棄される。
pub struct ProcessActionUseCase {
    store: Arc<dyn WorkflowStore>,
    permissions: PermissionResolver,
    signer: Arc<SignatureService>,
    distributor: TaskDistributor,
}

impl ProcessActionUseCase {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        permissions: PermissionResolver,
        signer: Arc<SignatureService>,
    ) -> Self {
        Self {
            store,
            permissions,
            signer,
            distributor: TaskDistributor::new(),
        }
    }

    pub async fn execute(
        &self,
        input: &ProcessActionInput,
    ) -> Result<ProcessActionOutput, ProcessActionError> {
        let groups = self.permissions.group_codes(&input.actor_id).await;

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| ProcessActionError::Internal(e.to_string()))?;

        let mut instance = tx
            .lock_instance(input.instance_id)
            .await
            .map_err(|e| ProcessActionError::Internal(e.to_string()))?
            .ok_or(ProcessActionError::InstanceNotFound(input.instance_id))?;

        if !instance.is_in_progress() {
            return Err(ProcessActionError::NotInProgress(instance.id));
        }

        // 現在ステップのタスクだけが対象。前ステップの残りタスクでは処理できない
        let claimed = tx
            .claim_task(instance.id, instance.current_step, &input.actor_id, &groups)
            .await
            .map_err(|e| ProcessActionError::Internal(e.to_string()))?;
        let Some(task) = claimed else {
            let stale = tx
                .find_actor_task(instance.id, &input.actor_id, &groups)
                .await
                .map_err(|e| ProcessActionError::Internal(e.to_string()))?;
            return Err(match stale {
                Some(stale) => ProcessActionError::TaskNotFound {
                    instance_id: instance.id,
                    task_step: stale.step_order,
                    current_step: instance.current_step,
                },
                None => ProcessActionError::PermissionDenied {
                    instance_id: instance.id,
                    actor_id: input.actor_id.clone(),
                },
            });
        };

        tx.delete_task(task.id)
            .await
            .map_err(|e| ProcessActionError::Internal(e.to_string()))?;

        let action = LogAction::from(input.action);
        let signature = self.signer.sign(
            &input.actor_id,
            &instance.doc_num,
            action,
            task.step_order,
            &instance.payload_bytes(),
        );
        let log = WorkflowLog {
            id: Uuid::new_v4(),
            instance_id: instance.id,
            step_order: task.step_order,
            step_name: task.step_name.clone(),
            action,
            actor_id: input.actor_id.clone(),
            actor_name: input.actor_name.clone(),
            comment: input.comment.clone(),
            signature_hash: signature.signature_hash,
            data_snapshot_hash: signature.data_hash,
            signed_timestamp: signature.timestamp,
            ip_address: input.client_ip.clone(),
            device_info: input.device_info.clone(),
            created_at: chrono::Utc::now(),
        };
        tx.insert_log(&log)
            .await
            .map_err(|e| ProcessActionError::Internal(e.to_string()))?;

        match input.action {
            ApprovalAction::Reject => {
                let removed = tx
                    .delete_pending_tasks(instance.id)
                    .await
                    .map_err(|e| ProcessActionError::Internal(e.to_string()))?;
                instance.reject();
                tracing::debug!(instance_id = %instance.id, removed, "pending tasks cleared");
            }
            ApprovalAction::Approve => {
                let definition = tx
                    .find_definition(instance.definition_id)
                    .await
                    .map_err(|e| ProcessActionError::Internal(e.to_string()))?
                    .ok_or(ProcessActionError::DefinitionNotFound(instance.definition_id))?;

                match definition.next_step_after(instance.current_step) {
                    None => instance.approve(),
                    Some(next_step) => {
                        instance.advance_to(next_step.order);
                        let tasks = self
                            .distributor
                            .distribute(tx.as_mut(), &instance, next_step)
                            .await
                            .map_err(|e| ProcessActionError::Internal(e.to_string()))?;
                        if tasks.is_empty() {
                            return Err(ProcessActionError::RoutingConfiguration {
                                instance_id: instance.id,
                                step_order: next_step.order,
                            });
                        }
                    }
                }
            }
        }

        tx.update_instance(&instance)
            .await
            .map_err(|e| ProcessActionError::Internal(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| ProcessActionError::Internal(e.to_string()))?;

        tracing::info!(
            instance_id = %instance.id,
            actor_id = %input.actor_id,
            action = %action,
            status = %instance.status,
            current_step = instance.current_step,
            "workflow action processed"
        );

        Ok(ProcessActionOutput { instance, log })
    }
}
