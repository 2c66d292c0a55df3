use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::workflow_instance::{NewInstance, WorkflowInstance};
use crate::domain::entity::workflow_log::{LogAction, WorkflowLog};
use crate::domain::repository::{WorkflowStore, WorkflowTransaction};
use crate::domain::service::{SignatureService, TaskDistributor};

/// SUBMIT ログは常に step_order 0 で記録される。
pub const SUBMIT_STEP_ORDER: i32 = 0;
pub const SUBMIT_STEP_NAME: &str = "Submit";

#[derive(Debug, Clone)]
pub struct InitiateWorkflowInput {
    pub definition_id: Uuid,
    /// 空の場合は定義の service_code を使う。
    pub service_code: String,
    pub doc_num: String,
    pub doc_type: String,
    pub creator_id: String,
    pub creator_name: String,
    pub factory_id: i64,
    pub department_id: i64,
    pub payload: serde_json::Value,
    pub comment: String,
    pub client_ip: Option<String>,
    pub device_info: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitiateWorkflowError {
    #[error("workflow definition not found: {0}")]
    DefinitionNotFound(Uuid),

    #[error("workflow definition has no steps: {0}")]
    DefinitionEmpty(Uuid),

    #[error("no assignee matches step {step_order} of definition {definition_id}")]
    RoutingConfiguration { definition_id: Uuid, step_order: i32 },

    #[error("internal error: {0}")]
    Internal(String),
}

/// InitiateWorkflowUseCase はワークフローインスタンスを開始する。
/// インスタンス・SUBMIT ログ・初回タスクは同一トランザクションで書き込まれる。
pub struct InitiateWorkflowUseCase {
    store: Arc<dyn WorkflowStore>,
    signer: Arc<SignatureService>,
    distributor: TaskDistributor,
}

impl InitiateWorkflowUseCase {
    pub fn new(store: Arc<dyn WorkflowStore>, signer: Arc<SignatureService>) -> Self {
        Self {
            store,
            signer,
            distributor: TaskDistributor::new(),
        }
    }

    /// 専用のトランザクションでインスタンスを開始する。
    pub async fn execute(
        &self,
        input: &InitiateWorkflowInput,
    ) -> Result<WorkflowInstance, InitiateWorkflowError> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| InitiateWorkflowError::Internal(e.to_string()))?;

        let instance = self.execute_in(tx.as_mut(), input).await?;

        tx.commit()
            .await
            .map_err(|e| InitiateWorkflowError::Internal(e.to_string()))?;

        tracing::info!(
            instance_id = %instance.id,
            doc_num = %instance.doc_num,
            current_step = instance.current_step,
            "workflow instance started"
        );
        Ok(instance)
    }

    /// 呼び出し側のトランザクション内でインスタンスを開始する。
    /// エラー時の巻き戻しは呼び出し側のトランザクション破棄に委ねる。
    pub async fn execute_in(
        &self,
        tx: &mut dyn WorkflowTransaction,
        input: &InitiateWorkflowInput,
    ) -> Result<WorkflowInstance, InitiateWorkflowError> {
        let definition = tx
            .find_definition(input.definition_id)
            .await
            .map_err(|e| InitiateWorkflowError::Internal(e.to_string()))?
            .ok_or(InitiateWorkflowError::DefinitionNotFound(input.definition_id))?;

        let first_step = definition
            .first_step()
            .ok_or(InitiateWorkflowError::DefinitionEmpty(definition.id))?;

        let service_code = if input.service_code.is_empty() {
            definition.service_code.clone()
        } else {
            input.service_code.clone()
        };

        let total_steps = i32::try_from(definition.step_count())
            .map_err(|e| InitiateWorkflowError::Internal(e.to_string()))?;

        let instance = WorkflowInstance::start(
            NewInstance {
                definition_id: definition.id,
                service_code,
                doc_num: input.doc_num.clone(),
                doc_type: input.doc_type.clone(),
                creator_id: input.creator_id.clone(),
                factory_id: input.factory_id,
                department_id: input.department_id,
                payload: input.payload.clone(),
            },
            first_step.order,
            total_steps,
        );

        tx.insert_instance(&instance)
            .await
            .map_err(|e| InitiateWorkflowError::Internal(e.to_string()))?;

        let signature = self.signer.sign(
            &input.creator_id,
            &instance.doc_num,
            LogAction::Submit,
            SUBMIT_STEP_ORDER,
            &instance.payload_bytes(),
        );
        let log = WorkflowLog {
            id: Uuid::new_v4(),
            instance_id: instance.id,
            step_order: SUBMIT_STEP_ORDER,
            step_name: SUBMIT_STEP_NAME.to_string(),
            action: LogAction::Submit,
            actor_id: input.creator_id.clone(),
            actor_name: input.creator_name.clone(),
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
            .map_err(|e| InitiateWorkflowError::Internal(e.to_string()))?;

        let tasks = self
            .distributor
            .distribute(tx, &instance, first_step)
            .await
            .map_err(|e| InitiateWorkflowError::Internal(e.to_string()))?;
        if tasks.is_empty() {
            return Err(InitiateWorkflowError::RoutingConfiguration {
                definition_id: definition.id,
                step_order: first_step.order,
            });
        }

        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::workflow_instance::InstanceStatus;
    use crate::domain::entity::workflow_step::{AssignmentKind, StepAssignment};
    use crate::test_support::{definition_with_steps, initiate_input, signature_service, InMemoryHarness};

    #[tokio::test]
    async fn creates_instance_submit_log_and_first_tasks() {
        let harness = InMemoryHarness::new();
        let def = definition_with_steps(&[(20, "bob"), (10, "alice")]);
        let def_id = def.id;
        harness.definitions.insert(def).await;

        let uc = InitiateWorkflowUseCase::new(harness.store.clone(), signature_service());
        let instance = uc.execute(&initiate_input(def_id, "D001")).await.unwrap();

        assert_eq!(instance.status, InstanceStatus::InProgress);
        assert_eq!(instance.current_step, 10);
        assert_eq!(instance.total_steps, 2);
        assert_eq!(instance.service_code, "WEITWPURI05");

        let tasks = harness.store_impl.find_tasks(instance.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].assigned_to, "alice");
        assert_eq!(tasks[0].step_order, 10);

        let logs = harness.store_impl.find_logs(instance.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::Submit);
        assert_eq!(logs[0].step_order, 0);
        assert_eq!(logs[0].step_name, "Submit");
        assert!(!logs[0].signature_hash.is_empty());
        assert!(!logs[0].data_snapshot_hash.is_empty());
    }

    #[tokio::test]
    async fn unknown_definition() {
        let harness = InMemoryHarness::new();
        let uc = InitiateWorkflowUseCase::new(harness.store.clone(), signature_service());
        let result = uc.execute(&initiate_input(Uuid::new_v4(), "D001")).await;
        assert!(matches!(result, Err(InitiateWorkflowError::DefinitionNotFound(_))));
    }

    #[tokio::test]
    async fn definition_without_steps() {
        let harness = InMemoryHarness::new();
        let def = definition_with_steps(&[]);
        let def_id = def.id;
        harness.definitions.insert(def).await;

        let uc = InitiateWorkflowUseCase::new(harness.store.clone(), signature_service());
        let result = uc.execute(&initiate_input(def_id, "D001")).await;
        assert!(matches!(result, Err(InitiateWorkflowError::DefinitionEmpty(id)) if id == def_id));
        assert_eq!(harness.store_impl.instance_count().await, 0);
    }

    #[tokio::test]
    async fn zero_routed_tasks_rolls_back_everything() {
        let harness = InMemoryHarness::new();
        let mut def = definition_with_steps(&[(10, "alice")]);
        // 工場 99 限定の割当はインスタンス（工場 1）に一致しない
        def.steps[0].assignments = vec![
            StepAssignment::new(def.steps[0].id, AssignmentKind::User, "alice").with_factory(99),
        ];
        let def_id = def.id;
        harness.definitions.insert(def).await;

        let uc = InitiateWorkflowUseCase::new(harness.store.clone(), signature_service());
        let result = uc.execute(&initiate_input(def_id, "D001")).await;

        assert!(matches!(
            result,
            Err(InitiateWorkflowError::RoutingConfiguration { step_order: 10, .. })
        ));
        assert_eq!(harness.store_impl.instance_count().await, 0);
        assert_eq!(harness.store_impl.task_count().await, 0);
        assert_eq!(harness.store_impl.log_count().await, 0);
    }
}
