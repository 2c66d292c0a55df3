use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::workflow_log::WorkflowLog;
use crate::domain::repository::WorkflowStore;

/// GetHistoryUseCase はインスタンスの監査ログを取得する。
pub struct GetHistoryUseCase {
    store: Arc<dyn WorkflowStore>,
}

impl GetHistoryUseCase {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// ログを step_order 昇順で返す。インスタンスが存在しない場合は None。
    pub async fn execute(&self, instance_id: Uuid) -> anyhow::Result<Option<Vec<WorkflowLog>>> {
        if self.store.find_instance(instance_id).await?.is_none() {
            return Ok(None);
        }
        let logs = self.store.find_logs(instance_id).await?;
        Ok(Some(logs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::workflow_log::LogAction;
    use crate::domain::service::PermissionResolver;
    use crate::test_support::{definition_with_steps, initiate_input, signature_service, InMemoryHarness};
    use crate::usecase::initiate_workflow::InitiateWorkflowUseCase;
    use crate::usecase::process_action::{ApprovalAction, ProcessActionInput, ProcessActionUseCase};

    #[tokio::test]
    async fn history_is_ordered_by_step() {
        let harness = InMemoryHarness::new();
        let def = definition_with_steps(&[(10, "alice"), (20, "bob")]);
        let def_id = def.id;
        harness.definitions.insert(def).await;
        let instance = InitiateWorkflowUseCase::new(harness.store.clone(), signature_service())
            .execute(&initiate_input(def_id, "D001"))
            .await
            .unwrap();
        ProcessActionUseCase::new(
            harness.store.clone(),
            PermissionResolver::new(harness.organization.clone()),
            signature_service(),
        )
        .execute(&ProcessActionInput {
            instance_id: instance.id,
            actor_id: "alice".to_string(),
            actor_name: "Alice".to_string(),
            action: ApprovalAction::Approve,
            comment: String::new(),
            client_ip: Some("10.0.0.1".to_string()),
            device_info: None,
        })
        .await
        .unwrap();

        let logs = GetHistoryUseCase::new(harness.store.clone())
            .execute(instance.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, LogAction::Submit);
        assert_eq!(logs[1].action, LogAction::Approve);
        assert_eq!(logs[1].actor_name, "Alice");
        assert_eq!(logs[1].ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn unknown_instance_is_none() {
        let harness = InMemoryHarness::new();
        let result = GetHistoryUseCase::new(harness.store.clone())
            .execute(Uuid::new_v4())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
