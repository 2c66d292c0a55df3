use async_trait::async_trait;

use crate::domain::entity::workflow_definition::WorkflowDefinition;

/// WorkflowDefinitionRepository は有効な最新バージョンのワークフロー定義を参照する。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    async fn find_by_service_code(
        &self,
        service_code: &str,
    ) -> anyhow::Result<Option<WorkflowDefinition>>;

    async fn find_by_operation_code(
        &self,
        operation_code: &str,
    ) -> anyhow::Result<Option<WorkflowDefinition>>;
}
