use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entity::workflow_definition::WorkflowDefinition;
use crate::domain::repository::WorkflowDefinitionRepository;

/// InMemoryDefinitionRepository はインメモリのワークフロー定義リポジトリ。
/// DB 未設定時の開発モードとテストで使用する。
pub struct InMemoryDefinitionRepository {
    definitions: RwLock<Vec<WorkflowDefinition>>,
}

impl InMemoryDefinitionRepository {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(Vec::new()),
        }
    }

    /// 定義を登録する。同じ ID の定義は置き換える。
    pub async fn insert(&self, definition: WorkflowDefinition) {
        let mut definitions = self.definitions.write().await;
        definitions.retain(|d| d.id != definition.id);
        definitions.push(definition);
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<WorkflowDefinition> {
        let definitions = self.definitions.read().await;
        definitions.iter().find(|d| d.id == id).cloned()
    }

    async fn latest_active<F>(&self, pred: F) -> Option<WorkflowDefinition>
    where
        F: Fn(&WorkflowDefinition) -> bool,
    {
        let definitions = self.definitions.read().await;
        definitions
            .iter()
            .filter(|d| d.is_active && pred(d))
            .max_by_key(|d| d.version)
            .cloned()
    }
}

impl Default for InMemoryDefinitionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for InMemoryDefinitionRepository {
    async fn find_by_service_code(
        &self,
        service_code: &str,
    ) -> anyhow::Result<Option<WorkflowDefinition>> {
        Ok(self.latest_active(|d| d.service_code == service_code).await)
    }

    async fn find_by_operation_code(
        &self,
        operation_code: &str,
    ) -> anyhow::Result<Option<WorkflowDefinition>> {
        Ok(self.latest_active(|d| d.operation_code == operation_code).await)
    }
}
