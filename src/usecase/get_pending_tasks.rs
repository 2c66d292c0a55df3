use std::sync::Arc;

use crate::domain::entity::workflow_task::PendingTask;
use crate::domain::repository::WorkflowStore;
use crate::domain::service::PermissionResolver;

/// GetPendingTasksUseCase はユーザーが処理できる保留タスクを取得する。
pub struct GetPendingTasksUseCase {
    store: Arc<dyn WorkflowStore>,
    permissions: PermissionResolver,
}

impl GetPendingTasksUseCase {
    pub fn new(store: Arc<dyn WorkflowStore>, permissions: PermissionResolver) -> Self {
        Self { store, permissions }
    }

    /// 直接割当とグループ割当のタスクを新しい順に返す。
    pub async fn execute(&self, user_id: &str) -> anyhow::Result<Vec<PendingTask>> {
        let groups = self.permissions.group_codes(user_id).await;
        self.store.find_pending_tasks(user_id, &groups).await
    }
}
