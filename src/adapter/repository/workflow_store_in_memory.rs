use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::definition_in_memory::InMemoryDefinitionRepository;
use crate::domain::entity::document_request::DocumentRequest;
use crate::domain::entity::workflow_definition::WorkflowDefinition;
use crate::domain::entity::workflow_instance::WorkflowInstance;
use crate::domain::entity::workflow_log::WorkflowLog;
use crate::domain::entity::workflow_task::{PendingTask, WorkflowTask};
use crate::domain::repository::{WorkflowStore, WorkflowTransaction};

#[derive(Debug, Clone, Default)]
struct StoreState {
    instances: Vec<WorkflowInstance>,
    tasks: Vec<WorkflowTask>,
    logs: Vec<WorkflowLog>,
    requests: Vec<DocumentRequest>,
}

/// InMemoryWorkflowStore はインメモリの WorkflowStore 実装。
/// トランザクションは状態全体のロックを保持し、作業コピーを commit 時に書き戻す。
pub struct InMemoryWorkflowStore {
    state: Arc<Mutex<StoreState>>,
    definitions: Arc<InMemoryDefinitionRepository>,
}

impl InMemoryWorkflowStore {
    pub fn new(definitions: Arc<InMemoryDefinitionRepository>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            definitions,
        }
    }

    pub async fn instance_count(&self) -> usize {
        self.state.lock().await.instances.len()
    }

    pub async fn log_count(&self) -> usize {
        self.state.lock().await.logs.len()
    }

    pub async fn request_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }

    pub async fn task_count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub async fn instances(&self) -> Vec<WorkflowInstance> {
        self.state.lock().await.instances.clone()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn WorkflowTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            definitions: self.definitions.clone(),
        }))
    }

    async fn find_pending_tasks(
        &self,
        user_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Vec<PendingTask>> {
        let state = self.state.lock().await;
        let mut result: Vec<PendingTask> = state
            .tasks
            .iter()
            .filter(|t| t.is_actionable_by(user_id, groups))
            .filter_map(|t| {
                state
                    .instances
                    .iter()
                    .find(|i| i.id == t.instance_id)
                    .filter(|i| i.is_in_progress() && i.current_step == t.step_order)
                    .map(|i| PendingTask::new(t.clone(), i))
            })
            .collect();
        result.sort_by(|a, b| b.task.created_at.cmp(&a.task.created_at));
        Ok(result)
    }

    async fn find_logs(&self, instance_id: Uuid) -> anyhow::Result<Vec<WorkflowLog>> {
        let state = self.state.lock().await;
        let mut logs: Vec<WorkflowLog> = state
            .logs
            .iter()
            .filter(|l| l.instance_id == instance_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.step_order);
        Ok(logs)
    }

    async fn find_instance(&self, id: Uuid) -> anyhow::Result<Option<WorkflowInstance>> {
        let state = self.state.lock().await;
        Ok(state.instances.iter().find(|i| i.id == id).cloned())
    }

    async fn find_tasks(&self, instance_id: Uuid) -> anyhow::Result<Vec<WorkflowTask>> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn find_request(
        &self,
        doc_type: &str,
        doc_num: &str,
    ) -> anyhow::Result<Option<DocumentRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .requests
            .iter()
            .find(|r| r.doc_type == doc_type && r.doc_num == doc_num)
            .cloned())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
    definitions: Arc<InMemoryDefinitionRepository>,
}

#[async_trait]
impl WorkflowTransaction for InMemoryTransaction {
    async fn find_definition(&mut self, id: Uuid) -> anyhow::Result<Option<WorkflowDefinition>> {
        Ok(self.definitions.find_by_id(id).await)
    }

    async fn insert_instance(&mut self, instance: &WorkflowInstance) -> anyhow::Result<()> {
        self.working.instances.push(instance.clone());
        Ok(())
    }

    async fn lock_instance(&mut self, id: Uuid) -> anyhow::Result<Option<WorkflowInstance>> {
        Ok(self.working.instances.iter().find(|i| i.id == id).cloned())
    }

    async fn update_instance(&mut self, instance: &WorkflowInstance) -> anyhow::Result<()> {
        let slot = self
            .working
            .instances
            .iter_mut()
            .find(|i| i.id == instance.id)
            .ok_or_else(|| anyhow::anyhow!("instance not found: {}", instance.id))?;
        *slot = instance.clone();
        Ok(())
    }

    async fn insert_task(&mut self, task: &WorkflowTask) -> anyhow::Result<()> {
        self.working.tasks.push(task.clone());
        Ok(())
    }

    async fn claim_task(
        &mut self,
        instance_id: Uuid,
        step_order: i32,
        actor_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Option<WorkflowTask>> {
        Ok(self
            .working
            .tasks
            .iter()
            .filter(|t| t.instance_id == instance_id && t.step_order == step_order)
            .find(|t| t.is_actionable_by(actor_id, groups))
            .cloned())
    }

    async fn find_actor_task(
        &mut self,
        instance_id: Uuid,
        actor_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Option<WorkflowTask>> {
        Ok(self
            .working
            .tasks
            .iter()
            .filter(|t| t.instance_id == instance_id)
            .find(|t| t.is_actionable_by(actor_id, groups))
            .cloned())
    }

    async fn delete_task(&mut self, task_id: Uuid) -> anyhow::Result<()> {
        self.working.tasks.retain(|t| t.id != task_id);
        Ok(())
    }

    async fn delete_pending_tasks(&mut self, instance_id: Uuid) -> anyhow::Result<u64> {
        let before = self.working.tasks.len();
        self.working.tasks.retain(|t| t.instance_id != instance_id);
        Ok((before - self.working.tasks.len()) as u64)
    }

    async fn insert_log(&mut self, log: &WorkflowLog) -> anyhow::Result<()> {
        self.working.logs.push(log.clone());
        Ok(())
    }

    async fn lock_or_create_request(
        &mut self,
        draft: &DocumentRequest,
    ) -> anyhow::Result<DocumentRequest> {
        if let Some(existing) = self
            .working
            .requests
            .iter()
            .find(|r| r.doc_type == draft.doc_type && r.doc_num == draft.doc_num)
        {
            return Ok(existing.clone());
        }
        self.working.requests.push(draft.clone());
        Ok(draft.clone())
    }

    async fn link_request(&mut self, request_id: Uuid, instance_id: Uuid) -> anyhow::Result<()> {
        let request = self
            .working
            .requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or_else(|| anyhow::anyhow!("request not found: {}", request_id))?;
        request.link(instance_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::workflow_instance::NewInstance;

    fn store() -> InMemoryWorkflowStore {
        InMemoryWorkflowStore::new(Arc::new(InMemoryDefinitionRepository::new()))
    }

    fn instance() -> WorkflowInstance {
        WorkflowInstance::start(
            NewInstance {
                definition_id: Uuid::new_v4(),
                service_code: "SVC".to_string(),
                doc_num: "D1".to_string(),
                doc_type: "T1".to_string(),
                creator_id: "creator".to_string(),
                factory_id: 1,
                department_id: 1,
                payload: serde_json::Value::Null,
            },
            10,
            1,
        )
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let store = store();
        let inst = instance();
        let mut tx = store.begin().await.unwrap();
        tx.insert_instance(&inst).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.find_instance(inst.id).await.unwrap(), Some(inst));
    }

    #[tokio::test]
    async fn drop_discards_writes() {
        let store = store();
        let inst = instance();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_instance(&inst).await.unwrap();
        }
        assert!(store.find_instance(inst.id).await.unwrap().is_none());
        assert_eq!(store.instance_count().await, 0);
    }

    #[tokio::test]
    async fn lock_or_create_request_returns_existing() {
        let store = store();
        let draft = DocumentRequest::draft("s", "c", "o", "T1", "D1", "u", serde_json::Value::Null);
        let mut tx = store.begin().await.unwrap();
        let first = tx.lock_or_create_request(&draft).await.unwrap();
        tx.link_request(first.id, Uuid::new_v4()).await.unwrap();
        tx.commit().await.unwrap();

        let other = DocumentRequest::draft("s", "c", "o", "T1", "D1", "u", serde_json::Value::Null);
        let mut tx = store.begin().await.unwrap();
        let found = tx.lock_or_create_request(&other).await.unwrap();
        assert_eq!(found.id, first.id);
        assert!(found.is_linked());
        drop(tx);
        assert_eq!(store.request_count().await, 1);
    }
}
