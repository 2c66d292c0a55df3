use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entity::document_request::DocumentRequest;
use crate::domain::entity::workflow_definition::WorkflowDefinition;
use crate::domain::entity::workflow_instance::WorkflowInstance;
use crate::domain::entity::workflow_log::WorkflowLog;
use crate::domain::entity::workflow_task::{PendingTask, WorkflowTask};

/// WorkflowStore はインスタンス・タスク・ログ・ステージングレコードの永続化ストア。
/// 状態を変更する操作はすべて `begin` で開始したトランザクション経由で行う。
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// 新しいトランザクションを開始する。
    async fn begin(&self) -> anyhow::Result<Box<dyn WorkflowTransaction>>;

    /// ユーザーが直接またはグループ経由で処理できる保留タスクを新しい順に返す。
    /// 進行中インスタンスの現在ステップのタスクに限る。
    async fn find_pending_tasks(
        &self,
        user_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Vec<PendingTask>>;

    /// インスタンスのログを step_order 昇順で返す。
    async fn find_logs(&self, instance_id: Uuid) -> anyhow::Result<Vec<WorkflowLog>>;

    async fn find_instance(&self, id: Uuid) -> anyhow::Result<Option<WorkflowInstance>>;

    async fn find_tasks(&self, instance_id: Uuid) -> anyhow::Result<Vec<WorkflowTask>>;

    async fn find_request(
        &self,
        doc_type: &str,
        doc_num: &str,
    ) -> anyhow::Result<Option<DocumentRequest>>;
}

/// WorkflowTransaction は 1 トランザクション内の読み書き操作。
/// `commit` せずに破棄した場合はロールバックされる。
#[async_trait]
pub trait WorkflowTransaction: Send {
    /// ステップと割当ルールを含む定義を読み込む。
    async fn find_definition(&mut self, id: Uuid) -> anyhow::Result<Option<WorkflowDefinition>>;

    async fn insert_instance(&mut self, instance: &WorkflowInstance) -> anyhow::Result<()>;

    /// インスタンスを排他ロックして読み込む。
    async fn lock_instance(&mut self, id: Uuid) -> anyhow::Result<Option<WorkflowInstance>>;

    async fn update_instance(&mut self, instance: &WorkflowInstance) -> anyhow::Result<()>;

    async fn insert_task(&mut self, task: &WorkflowTask) -> anyhow::Result<()>;

    /// 指定ステップでアクターが処理可能な保留タスクを 1 件ロックして返す。
    async fn claim_task(
        &mut self,
        instance_id: Uuid,
        step_order: i32,
        actor_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Option<WorkflowTask>>;

    /// ステップを問わず、アクターが処理可能な保留タスクを 1 件返す。ロックはしない。
    async fn find_actor_task(
        &mut self,
        instance_id: Uuid,
        actor_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Option<WorkflowTask>>;

    async fn delete_task(&mut self, task_id: Uuid) -> anyhow::Result<()>;

    /// インスタンスの保留タスクをすべて削除し、削除件数を返す。
    async fn delete_pending_tasks(&mut self, instance_id: Uuid) -> anyhow::Result<u64>;

    async fn insert_log(&mut self, log: &WorkflowLog) -> anyhow::Result<()>;

    /// (doc_type, doc_num) のステージングレコードを排他ロックして返す。
    /// 存在しない場合は `draft` を登録してから返す。
    async fn lock_or_create_request(
        &mut self,
        draft: &DocumentRequest,
    ) -> anyhow::Result<DocumentRequest>;

    /// ステージングレコードをインスタンスに紐づけ、PROCESSING に更新する。
    async fn link_request(&mut self, request_id: Uuid, instance_id: Uuid) -> anyhow::Result<()>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}
