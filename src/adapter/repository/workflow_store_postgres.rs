use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::definition_postgres::{load_definition, DefinitionKey};
use crate::domain::entity::document_request::{DocumentRequest, RequestStatus};
use crate::domain::entity::workflow_definition::WorkflowDefinition;
use crate::domain::entity::workflow_instance::{InstanceStatus, WorkflowInstance};
use crate::domain::entity::workflow_log::{LogAction, WorkflowLog};
use crate::domain::entity::workflow_task::{PendingTask, WorkflowTask, TASK_STATUS_PENDING};
use crate::domain::repository::{WorkflowStore, WorkflowTransaction};

const INSTANCE_COLUMNS: &str = "id, definition_id, service_code, doc_num, doc_type, creator_id, \
                                factory_id, department_id, payload, current_step, total_steps, \
                                status, started_at, completed_at, created_at, updated_at";

const TASK_COLUMNS: &str = "t.id, t.instance_id, t.step_id, t.step_order, t.step_name, \
                            t.assigned_to, t.is_group, t.status, t.due_at, t.created_at";

const REQUEST_COLUMNS: &str = "id, service_name, company_id, operation, doc_type, doc_num, \
                               creator_id, status, workflow_instance_id, detail, created_at, updated_at";

/// 直接割当（$1 = ユーザー ID）またはグループ割当（$2 = グループコード配列）の判定条件。
const ACTIONABLE_BY: &str = "((NOT t.is_group AND t.assigned_to = $1) \
                             OR (t.is_group AND t.assigned_to = ANY($2)))";

/// PostgresWorkflowStore は PostgreSQL 実装の WorkflowStore。
pub struct PostgresWorkflowStore {
    pool: PgPool,
}

impl PostgresWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PostgresWorkflowStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn WorkflowTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn find_pending_tasks(
        &self,
        user_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Vec<PendingTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS}, i.service_code, i.doc_num, i.doc_type, i.creator_id, \
                    i.status AS instance_status, i.total_steps \
             FROM approval.workflow_tasks t \
             JOIN approval.workflow_instances i ON i.id = t.instance_id \
             WHERE t.status = $3 AND {ACTIONABLE_BY} \
               AND i.status = $4 AND t.step_order = i.current_step \
             ORDER BY t.created_at DESC"
        );
        let rows = sqlx::query_as::<_, PendingTaskRow>(&sql)
            .bind(user_id)
            .bind(groups)
            .bind(TASK_STATUS_PENDING)
            .bind(InstanceStatus::InProgress.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_logs(&self, instance_id: Uuid) -> anyhow::Result<Vec<WorkflowLog>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, instance_id, step_order, step_name, action, actor_id, actor_name, comment,
                   signature_hash, data_snapshot_hash, signed_timestamp, ip_address, device_info, created_at
            FROM approval.workflow_logs
            WHERE instance_id = $1
            ORDER BY step_order, created_at
            "#,
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_instance(&self, id: Uuid) -> anyhow::Result<Option<WorkflowInstance>> {
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM approval.workflow_instances WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_tasks(&self, instance_id: Uuid) -> anyhow::Result<Vec<WorkflowTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM approval.workflow_tasks t \
             WHERE t.instance_id = $1 ORDER BY t.step_order, t.created_at"
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_request(
        &self,
        doc_type: &str,
        doc_num: &str,
    ) -> anyhow::Result<Option<DocumentRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM approval.requests WHERE doc_type = $1 AND doc_num = $2"
        ))
        .bind(doc_type)
        .bind(doc_num)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}

/// PostgresTransaction は commit されずに破棄されるとロールバックされる。
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl WorkflowTransaction for PostgresTransaction {
    async fn find_definition(&mut self, id: Uuid) -> anyhow::Result<Option<WorkflowDefinition>> {
        load_definition(&mut *self.tx, DefinitionKey::Id(id)).await
    }

    async fn insert_instance(&mut self, instance: &WorkflowInstance) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO approval.workflow_instances ({INSTANCE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(instance.id)
        .bind(instance.definition_id)
        .bind(&instance.service_code)
        .bind(&instance.doc_num)
        .bind(&instance.doc_type)
        .bind(&instance.creator_id)
        .bind(instance.factory_id)
        .bind(instance.department_id)
        .bind(&instance.payload)
        .bind(instance.current_step)
        .bind(instance.total_steps)
        .bind(instance.status.to_string())
        .bind(instance.started_at)
        .bind(instance.completed_at)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn lock_instance(&mut self, id: Uuid) -> anyhow::Result<Option<WorkflowInstance>> {
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM approval.workflow_instances WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_instance(&mut self, instance: &WorkflowInstance) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE approval.workflow_instances
            SET current_step = $2, status = $3, completed_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(instance.id)
        .bind(instance.current_step)
        .bind(instance.status.to_string())
        .bind(instance.completed_at)
        .bind(instance.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("instance not found: {}", instance.id);
        }
        Ok(())
    }

    async fn insert_task(&mut self, task: &WorkflowTask) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO approval.workflow_tasks
                (id, instance_id, step_id, step_order, step_name, assigned_to, is_group, status, due_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(task.id)
        .bind(task.instance_id)
        .bind(task.step_id)
        .bind(task.step_order)
        .bind(&task.step_name)
        .bind(&task.assigned_to)
        .bind(task.is_group)
        .bind(&task.status)
        .bind(task.due_at)
        .bind(task.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn claim_task(
        &mut self,
        instance_id: Uuid,
        step_order: i32,
        actor_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Option<WorkflowTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM approval.workflow_tasks t \
             WHERE t.instance_id = $3 AND t.step_order = $4 AND t.status = $5 AND {ACTIONABLE_BY} \
             ORDER BY t.created_at \
             LIMIT 1 \
             FOR UPDATE"
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(actor_id)
            .bind(groups)
            .bind(instance_id)
            .bind(step_order)
            .bind(TASK_STATUS_PENDING)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn find_actor_task(
        &mut self,
        instance_id: Uuid,
        actor_id: &str,
        groups: &[String],
    ) -> anyhow::Result<Option<WorkflowTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM approval.workflow_tasks t \
             WHERE t.instance_id = $3 AND t.status = $4 AND {ACTIONABLE_BY} \
             ORDER BY t.step_order, t.created_at \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(actor_id)
            .bind(groups)
            .bind(instance_id)
            .bind(TASK_STATUS_PENDING)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn delete_task(&mut self, task_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM approval.workflow_tasks WHERE id = $1")
            .bind(task_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_pending_tasks(&mut self, instance_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM approval.workflow_tasks WHERE instance_id = $1 AND status = $2",
        )
        .bind(instance_id)
        .bind(TASK_STATUS_PENDING)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_log(&mut self, log: &WorkflowLog) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO approval.workflow_logs
                (id, instance_id, step_order, step_name, action, actor_id, actor_name, comment,
                 signature_hash, data_snapshot_hash, signed_timestamp, ip_address, device_info, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(log.id)
        .bind(log.instance_id)
        .bind(log.step_order)
        .bind(&log.step_name)
        .bind(log.action.to_string())
        .bind(&log.actor_id)
        .bind(&log.actor_name)
        .bind(&log.comment)
        .bind(&log.signature_hash)
        .bind(&log.data_snapshot_hash)
        .bind(log.signed_timestamp)
        .bind(&log.ip_address)
        .bind(&log.device_info)
        .bind(log.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn lock_or_create_request(
        &mut self,
        draft: &DocumentRequest,
    ) -> anyhow::Result<DocumentRequest> {
        // 同時に届いた重複は一意制約で弾かれ、下の FOR UPDATE で先行トランザクションの完了を待つ
        sqlx::query(&format!(
            "INSERT INTO approval.requests ({REQUEST_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (doc_type, doc_num) DO NOTHING"
        ))
        .bind(draft.id)
        .bind(&draft.service_name)
        .bind(&draft.company_id)
        .bind(&draft.operation)
        .bind(&draft.doc_type)
        .bind(&draft.doc_num)
        .bind(&draft.creator_id)
        .bind(draft.status.to_string())
        .bind(draft.workflow_instance_id)
        .bind(&draft.detail)
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM approval.requests \
             WHERE doc_type = $1 AND doc_num = $2 FOR UPDATE"
        ))
        .bind(&draft.doc_type)
        .bind(&draft.doc_num)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn link_request(&mut self, request_id: Uuid, instance_id: Uuid) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE approval.requests
            SET workflow_instance_id = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(request_id)
        .bind(instance_id)
        .bind(RequestStatus::Processing.to_string())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("request not found: {}", request_id);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: Uuid,
    definition_id: Uuid,
    service_code: String,
    doc_num: String,
    doc_type: String,
    creator_id: String,
    factory_id: i64,
    department_id: i64,
    payload: Option<serde_json::Value>,
    current_step: i32,
    total_steps: i32,
    status: String,
    started_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<InstanceRow> for WorkflowInstance {
    type Error = anyhow::Error;

    fn try_from(row: InstanceRow) -> anyhow::Result<Self> {
        Ok(WorkflowInstance {
            id: row.id,
            definition_id: row.definition_id,
            service_code: row.service_code,
            doc_num: row.doc_num,
            doc_type: row.doc_type,
            creator_id: row.creator_id,
            factory_id: row.factory_id,
            department_id: row.department_id,
            payload: row.payload.unwrap_or(serde_json::Value::Null),
            current_step: row.current_step,
            total_steps: row.total_steps,
            status: InstanceStatus::from_str_value(&row.status)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    instance_id: Uuid,
    step_id: Uuid,
    step_order: i32,
    step_name: String,
    assigned_to: String,
    is_group: bool,
    status: String,
    due_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<TaskRow> for WorkflowTask {
    fn from(row: TaskRow) -> Self {
        WorkflowTask {
            id: row.id,
            instance_id: row.instance_id,
            step_id: row.step_id,
            step_order: row.step_order,
            step_name: row.step_name,
            assigned_to: row.assigned_to,
            is_group: row.is_group,
            status: row.status,
            due_at: row.due_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PendingTaskRow {
    #[sqlx(flatten)]
    task: TaskRow,
    service_code: String,
    doc_num: String,
    doc_type: String,
    creator_id: String,
    instance_status: String,
    total_steps: i32,
}

impl TryFrom<PendingTaskRow> for PendingTask {
    type Error = anyhow::Error;

    fn try_from(row: PendingTaskRow) -> anyhow::Result<Self> {
        Ok(PendingTask {
            task: row.task.into(),
            service_code: row.service_code,
            doc_num: row.doc_num,
            doc_type: row.doc_type,
            creator_id: row.creator_id,
            instance_status: InstanceStatus::from_str_value(&row.instance_status)?,
            total_steps: row.total_steps,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    instance_id: Uuid,
    step_order: i32,
    step_name: String,
    action: String,
    actor_id: String,
    actor_name: String,
    comment: String,
    signature_hash: String,
    data_snapshot_hash: String,
    signed_timestamp: i64,
    ip_address: Option<String>,
    device_info: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<LogRow> for WorkflowLog {
    type Error = anyhow::Error;

    fn try_from(row: LogRow) -> anyhow::Result<Self> {
        Ok(WorkflowLog {
            id: row.id,
            instance_id: row.instance_id,
            step_order: row.step_order,
            step_name: row.step_name,
            action: LogAction::from_str_value(&row.action)?,
            actor_id: row.actor_id,
            actor_name: row.actor_name,
            comment: row.comment,
            signature_hash: row.signature_hash,
            data_snapshot_hash: row.data_snapshot_hash,
            signed_timestamp: row.signed_timestamp,
            ip_address: row.ip_address,
            device_info: row.device_info,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    service_name: String,
    company_id: String,
    operation: String,
    doc_type: String,
    doc_num: String,
    creator_id: String,
    status: String,
    workflow_instance_id: Option<Uuid>,
    detail: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<RequestRow> for DocumentRequest {
    type Error = anyhow::Error;

    fn try_from(row: RequestRow) -> anyhow::Result<Self> {
        Ok(DocumentRequest {
            id: row.id,
            service_name: row.service_name,
            company_id: row.company_id,
            operation: row.operation,
            doc_type: row.doc_type,
            doc_num: row.doc_num,
            creator_id: row.creator_id,
            status: RequestStatus::from_str_value(&row.status)?,
            workflow_instance_id: row.workflow_instance_id,
            detail: row.detail.unwrap_or(serde_json::Value::Null),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
