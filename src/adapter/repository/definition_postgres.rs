use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::entity::workflow_definition::WorkflowDefinition;
use crate::domain::entity::workflow_step::{AssignmentKind, StepAssignment, WorkflowStep};
use crate::domain::repository::WorkflowDefinitionRepository;

const DEFINITION_COLUMNS: &str = "id, service_code, operation_code, name, description, version, \
                                  is_active, created_at, updated_at";

/// DefinitionKey は定義の検索キー。
pub(crate) enum DefinitionKey<'a> {
    Id(Uuid),
    ServiceCode(&'a str),
    OperationCode(&'a str),
}

/// 定義をステップ・割当ルールごと読み込む。
/// サービスコード・業務コードで探す場合は有効な定義のうち最新バージョンを返す。
pub(crate) async fn load_definition(
    conn: &mut PgConnection,
    key: DefinitionKey<'_>,
) -> anyhow::Result<Option<WorkflowDefinition>> {
    let row = match key {
        DefinitionKey::Id(id) => {
            sqlx::query_as::<_, DefinitionRow>(&format!(
                "SELECT {DEFINITION_COLUMNS} FROM approval.workflow_definitions WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        }
        DefinitionKey::ServiceCode(code) => {
            sqlx::query_as::<_, DefinitionRow>(&format!(
                "SELECT {DEFINITION_COLUMNS} FROM approval.workflow_definitions \
                 WHERE service_code = $1 AND is_active ORDER BY version DESC LIMIT 1"
            ))
            .bind(code)
            .fetch_optional(&mut *conn)
            .await?
        }
        DefinitionKey::OperationCode(code) => {
            sqlx::query_as::<_, DefinitionRow>(&format!(
                "SELECT {DEFINITION_COLUMNS} FROM approval.workflow_definitions \
                 WHERE operation_code = $1 AND is_active ORDER BY version DESC LIMIT 1"
            ))
            .bind(code)
            .fetch_optional(&mut *conn)
            .await?
        }
    };
    let Some(row) = row else {
        return Ok(None);
    };

    let step_rows = sqlx::query_as::<_, StepRow>(
        r#"
        SELECT id, definition_id, step_code, name, step_order, required_role,
               can_skip, can_delegate, require_comment, time_limit_hours
        FROM approval.workflow_steps
        WHERE definition_id = $1
        ORDER BY step_order
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let assignment_rows = sqlx::query_as::<_, AssignmentRow>(
        r#"
        SELECT a.id, a.step_id, a.factory_id, a.department_ids, a.kind, a.identity,
               a.priority, a.is_active
        FROM approval.workflow_step_assignments a
        JOIN approval.workflow_steps s ON s.id = a.step_id
        WHERE s.definition_id = $1
        ORDER BY a.priority, a.id
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut steps: Vec<WorkflowStep> = step_rows.into_iter().map(WorkflowStep::from).collect();
    for assignment_row in assignment_rows {
        let assignment = StepAssignment::try_from(assignment_row)?;
        if let Some(step) = steps.iter_mut().find(|s| s.id == assignment.step_id) {
            step.assignments.push(assignment);
        }
    }

    let mut definition = WorkflowDefinition::from(row);
    definition.steps = steps;
    Ok(Some(definition))
}

/// PostgresDefinitionRepository は PostgreSQL 実装の定義リポジトリ。
pub struct PostgresDefinitionRepository {
    pool: PgPool,
}

impl PostgresDefinitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 定義をステップ・割当ルールごと登録する。
    pub async fn insert(&self, definition: &WorkflowDefinition) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO approval.workflow_definitions
                (id, service_code, operation_code, name, description, version, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(definition.id)
        .bind(&definition.service_code)
        .bind(&definition.operation_code)
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(definition.version)
        .bind(definition.is_active)
        .bind(definition.created_at)
        .bind(definition.updated_at)
        .execute(&mut *tx)
        .await?;

        for step in &definition.steps {
            sqlx::query(
                r#"
                INSERT INTO approval.workflow_steps
                    (id, definition_id, step_code, name, step_order, required_role,
                     can_skip, can_delegate, require_comment, time_limit_hours)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(step.id)
            .bind(definition.id)
            .bind(&step.step_code)
            .bind(&step.name)
            .bind(step.order)
            .bind(&step.required_role)
            .bind(step.can_skip)
            .bind(step.can_delegate)
            .bind(step.require_comment)
            .bind(step.time_limit_hours)
            .execute(&mut *tx)
            .await?;

            for assignment in &step.assignments {
                sqlx::query(
                    r#"
                    INSERT INTO approval.workflow_step_assignments
                        (id, step_id, factory_id, department_ids, kind, identity, priority, is_active)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(assignment.id)
                .bind(step.id)
                .bind(assignment.factory_id)
                .bind(&assignment.department_ids)
                .bind(assignment.kind.to_string())
                .bind(&assignment.identity)
                .bind(assignment.priority)
                .bind(assignment.is_active)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for PostgresDefinitionRepository {
    async fn find_by_service_code(&self, code: &str) -> anyhow::Result<Option<WorkflowDefinition>> {
        let mut conn = self.pool.acquire().await?;
        load_definition(&mut conn, DefinitionKey::ServiceCode(code)).await
    }

    async fn find_by_operation_code(
        &self,
        code: &str,
    ) -> anyhow::Result<Option<WorkflowDefinition>> {
        let mut conn = self.pool.acquire().await?;
        load_definition(&mut conn, DefinitionKey::OperationCode(code)).await
    }
}

#[derive(sqlx::FromRow)]
struct DefinitionRow {
    id: Uuid,
    service_code: String,
    operation_code: String,
    name: String,
    description: String,
    version: i32,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<DefinitionRow> for WorkflowDefinition {
    fn from(row: DefinitionRow) -> Self {
        WorkflowDefinition {
            id: row.id,
            service_code: row.service_code,
            operation_code: row.operation_code,
            name: row.name,
            description: row.description,
            version: row.version,
            is_active: row.is_active,
            steps: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StepRow {
    id: Uuid,
    definition_id: Uuid,
    step_code: String,
    name: String,
    step_order: i32,
    required_role: String,
    can_skip: bool,
    can_delegate: bool,
    require_comment: bool,
    time_limit_hours: i32,
}

impl From<StepRow> for WorkflowStep {
    fn from(row: StepRow) -> Self {
        WorkflowStep {
            id: row.id,
            definition_id: row.definition_id,
            step_code: row.step_code,
            name: row.name,
            order: row.step_order,
            required_role: row.required_role,
            can_skip: row.can_skip,
            can_delegate: row.can_delegate,
            require_comment: row.require_comment,
            time_limit_hours: row.time_limit_hours,
            assignments: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    step_id: Uuid,
    factory_id: Option<i64>,
    department_ids: Vec<i64>,
    kind: String,
    identity: String,
    priority: i32,
    is_active: bool,
}

impl TryFrom<AssignmentRow> for StepAssignment {
    type Error = anyhow::Error;

    fn try_from(row: AssignmentRow) -> anyhow::Result<Self> {
        Ok(StepAssignment {
            id: row.id,
            step_id: row.step_id,
            factory_id: row.factory_id,
            department_ids: row.department_ids,
            kind: AssignmentKind::from_str_value(&row.kind)?,
            identity: row.identity,
            priority: row.priority,
            is_active: row.is_active,
        })
    }
}
