use crate::domain::entity::workflow_instance::WorkflowInstance;
use crate::domain::entity::workflow_step::WorkflowStep;
use crate::domain::entity::workflow_task::WorkflowTask;
use crate::domain::repository::WorkflowTransaction;

/// TaskDistributor はステップの割当ルールからタスクを生成する。
/// 条件に合うすべての割当が並列タスクになり、いずれか 1 件の処理でステップが進む。
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskDistributor;

impl TaskDistributor {
    pub fn new() -> Self {
        Self
    }

    /// インスタンスの工場・部署に一致する割当ごとにタスクを 1 件作る（永続化はしない）。
    pub fn plan(&self, instance: &WorkflowInstance, step: &WorkflowStep) -> Vec<WorkflowTask> {
        step.active_assignments()
            .filter(|a| a.applies_to(instance.factory_id, instance.department_id))
            .map(|a| WorkflowTask::for_assignment(instance, step, a))
            .collect()
    }

    /// タスクを生成してトランザクションに書き込み、作成したタスクを返す。
    /// 空の結果はルーティング設定不備として呼び出し側が扱う。
    pub async fn distribute(
        &self,
        tx: &mut dyn WorkflowTransaction,
        instance: &WorkflowInstance,
        step: &WorkflowStep,
    ) -> anyhow::Result<Vec<WorkflowTask>> {
        let tasks = self.plan(instance, step);
        for task in &tasks {
            tx.insert_task(task).await?;
        }
        tracing::debug!(
            instance_id = %instance.id,
            step_order = step.order,
            task_count = tasks.len(),
            "tasks distributed"
        );
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::workflow_instance::NewInstance;
    use crate::domain::entity::workflow_step::{AssignmentKind, StepAssignment};
    use uuid::Uuid;

    fn instance(factory_id: i64, department_id: i64) -> WorkflowInstance {
        WorkflowInstance::start(
            NewInstance {
                definition_id: Uuid::new_v4(),
                service_code: "SVC".to_string(),
                doc_num: "D1".to_string(),
                doc_type: "T1".to_string(),
                creator_id: "creator".to_string(),
                factory_id,
                department_id,
                payload: serde_json::Value::Null,
            },
            10,
            1,
        )
    }

    #[test]
    fn fans_out_to_every_matching_assignment() {
        let inst = instance(1, 10);
        let mut step = WorkflowStep::new(inst.definition_id, "S10", "Manager", 10);
        step.assignments = vec![
            StepAssignment::new(step.id, AssignmentKind::User, "alice"),
            StepAssignment::new(step.id, AssignmentKind::Group, "ACC").with_factory(1),
            StepAssignment::new(step.id, AssignmentKind::User, "bob").with_departments(vec![10]),
        ];
        let tasks = TaskDistributor::new().plan(&inst, &step);
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.step_order == 10 && t.instance_id == inst.id));
        assert_eq!(tasks.iter().filter(|t| t.is_group).count(), 1);
    }

    #[test]
    fn skips_assignments_outside_context() {
        let inst = instance(1, 10);
        let mut step = WorkflowStep::new(inst.definition_id, "S10", "Manager", 10);
        step.assignments = vec![
            StepAssignment::new(step.id, AssignmentKind::User, "alice").with_factory(2),
            StepAssignment::new(step.id, AssignmentKind::User, "bob").with_departments(vec![11, 12]),
            StepAssignment::new(step.id, AssignmentKind::User, "carol")
                .with_factory(1)
                .with_departments(vec![10]),
        ];
        let tasks = TaskDistributor::new().plan(&inst, &step);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].assigned_to, "carol");
    }

    #[test]
    fn no_assignments_yields_nothing() {
        let inst = instance(1, 10);
        let step = WorkflowStep::new(inst.definition_id, "S10", "Manager", 10);
        assert!(TaskDistributor::new().plan(&inst, &step).is_empty());
    }
}
