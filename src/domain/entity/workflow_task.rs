use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::workflow_instance::{InstanceStatus, WorkflowInstance};
use super::workflow_step::{StepAssignment, WorkflowStep};

pub const TASK_STATUS_PENDING: &str = "PENDING";

/// WorkflowTask は未処理の作業単位を表す。消費時には削除される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub step_id: Uuid,
    pub step_order: i32,
    pub step_name: String,
    /// ユーザー ID またはグループコード。
    pub assigned_to: String,
    pub is_group: bool,
    pub status: String,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowTask {
    pub fn for_assignment(
        instance: &WorkflowInstance,
        step: &WorkflowStep,
        assignment: &StepAssignment,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            instance_id: instance.id,
            step_id: step.id,
            step_order: step.order,
            step_name: step.name.clone(),
            assigned_to: assignment.identity.clone(),
            is_group: assignment.is_group(),
            status: TASK_STATUS_PENDING.to_string(),
            due_at: step.due_at(now),
            created_at: now,
        }
    }

    /// 直接割当またはグループ割当で、アクターがこのタスクを処理できるかを判定する。
    pub fn is_actionable_by(&self, actor_id: &str, groups: &[String]) -> bool {
        if self.is_group {
            groups.iter().any(|g| g == &self.assigned_to)
        } else {
            self.assigned_to == actor_id
        }
    }
}

/// PendingTask は保留タスクにインスタンスの表示用メタデータを結合したもの。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTask {
    #[serde(flatten)]
    pub task: WorkflowTask,
    pub service_code: String,
    pub doc_num: String,
    pub doc_type: String,
    pub creator_id: String,
    pub instance_status: InstanceStatus,
    pub total_steps: i32,
}

impl PendingTask {
    pub fn new(task: WorkflowTask, instance: &WorkflowInstance) -> Self {
        Self {
            task,
            service_code: instance.service_code.clone(),
            doc_num: instance.doc_num.clone(),
            doc_type: instance.doc_type.clone(),
            creator_id: instance.creator_id.clone(),
            instance_status: instance.status,
            total_steps: instance.total_steps,
        }
    }
}
