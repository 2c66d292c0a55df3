use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::workflow_step::WorkflowStep;

/// WorkflowDefinition は公開済みの承認テンプレートを表す。
/// 公開後は変更されず、編集は新しいバージョンとして作成される。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub service_code: String,
    pub operation_code: String,
    pub name: String,
    pub description: String,
    pub version: i32,
    pub is_active: bool,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn new(
        service_code: impl Into<String>,
        operation_code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service_code: service_code.into(),
            operation_code: operation_code.into(),
            name: name.into(),
            description: String::new(),
            version: 1,
            is_active: true,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// 最小の order を持つステップを返す。
    pub fn first_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().min_by_key(|s| s.order)
    }

    /// order が `after` より大きいステップのうち最小のものを返す。
    pub fn next_step_after(&self, after: i32) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .filter(|s| s.order > after)
            .min_by_key(|s| s.order)
    }

    pub fn find_step_by_order(&self, order: i32) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.order == order)
    }
}
