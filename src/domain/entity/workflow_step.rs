use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// AssignmentKind はステップ割当の対象種別を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentKind {
    User,
    Group,
    Role,
}

impl std::fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Group => write!(f, "GROUP"),
            Self::Role => write!(f, "ROLE"),
        }
    }
}

impl AssignmentKind {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "USER" => Ok(Self::User),
            "GROUP" => Ok(Self::Group),
            "ROLE" => Ok(Self::Role),
            _ => anyhow::bail!("invalid assignment kind: {}", s),
        }
    }
}

/// StepAssignment はステップに紐づくルーティングルール。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAssignment {
    pub id: Uuid,
    pub step_id: Uuid,
    pub factory_id: Option<i64>,
    /// 空の場合は部署で絞り込まない。
    pub department_ids: Vec<i64>,
    pub kind: AssignmentKind,
    pub identity: String,
    pub priority: i32,
    pub is_active: bool,
}

impl StepAssignment {
    pub fn new(step_id: Uuid, kind: AssignmentKind, identity: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_id,
            factory_id: None,
            department_ids: Vec::new(),
            kind,
            identity: identity.into(),
            priority: 0,
            is_active: true,
        }
    }

    #[must_use]
    pub fn with_factory(mut self, factory_id: i64) -> Self {
        self.factory_id = Some(factory_id);
        self
    }

    #[must_use]
    pub fn with_departments(mut self, department_ids: Vec<i64>) -> Self {
        self.department_ids = department_ids;
        self
    }

    /// インスタンスの工場・部署コンテキストにこのルールが適用されるかを判定する。
    pub fn applies_to(&self, factory_id: i64, department_id: i64) -> bool {
        if let Some(required) = self.factory_id {
            if required != factory_id {
                return false;
            }
        }
        self.department_ids.is_empty() || self.department_ids.contains(&department_id)
    }

    pub fn is_group(&self) -> bool {
        self.kind == AssignmentKind::Group
    }
}

/// WorkflowStep は承認定義の 1 段階を表す。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub step_code: String,
    pub name: String,
    /// 定義内で一意。連番である必要はない。
    pub order: i32,
    pub required_role: String,
    pub can_skip: bool,
    pub can_delegate: bool,
    pub require_comment: bool,
    pub time_limit_hours: i32,
    pub assignments: Vec<StepAssignment>,
}

impl WorkflowStep {
    pub fn new(
        definition_id: Uuid,
        step_code: impl Into<String>,
        name: impl Into<String>,
        order: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition_id,
            step_code: step_code.into(),
            name: name.into(),
            order,
            required_role: String::new(),
            can_skip: false,
            can_delegate: false,
            require_comment: false,
            time_limit_hours: 0,
            assignments: Vec::new(),
        }
    }

    /// 有効な割当ルールだけを返す。
    pub fn active_assignments(&self) -> impl Iterator<Item = &StepAssignment> {
        self.assignments.iter().filter(|a| a.is_active)
    }

    pub fn due_at(&self, from: chrono::DateTime<chrono::Utc>) -> Option<chrono::DateTime<chrono::Utc>> {
        (self.time_limit_hours > 0)
            .then(|| from + chrono::Duration::hours(i64::from(self.time_limit_hours)))
    }
}
