use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// InstanceStatus はワークフローインスタンスのステータスを表す。
/// Cancelled は予約値であり、現在の遷移では到達しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl InstanceStatus {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => anyhow::bail!("invalid instance status: {}", s),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// NewInstance はインスタンス生成時に固定されるスナップショット項目。
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub definition_id: Uuid,
    pub service_code: String,
    pub doc_num: String,
    pub doc_type: String,
    pub creator_id: String,
    pub factory_id: i64,
    pub department_id: i64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub service_code: String,
    pub doc_num: String,
    pub doc_type: String,
    pub creator_id: String,
    pub factory_id: i64,
    pub department_id: i64,
    pub payload: serde_json::Value,
    /// ステップの order 値（配列インデックスではない）。
    pub current_step: i32,
    pub total_steps: i32,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn start(input: NewInstance, first_step_order: i32, total_steps: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            definition_id: input.definition_id,
            service_code: input.service_code,
            doc_num: input.doc_num,
            doc_type: input.doc_type,
            creator_id: input.creator_id,
            factory_id: input.factory_id,
            department_id: input.department_id,
            payload: input.payload,
            current_step: first_step_order,
            total_steps,
            status: InstanceStatus::InProgress,
            started_at: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == InstanceStatus::InProgress
    }

    /// 署名対象となるペイロードのバイト列。null は空として扱う。
    pub fn payload_bytes(&self) -> Vec<u8> {
        if self.payload.is_null() {
            return Vec::new();
        }
        serde_json::to_vec(&self.payload).unwrap_or_default()
    }

    pub fn advance_to(&mut self, step_order: i32) {
        self.current_step = step_order;
        self.updated_at = Utc::now();
    }

    pub fn approve(&mut self) {
        let now = Utc::now();
        self.status = InstanceStatus::Approved;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn reject(&mut self) {
        let now = Utc::now();
        self.status = InstanceStatus::Rejected;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
