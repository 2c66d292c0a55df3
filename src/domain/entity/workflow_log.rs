use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// LogAction は監査ログに記録される操作種別を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogAction {
    Submit,
    Approve,
    Reject,
    Cancel,
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit => write!(f, "SUBMIT"),
            Self::Approve => write!(f, "APPROVE"),
            Self::Reject => write!(f, "REJECT"),
            Self::Cancel => write!(f, "CANCEL"),
        }
    }
}

impl LogAction {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "SUBMIT" => Ok(Self::Submit),
            "APPROVE" => Ok(Self::Approve),
            "REJECT" => Ok(Self::Reject),
            "CANCEL" => Ok(Self::Cancel),
            _ => anyhow::bail!("invalid log action: {}", s),
        }
    }
}

/// WorkflowLog は追記専用の監査ログ。作成後に更新・削除されることはない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLog {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub step_order: i32,
    pub step_name: String,
    pub action: LogAction,
    pub actor_id: String,
    pub actor_name: String,
    pub comment: String,
    pub signature_hash: String,
    pub data_snapshot_hash: String,
    /// 署名時刻（UNIX ナノ秒）。検証時はこの値を再利用する。
    pub signed_timestamp: i64,
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
    pub created_at: DateTime<Utc>,
}
