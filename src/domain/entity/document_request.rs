use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RequestStatus は受信伝票のステージングステータスを表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Initiating,
    Processing,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiating => write!(f, "INITIATING"),
            Self::Processing => write!(f, "PROCESSING"),
        }
    }
}

impl RequestStatus {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "INITIATING" => Ok(Self::Initiating),
            "PROCESSING" => Ok(Self::Processing),
            _ => anyhow::bail!("invalid request status: {}", s),
        }
    }
}

/// DocumentRequest は重複受信抑止のためのステージングレコード。
/// (doc_type, doc_num) で一意となり、最大 1 つのインスタンスに紐づく。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub id: Uuid,
    pub service_name: String,
    pub company_id: String,
    pub operation: String,
    pub doc_type: String,
    pub doc_num: String,
    pub creator_id: String,
    pub status: RequestStatus,
    pub workflow_instance_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRequest {
    pub fn draft(
        service_name: impl Into<String>,
        company_id: impl Into<String>,
        operation: impl Into<String>,
        doc_type: impl Into<String>,
        doc_num: impl Into<String>,
        creator_id: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service_name: service_name.into(),
            company_id: company_id.into(),
            operation: operation.into(),
            doc_type: doc_type.into(),
            doc_num: doc_num.into(),
            creator_id: creator_id.into(),
            status: RequestStatus::Initiating,
            workflow_instance_id: None,
            detail,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.workflow_instance_id.is_some()
    }

    pub fn link(&mut self, instance_id: Uuid) {
        self.workflow_instance_id = Some(instance_id);
        self.status = RequestStatus::Processing;
        self.updated_at = Utc::now();
    }
}
