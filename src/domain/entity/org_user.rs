use serde::{Deserialize, Serialize};

/// OrgUser は組織データストアから参照するユーザー情報。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUser {
    pub id: String,
    pub code: String,
    pub department_id: i64,
    pub factory_id: i64,
}
