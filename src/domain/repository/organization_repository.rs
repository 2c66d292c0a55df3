use async_trait::async_trait;

use crate::domain::entity::org_user::OrgUser;

/// OrganizationRepository は組織データストアの読み取り専用インターフェース。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn find_user_by_code(&self, code: &str) -> anyhow::Result<Option<OrgUser>>;

    async fn find_group_codes_for_user(&self, user_id: &str) -> anyhow::Result<Vec<String>>;
}
