use std::sync::Arc;

use crate::domain::repository::OrganizationRepository;

/// PermissionResolver はアクターの所属グループを解決する。
/// 参照に失敗した場合は空のリストを返す（フェイルオープン）。
#[derive(Clone)]
pub struct PermissionResolver {
    org_repo: Arc<dyn OrganizationRepository>,
}

impl PermissionResolver {
    pub fn new(org_repo: Arc<dyn OrganizationRepository>) -> Self {
        Self { org_repo }
    }

    pub async fn group_codes(&self, user_id: &str) -> Vec<String> {
        match self.org_repo.find_group_codes_for_user(user_id).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "group lookup failed, continuing without group memberships"
                );
                Vec::new()
            }
        }
    }
}
