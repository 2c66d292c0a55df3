use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::entity::org_user::OrgUser;
use crate::domain::repository::OrganizationRepository;

/// InMemoryOrganizationRepository はインメモリの組織データリポジトリ。
pub struct InMemoryOrganizationRepository {
    users: RwLock<HashMap<String, OrgUser>>,
    groups: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryOrganizationRepository {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert_user(&self, user: OrgUser) {
        self.users.write().await.insert(user.code.clone(), user);
    }

    pub async fn add_membership(&self, user_id: &str, group_code: &str) {
        self.groups
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(group_code.to_string());
    }
}

impl Default for InMemoryOrganizationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrganizationRepository for InMemoryOrganizationRepository {
    async fn find_user_by_code(&self, code: &str) -> anyhow::Result<Option<OrgUser>> {
        Ok(self.users.read().await.get(code).cloned())
    }

    async fn find_group_codes_for_user(&self, user_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .groups
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}
