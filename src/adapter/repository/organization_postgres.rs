use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entity::org_user::OrgUser;
use crate::domain::repository::OrganizationRepository;

/// PostgresOrganizationRepository は同期済み組織テーブルを参照する。
pub struct PostgresOrganizationRepository {
    pool: PgPool,
}

impl PostgresOrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationRepository for PostgresOrganizationRepository {
    async fn find_user_by_code(&self, code: &str) -> anyhow::Result<Option<OrgUser>> {
        let row = sqlx::query_as::<_, OrgUserRow>(
            "SELECT id, code, department_id, factory_id FROM approval.org_users WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_group_codes_for_user(&self, user_id: &str) -> anyhow::Result<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>(
            "SELECT group_code FROM approval.org_user_groups WHERE user_id = $1 ORDER BY group_code",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }
}

#[derive(sqlx::FromRow)]
struct OrgUserRow {
    id: String,
    code: String,
    department_id: i64,
    factory_id: i64,
}

impl From<OrgUserRow> for OrgUser {
    fn from(row: OrgUserRow) -> Self {
        OrgUser {
            id: row.id,
            code: row.code,
            department_id: row.department_id,
            factory_id: row.factory_id,
        }
    }
}
