use async_trait::async_trait;
use sqlx::PgPool;

/// BusinessRecordUpdate は ERP 業務テーブルへの署名ステータス反映内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessRecordUpdate {
    pub company_database: String,
    pub table: String,
    pub status_field: String,
    pub doc_type_column: String,
    pub doc_num_column: String,
    pub doc_type: String,
    pub doc_num: String,
    pub value: String,
}

/// ErpAcknowledgementSink は ERP への受信通知の送信先。
/// どちらの操作も更新行数を返す。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErpAcknowledgementSink: Send + Sync {
    async fn mark_acknowledged(
        &self,
        company_id: &str,
        composite_key: &str,
        message: &str,
    ) -> anyhow::Result<u64>;

    async fn update_business_record(&self, update: &BusinessRecordUpdate) -> anyhow::Result<u64>;
}

/// SQL 識別子として埋め込める名前かを検証する。
fn identifier(name: &str) -> anyhow::Result<&str> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        anyhow::bail!("invalid identifier: {}", name)
    }
}

/// PostgresErpSink は ERP データベースを直接更新する。
pub struct PostgresErpSink {
    pool: PgPool,
    queue_schema: String,
}

impl PostgresErpSink {
    pub fn new(pool: PgPool, queue_schema: impl Into<String>) -> Self {
        Self {
            pool,
            queue_schema: queue_schema.into(),
        }
    }
}

#[async_trait]
impl ErpAcknowledgementSink for PostgresErpSink {
    async fn mark_acknowledged(
        &self,
        company_id: &str,
        composite_key: &str,
        message: &str,
    ) -> anyhow::Result<u64> {
        let sql = format!(
            r#"UPDATE "{}"."EFJobQue" SET "EF006" = 'Y', "EF007" = $1 WHERE "EF001" = $2 AND "EF003" = $3"#,
            identifier(&self.queue_schema)?
        );
        let result = sqlx::query(&sql)
            .bind(message)
            .bind(company_id)
            .bind(composite_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_business_record(&self, update: &BusinessRecordUpdate) -> anyhow::Result<u64> {
        let sql = format!(
            r#"UPDATE "{}"."{}" SET "{}" = $1 WHERE "{}" = $2 AND "{}" = $3"#,
            identifier(&update.company_database)?,
            identifier(&update.table)?,
            identifier(&update.status_field)?,
            identifier(&update.doc_type_column)?,
            identifier(&update.doc_num_column)?,
        );
        let result = sqlx::query(&sql)
            .bind(&update.value)
            .bind(&update.doc_type)
            .bind(&update.doc_num)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// LoggingErpSink は ERP データベース未設定時に通知内容をログに出すだけの実装。
pub struct LoggingErpSink;

#[async_trait]
impl ErpAcknowledgementSink for LoggingErpSink {
    async fn mark_acknowledged(
        &self,
        company_id: &str,
        composite_key: &str,
        _message: &str,
    ) -> anyhow::Result<u64> {
        tracing::info!(
            company_id = %company_id,
            composite_key = %composite_key,
            "erp database not configured, acknowledgement skipped"
        );
        Ok(0)
    }

    async fn update_business_record(&self, update: &BusinessRecordUpdate) -> anyhow::Result<u64> {
        tracing::info!(
            table = %update.table,
            doc_num = %update.doc_num,
            "erp database not configured, business record update skipped"
        );
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_accepts_plain_names() {
        assert_eq!(identifier("PURTA").unwrap(), "PURTA");
        assert_eq!(identifier("LEADER_DB01").unwrap(), "LEADER_DB01");
    }

    #[test]
    fn identifier_rejects_injection() {
        assert!(identifier("").is_err());
        assert!(identifier("a\"; DROP TABLE x; --").is_err());
        assert!(identifier("db.dbo").is_err());
    }

    #[tokio::test]
    async fn logging_sink_reports_zero_rows() {
        let sink = LoggingErpSink;
        assert_eq!(sink.mark_acknowledged("C", "T||N", "ok").await.unwrap(), 0);
    }
}
