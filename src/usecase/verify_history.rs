use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::entity::workflow_log::WorkflowLog;
use crate::domain::repository::WorkflowStore;
use crate::domain::service::SignatureService;

/// LogVerification はログ 1 件の署名検証結果。
#[derive(Debug, Clone, Serialize)]
pub struct LogVerification {
    pub log: WorkflowLog,
    pub signature_valid: bool,
    pub data_hash_valid: bool,
}

/// VerifyHistoryUseCase は保存済みタイムスタンプで署名を再計算し、
/// 監査ログとインスタンスのペイロードが改ざんされていないかを検証する。
pub struct VerifyHistoryUseCase {
    store: Arc<dyn WorkflowStore>,
    signer: Arc<SignatureService>,
}

impl VerifyHistoryUseCase {
    pub fn new(store: Arc<dyn WorkflowStore>, signer: Arc<SignatureService>) -> Self {
        Self { store, signer }
    }

    pub async fn execute(&self, instance_id: Uuid) -> anyhow::Result<Option<Vec<LogVerification>>> {
        let Some(instance) = self.store.find_instance(instance_id).await? else {
            return Ok(None);
        };
        let payload = instance.payload_bytes();
        let logs = self.store.find_logs(instance_id).await?;

        let results: Vec<LogVerification> = logs
            .into_iter()
            .map(|log| {
                let check = self.signer.verify(&log, &instance.doc_num, &payload);
                LogVerification {
                    log,
                    signature_valid: check.signature_valid,
                    data_hash_valid: check.data_hash_valid,
                }
            })
            .collect();

        let invalid = results
            .iter()
            .filter(|r| !(r.signature_valid && r.data_hash_valid))
            .count();
        if invalid > 0 {
            tracing::warn!(instance_id = %instance_id, invalid, "audit log verification failed");
        }
        Ok(Some(results))
    }
}
