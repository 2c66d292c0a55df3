//! ERP への受信通知キュー。
//!
//! 通知は最大 1 回のベストエフォートで、再送・バックオフは行わない。
//! キューが満杯の場合はジョブを破棄して警告ログを出す。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::infrastructure::erp_sink::{BusinessRecordUpdate, ErpAcknowledgementSink};

/// 業務テーブルに書き込む「署名中」ステータス値。
const PENDING_SIGNATURE_VALUE: &str = "1";

/// AcknowledgementJob はコミット済みの受信 1 件に対する通知内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgementJob {
    pub company_id: String,
    pub operation_code: String,
    pub doc_type: String,
    pub doc_num: String,
    /// 業務テーブルへの反映を行うか（重複受信時は false）。
    pub mirror_business_record: bool,
}

impl AcknowledgementJob {
    /// ジョブキューの主キー（"{doc_type}||{doc_num}"）。
    pub fn composite_key(&self) -> String {
        format!("{}||{}", self.doc_type, self.doc_num)
    }
}

/// BusinessRecordTarget は業務コードごとの反映先テーブル定義。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessRecordTarget {
    pub table: &'static str,
    pub status_field: &'static str,
    pub doc_type_column: &'static str,
    pub doc_num_column: &'static str,
}

impl BusinessRecordTarget {
    pub fn for_operation(operation_code: &str) -> Option<Self> {
        match operation_code {
            "PURI05" => Some(Self {
                table: "PURTA",
                status_field: "TA016",
                doc_type_column: "TA001",
                doc_num_column: "TA002",
            }),
            "COPI06" => Some(Self {
                table: "COPTC",
                status_field: "TC016",
                doc_type_column: "TC001",
                doc_num_column: "TC002",
            }),
            _ => None,
        }
    }
}

/// AcknowledgementQueue は通知ジョブの送信側ハンドル。
#[derive(Clone)]
pub struct AcknowledgementQueue {
    sender: mpsc::Sender<AcknowledgementJob>,
}

impl AcknowledgementQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AcknowledgementJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// ジョブを投入する。ブロックせず、受け付けられなかった場合は false を返す。
    pub fn enqueue(&self, job: AcknowledgementJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    doc_type = %job.doc_type,
                    doc_num = %job.doc_num,
                    "acknowledgement queue full, job dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(
                    doc_type = %job.doc_type,
                    doc_num = %job.doc_num,
                    "acknowledgement worker stopped, job dropped"
                );
                false
            }
        }
    }
}

/// AcknowledgementWorker はキューからジョブを取り出して ERP に通知する。
pub struct AcknowledgementWorker {
    sink: Arc<dyn ErpAcknowledgementSink>,
    message: String,
    erp_db_mapping: HashMap<String, String>,
}

impl AcknowledgementWorker {
    pub fn new(
        sink: Arc<dyn ErpAcknowledgementSink>,
        message: impl Into<String>,
        erp_db_mapping: HashMap<String, String>,
    ) -> Self {
        Self {
            sink,
            message: message.into(),
            erp_db_mapping,
        }
    }

    /// 会社 ID から ERP データベース名を解決する。対応表になければ会社 ID をそのまま使う。
    pub fn company_database(&self, company_id: &str) -> String {
        self.erp_db_mapping
            .get(&company_id.to_lowercase())
            .cloned()
            .unwrap_or_else(|| company_id.to_string())
    }

    pub fn spawn(self, receiver: mpsc::Receiver<AcknowledgementJob>) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }

    pub async fn run(self, mut receiver: mpsc::Receiver<AcknowledgementJob>) {
        while let Some(job) = receiver.recv().await {
            self.handle(&job).await;
        }
        tracing::info!("acknowledgement worker stopped");
    }

    /// 1 件のジョブを処理する。失敗はログに残すだけで再試行しない。
    pub async fn handle(&self, job: &AcknowledgementJob) {
        let key = job.composite_key();
        match self
            .sink
            .mark_acknowledged(&job.company_id, &key, &self.message)
            .await
        {
            Ok(0) => tracing::warn!(
                company_id = %job.company_id,
                composite_key = %key,
                "no erp queue entry matched acknowledgement"
            ),
            Ok(_) => tracing::debug!(composite_key = %key, "erp queue entry acknowledged"),
            Err(e) => tracing::warn!(
                composite_key = %key,
                error = %e,
                "failed to acknowledge erp queue entry"
            ),
        }

        if !job.mirror_business_record {
            return;
        }
        let Some(target) = BusinessRecordTarget::for_operation(&job.operation_code) else {
            tracing::warn!(
                operation_code = %job.operation_code,
                doc_num = %job.doc_num,
                "no business table mapped for operation, record update skipped"
            );
            return;
        };
        let update = BusinessRecordUpdate {
            company_database: self.company_database(&job.company_id),
            table: target.table.to_string(),
            status_field: target.status_field.to_string(),
            doc_type_column: target.doc_type_column.to_string(),
            doc_num_column: target.doc_num_column.to_string(),
            doc_type: job.doc_type.clone(),
            doc_num: job.doc_num.clone(),
            value: PENDING_SIGNATURE_VALUE.to_string(),
        };
        if let Err(e) = self.sink.update_business_record(&update).await {
            tracing::warn!(
                table = %update.table,
                doc_num = %job.doc_num,
                error = %e,
                "failed to update erp business record"
            );
        }
    }
}
