use std::sync::Arc;

use uuid::Uuid;

use crate::adapter::soap::{self, ExtractedDocument};
use crate::domain::entity::document_request::DocumentRequest;
use crate::domain::entity::workflow_definition::WorkflowDefinition;
use crate::domain::repository::{OrganizationRepository, WorkflowDefinitionRepository, WorkflowStore};
use crate::infrastructure::acknowledgement::{AcknowledgementJob, AcknowledgementQueue};
use crate::infrastructure::config::IngestionConfig;
use crate::usecase::initiate_workflow::{
    InitiateWorkflowError, InitiateWorkflowInput, InitiateWorkflowUseCase,
};

const ERP_CREATOR_NAME: &str = "System Creator";
const ERP_SUBMIT_COMMENT: &str = "Created via ERP System";

/// IngestOutcome は受信 1 件の処理結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 新しいインスタンスを開始した。
    Started { instance_id: Uuid },
    /// 同じ伝票が既にインスタンスに紐づいていた。
    Duplicate { instance_id: Uuid },
    /// エンベロープを解析できず破棄した。
    Discarded,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestDocumentError {
    #[error("workflow definition not found for operation {operation_code} / form {form_id}")]
    DefinitionNotFound {
        operation_code: String,
        form_id: String,
    },

    #[error(transparent)]
    Initiate(#[from] InitiateWorkflowError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Creator はインスタンス作成者として使う社内 ID と所属。
#[derive(Debug, Clone, PartialEq, Eq)]
struct Creator {
    id: String,
    department_id: i64,
    factory_id: i64,
}

/// IngestDocumentUseCase は ERP から受信した伝票でワークフローを開始する。
///
/// ステージングレコード (doc_type, doc_num) を排他ロックしてから処理するため、
/// 同じ伝票が複数回届いてもインスタンスは 1 つしか作られない。
pub struct IngestDocumentUseCase {
    store: Arc<dyn WorkflowStore>,
    definitions: Arc<dyn WorkflowDefinitionRepository>,
    organization: Arc<dyn OrganizationRepository>,
    initiate: Arc<InitiateWorkflowUseCase>,
    acknowledgements: AcknowledgementQueue,
    settings: IngestionConfig,
}

impl IngestDocumentUseCase {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        definitions: Arc<dyn WorkflowDefinitionRepository>,
        organization: Arc<dyn OrganizationRepository>,
        initiate: Arc<InitiateWorkflowUseCase>,
        acknowledgements: AcknowledgementQueue,
        settings: IngestionConfig,
    ) -> Self {
        Self {
            store,
            definitions,
            organization,
            initiate,
            acknowledgements,
            settings,
        }
    }

    /// 生のエンベロープを処理する。解析できないエンベロープはエラーにせず破棄する。
    pub async fn execute(&self, raw: &[u8]) -> Result<IngestOutcome, IngestDocumentError> {
        let document = match soap::extract(raw) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, "failed to parse erp envelope, document discarded");
                return Ok(IngestOutcome::Discarded);
            }
        };

        tracing::info!(
            company_id = %document.company_id,
            doc_type = %document.doc_type,
            doc_num = %document.doc_num,
            user_id = %document.user_id,
            "erp document received"
        );

        let outcome = self.route(&document).await?;

        let mirror_business_record = matches!(outcome, IngestOutcome::Started { .. });
        self.acknowledgements.enqueue(AcknowledgementJob {
            company_id: document.company_id.clone(),
            operation_code: document.operation_code.clone(),
            doc_type: document.doc_type.clone(),
            doc_num: document.doc_num.clone(),
            mirror_business_record,
        });

        Ok(outcome)
    }

    async fn route(&self, document: &ExtractedDocument) -> Result<IngestOutcome, IngestDocumentError> {
        let payload = document.payload();

        // ロック保持中にプールから別の接続を待たないよう、参照系はトランザクション前に解決する。
        // 定義が無いことは重複判定の後で確定させる。
        let creator = self.resolve_creator(&document.user_id).await;
        let definition = self.resolve_definition(document).await;

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| IngestDocumentError::Internal(e.to_string()))?;

        let draft = DocumentRequest::draft(
            &document.form_id,
            &document.company_id,
            &document.operation_code,
            &document.doc_type,
            &document.doc_num,
            &document.user_id,
            payload.clone(),
        );
        let request = tx
            .lock_or_create_request(&draft)
            .await
            .map_err(|e| IngestDocumentError::Internal(e.to_string()))?;

        if let Some(instance_id) = request.workflow_instance_id {
            tx.commit()
                .await
                .map_err(|e| IngestDocumentError::Internal(e.to_string()))?;
            tracing::info!(
                doc_type = %document.doc_type,
                doc_num = %document.doc_num,
                instance_id = %instance_id,
                "duplicate erp document ignored"
            );
            return Ok(IngestOutcome::Duplicate { instance_id });
        }

        let definition = definition?;

        let input = InitiateWorkflowInput {
            definition_id: definition.id,
            service_code: document.form_id.clone(),
            doc_num: document.doc_num.clone(),
            doc_type: document.doc_type.clone(),
            creator_id: creator.id,
            creator_name: ERP_CREATOR_NAME.to_string(),
            factory_id: creator.factory_id,
            department_id: creator.department_id,
            payload,
            comment: ERP_SUBMIT_COMMENT.to_string(),
            client_ip: Some(self.settings.client_ip.clone()),
            device_info: Some(self.settings.device_info.clone()),
        };
        let instance = self.initiate.execute_in(tx.as_mut(), &input).await?;

        tx.link_request(request.id, instance.id)
            .await
            .map_err(|e| IngestDocumentError::Internal(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| IngestDocumentError::Internal(e.to_string()))?;

        tracing::info!(
            doc_type = %document.doc_type,
            doc_num = %document.doc_num,
            instance_id = %instance.id,
            "workflow started from erp document"
        );
        Ok(IngestOutcome::Started {
            instance_id: instance.id,
        })
    }

    async fn resolve_creator(&self, user_code: &str) -> Creator {
        match self.organization.find_user_by_code(user_code).await {
            Ok(Some(user)) => Creator {
                id: user.id,
                department_id: user.department_id,
                factory_id: user.factory_id,
            },
            Ok(None) => self.fallback_creator(user_code, "user not found"),
            Err(e) => self.fallback_creator(user_code, &e.to_string()),
        }
    }

    fn fallback_creator(&self, user_code: &str, reason: &str) -> Creator {
        tracing::warn!(
            user_code = %user_code,
            fallback_user_id = %self.settings.fallback_user_id,
            reason = %reason,
            "erp user could not be mapped, using fallback identity"
        );
        Creator {
            id: self.settings.fallback_user_id.clone(),
            department_id: self.settings.fallback_department_id,
            factory_id: self.settings.fallback_factory_id,
        }
    }

    /// 業務コードで定義を探し、見つからなければフォーム ID（サービスコード）で探す。
    async fn resolve_definition(
        &self,
        document: &ExtractedDocument,
    ) -> Result<WorkflowDefinition, IngestDocumentError> {
        if !document.operation_code.is_empty() {
            match self
                .definitions
                .find_by_operation_code(&document.operation_code)
                .await
            {
                Ok(Some(def)) => return Ok(def),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    operation_code = %document.operation_code,
                    error = %e,
                    "definition lookup by operation code failed, trying form id"
                ),
            }
        }
        if !document.form_id.is_empty() {
            if let Some(def) = self
                .definitions
                .find_by_service_code(&document.form_id)
                .await
                .map_err(|e| IngestDocumentError::Internal(e.to_string()))?
            {
                return Ok(def);
            }
        }
        Err(IngestDocumentError::DefinitionNotFound {
            operation_code: document.operation_code.clone(),
            form_id: document.form_id.clone(),
        })
    }
}
