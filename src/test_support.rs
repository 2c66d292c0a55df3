//! テスト用インメモリ構成とヘルパー。
//! ユースケースの単体テストと統合テスト（tests/approval_api_test.rs）から利用する。

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use secrecy::SecretString;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::adapter::handler::AppState;
use crate::adapter::repository::{
    InMemoryDefinitionRepository, InMemoryOrganizationRepository, InMemoryWorkflowStore,
};
use crate::domain::entity::workflow_definition::WorkflowDefinition;
use crate::domain::entity::workflow_step::{AssignmentKind, StepAssignment, WorkflowStep};
use crate::domain::repository::WorkflowStore;
use crate::domain::service::{PermissionResolver, SignatureService};
use crate::infrastructure::acknowledgement::{AcknowledgementJob, AcknowledgementQueue};
use crate::infrastructure::config::IngestionConfig;
use crate::usecase::{
    GetHistoryUseCase, GetPendingTasksUseCase, IngestDocumentUseCase, InitiateWorkflowInput,
    InitiateWorkflowUseCase, ProcessActionUseCase, VerifyHistoryUseCase,
};

pub const TEST_SIGNATURE_SECRET: &str = "test-signature-secret";

/// InMemoryHarness はストア・定義・組織をインメモリで束ねる。
pub struct InMemoryHarness {
    pub definitions: Arc<InMemoryDefinitionRepository>,
    pub organization: Arc<InMemoryOrganizationRepository>,
    pub store_impl: Arc<InMemoryWorkflowStore>,
    pub store: Arc<dyn WorkflowStore>,
}

impl InMemoryHarness {
    pub fn new() -> Self {
        let definitions = Arc::new(InMemoryDefinitionRepository::new());
        let organization = Arc::new(InMemoryOrganizationRepository::new());
        let store_impl = Arc::new(InMemoryWorkflowStore::new(definitions.clone()));
        let store: Arc<dyn WorkflowStore> = store_impl.clone();
        Self {
            definitions,
            organization,
            store_impl,
            store,
        }
    }
}

impl Default for InMemoryHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn signature_service() -> Arc<SignatureService> {
    let secret = SecretString::new(TEST_SIGNATURE_SECRET.to_string());
    Arc::new(SignatureService::new(&secret).expect("test signature service"))
}

/// 購買申請（PURI05）の定義を作る。各ステップにユーザー割当を 1 件ずつ持つ。
pub fn definition_with_steps(steps: &[(i32, &str)]) -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new("WEITWPURI05", "PURI05", "Purchase requisition");
    def.steps = steps
        .iter()
        .map(|(order, user)| {
            let mut step =
                WorkflowStep::new(def.id, format!("S{order}"), format!("Step {order}"), *order);
            step.assignments = vec![StepAssignment::new(step.id, AssignmentKind::User, *user)];
            step
        })
        .collect();
    def
}

pub fn initiate_input(definition_id: Uuid, doc_num: &str) -> InitiateWorkflowInput {
    InitiateWorkflowInput {
        definition_id,
        service_code: String::new(),
        doc_num: doc_num.to_string(),
        doc_type: "3101".to_string(),
        creator_id: "creator-1".to_string(),
        creator_name: "Creator One".to_string(),
        factory_id: 1,
        department_id: 1,
        payload: serde_json::json!({ "amount": 1200, "currency": "JPY" }),
        comment: "please review".to_string(),
        client_ip: Some("127.0.0.1".to_string()),
        device_info: None,
    }
}

/// ERP が送るのと同じ形の SOAP エンベロープ（pPara は CDATA 内の base64）を作る。
pub fn erp_envelope(
    operation_code: &str,
    form_id: &str,
    user_id: &str,
    doc_type: &str,
    doc_num: &str,
) -> String {
    let where_clause = if doc_num.is_empty() {
        format!("TA001 = '{doc_type}'")
    } else {
        format!("TA001 = '{doc_type}' AND TA002 = '{doc_num}'")
    };
    let inner = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><Root>\
         <CompanyId>LEADER</CompanyId><FormId>{form_id}</FormId>\
         <ComPRID>{operation_code}</ComPRID><UserId>{user_id}</UserId>\
         <WhereClause>{where_clause}</WhereClause></Root>"
    );
    let encoded = STANDARD.encode(inner);
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <invokeSrv xmlns="http://tempuri.org/">
      <pPara><![CDATA[{encoded}]]></pPara>
    </invokeSrv>
  </soap:Body>
</soap:Envelope>"#
    )
}

/// インメモリ構成の AppState を作る。受信通知キューの受信側も返す。
pub fn make_test_app_state(harness: &InMemoryHarness) -> (AppState, mpsc::Receiver<AcknowledgementJob>) {
    let signer = signature_service();
    let (queue, receiver) = AcknowledgementQueue::new(64);
    let initiate = Arc::new(InitiateWorkflowUseCase::new(harness.store.clone(), signer.clone()));

    let state = AppState {
        initiate_workflow_uc: initiate.clone(),
        process_action_uc: Arc::new(ProcessActionUseCase::new(
            harness.store.clone(),
            PermissionResolver::new(harness.organization.clone()),
            signer.clone(),
        )),
        get_pending_tasks_uc: Arc::new(GetPendingTasksUseCase::new(
            harness.store.clone(),
            PermissionResolver::new(harness.organization.clone()),
        )),
        get_history_uc: Arc::new(GetHistoryUseCase::new(harness.store.clone())),
        verify_history_uc: Arc::new(VerifyHistoryUseCase::new(harness.store.clone(), signer)),
        ingest_document_uc: Arc::new(IngestDocumentUseCase::new(
            harness.store.clone(),
            harness.definitions.clone(),
            harness.organization.clone(),
            initiate,
            queue,
            IngestionConfig::default(),
        )),
    };
    (state, receiver)
}
