pub mod get_history;
pub mod get_pending_tasks;
pub mod ingest_document;
pub mod initiate_workflow;
pub mod process_action;
pub mod verify_history;

pub use get_history::GetHistoryUseCase;
pub use get_pending_tasks::GetPendingTasksUseCase;
pub use ingest_document::{IngestDocumentError, IngestDocumentUseCase, IngestOutcome};
pub use initiate_workflow::{InitiateWorkflowError, InitiateWorkflowInput, InitiateWorkflowUseCase};
pub use process_action::{
    ApprovalAction, ProcessActionError, ProcessActionInput, ProcessActionOutput,
    ProcessActionUseCase,
};
pub use verify_history::{LogVerification, VerifyHistoryUseCase};
