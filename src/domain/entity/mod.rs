pub mod document_request;
pub mod org_user;
pub mod workflow_definition;
pub mod workflow_instance;
pub mod workflow_log;
pub mod workflow_step;
pub mod workflow_task;
