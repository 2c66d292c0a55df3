pub mod organization_repository;
pub mod workflow_definition_repository;
pub mod workflow_store;

pub use organization_repository::OrganizationRepository;
pub use workflow_definition_repository::WorkflowDefinitionRepository;
pub use workflow_store::{WorkflowStore, WorkflowTransaction};
