pub mod definition_in_memory;
pub mod definition_postgres;
pub mod organization_in_memory;
pub mod organization_postgres;
pub mod workflow_store_in_memory;
pub mod workflow_store_postgres;

pub use definition_in_memory::InMemoryDefinitionRepository;
pub use definition_postgres::PostgresDefinitionRepository;
pub use organization_in_memory::InMemoryOrganizationRepository;
pub use organization_postgres::PostgresOrganizationRepository;
pub use workflow_store_in_memory::InMemoryWorkflowStore;
pub use workflow_store_postgres::PostgresWorkflowStore;
