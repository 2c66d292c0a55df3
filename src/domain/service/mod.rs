pub mod permission_resolver;
pub mod signature_service;
pub mod task_distributor;

pub use permission_resolver::PermissionResolver;
pub use signature_service::SignatureService;
pub use task_distributor::TaskDistributor;
