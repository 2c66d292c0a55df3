pub mod acknowledgement;
pub mod config;
pub mod database;
pub mod definition_loader;
pub mod erp_sink;
pub mod telemetry;
