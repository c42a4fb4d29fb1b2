pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod functions;
pub mod gcp;
pub mod telemetry;
pub mod usage_factory;
