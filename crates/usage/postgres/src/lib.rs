pub mod config;
pub mod migrations;
pub mod store;

pub use config::PostgresUsageConfig;
pub use store::PostgresUsageStore;
