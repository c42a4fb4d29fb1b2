pub mod config;
pub mod scripts;
pub mod store;

pub use config::RedisUsageConfig;
pub use store::RedisUsageStore;
