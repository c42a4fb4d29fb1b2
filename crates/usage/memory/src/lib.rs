pub mod store;

pub use store::MemoryUsageStore;
