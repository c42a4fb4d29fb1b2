pub mod error;
pub mod store;
pub mod testing;

pub use error::UsageError;
pub use store::{Admission, NoopUsageStore, UsageStore};
