pub mod error;
pub mod quota;
pub mod reply;
pub mod request;
pub mod scope;
pub mod status;
pub mod types;
pub mod usage;

pub use error::RequestError;
pub use quota::{QuotaConfig, QuotaViolation, UsageBackendKind};
pub use reply::{BatchReply, ErrorReply};
pub use request::{BatchRequest, Correlation, RowArgs, caller_project};
pub use scope::ScopeKey;
pub use status::LogStatus;
pub use types::{FunctionName, Identity, RequestId};
pub use usage::{UsageMetric, UsageRecord};
