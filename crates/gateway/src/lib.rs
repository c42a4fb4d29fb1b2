//! Request dispatch for a single gateway-fronted function.
//!
//! A [`Dispatcher`] owns the whole lifecycle of one batch request: parse,
//! quota check against an optional [`UsageStore`](rowgate_usage::UsageStore),
//! computation, and the mapping of every outcome to exactly one terminal log
//! event and one wire response.

pub mod builder;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod quota;

pub use builder::DispatcherBuilder;
pub use context::{
    ErrorReport, ErrorReporter, IdentitySource, RuntimeContext, SecretSource, TracingErrorReporter,
};
pub use dispatcher::{
    Clock, DispatchFailure, DispatchPhase, DispatchResponse, Dispatcher, SystemClock,
};
pub use engine::{BatchFunction, CallContext, ComputeError, ComputeMode, Computation, RowFunction};
pub use error::{CollaboratorError, GatewayError};
pub use logger::{LogSink, MemorySink, RequestLogger, StdoutSink};
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use quota::{QuotaBackend, QuotaDecision, QuotaPolicy};
