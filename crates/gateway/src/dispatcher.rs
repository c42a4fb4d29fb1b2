use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::{Map, Value, json};
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, warn};

use rowgate_core::{
    BatchReply, BatchRequest, Correlation, ErrorReply, FunctionName, LogStatus, QuotaViolation,
    RequestError, ScopeKey,
};
use rowgate_usage::UsageError;

use crate::context::{ErrorReport, ErrorReporter, RuntimeContext};
use crate::engine::{CallContext, ComputeError, Computation, panic_message};
use crate::logger::{LogSink, RequestLogger};
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::quota::{QuotaDecision, QuotaPolicy};

/// Maximum characters of failure detail kept in logs and error reports.
pub const MAX_STATUS_INFO_CHARS: usize = 1000;

/// Reference clock for calendar-day scoping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Phases a request moves through. Every request ends in `Responding` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Received,
    QuotaChecking,
    Computing,
    Responding,
    Failed(LogStatus),
}

impl std::fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::QuotaChecking => f.write_str("quota_checking"),
            Self::Computing => f.write_str("computing"),
            Self::Responding => f.write_str("responding"),
            Self::Failed(status) => write!(f, "failed({status})"),
        }
    }
}

/// Why a request did not produce replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// A quota would be exceeded.
    QuotaExceeded(QuotaViolation),
    /// The computation rejected its input.
    Validation(String),
    /// Anything else: store errors, computation errors, panics, bad payloads.
    Unexpected {
        kind: String,
        message: String,
        detail: Option<String>,
    },
}

impl DispatchFailure {
    pub fn unexpected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unexpected {
            kind: kind.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// The terminal log status this failure is reported with.
    #[must_use]
    pub fn status(&self) -> LogStatus {
        match self {
            Self::QuotaExceeded(_) => LogStatus::QuotaError,
            Self::Validation(_) => LogStatus::AssertionError,
            Self::Unexpected { .. } => LogStatus::Error,
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::unexpected("Panic", panic_message(payload))
    }
}

impl From<UsageError> for DispatchFailure {
    fn from(e: UsageError) -> Self {
        Self::Unexpected {
            kind: e.kind().to_owned(),
            message: e.to_string(),
            detail: Some(format!("{e:?}")),
        }
    }
}

impl From<ComputeError> for DispatchFailure {
    fn from(e: ComputeError) -> Self {
        match e {
            ComputeError::Invalid(message) => Self::Validation(message),
            ComputeError::Failed { kind, message } => Self::unexpected(kind, message),
        }
    }
}

impl From<RequestError> for DispatchFailure {
    fn from(e: RequestError) -> Self {
        let kind = e.kind();
        match e {
            RequestError::InvalidPayload(inner) => Self::unexpected(kind, inner.to_string()),
        }
    }
}

/// HTTP status and JSON body for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub status: u16,
    pub body: Value,
}

impl DispatchResponse {
    fn replies(replies: Vec<Value>) -> Self {
        Self {
            status: 200,
            body: json!(BatchReply { replies }),
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: 400,
            body: json!(ErrorReply::new(message)),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// The `errorMessage` of a failed response.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("errorMessage").and_then(Value::as_str)
    }
}

/// Runs the request lifecycle for one function.
///
/// Every call to [`handle`](Self::handle) or [`dispatch`](Self::dispatch)
/// emits exactly one terminal event to the log sink and never fails: all
/// errors become 400 responses.
pub struct Dispatcher {
    pub(crate) function: FunctionName,
    pub(crate) service_name: String,
    pub(crate) quota: QuotaPolicy,
    pub(crate) computation: Computation,
    pub(crate) context: Arc<RuntimeContext>,
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) reporter: Arc<dyn ErrorReporter>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<DispatchMetrics>,
    pub(crate) report_tracker: TaskTracker,
}

impl Dispatcher {
    #[must_use]
    pub fn function(&self) -> &FunctionName {
        &self.function
    }

    #[must_use]
    pub fn quota(&self) -> &QuotaPolicy {
        &self.quota
    }

    #[must_use]
    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Handle a raw request body.
    ///
    /// Bodies that do not parse are answered with an `InvalidPayload` error
    /// and logged with whatever correlating fields could be recovered.
    pub async fn handle(&self, body: &[u8]) -> DispatchResponse {
        match BatchRequest::from_slice(body) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                self.metrics.increment_received();
                let logger = self.logger(Correlation::best_effort(body));
                self.fail(&logger, DispatchFailure::from(e))
            }
        }
    }

    /// Run a parsed request through quota checks and the computation.
    #[instrument(
        name = "dispatcher.dispatch",
        skip_all,
        fields(
            function = %self.function,
            request_id = %request.request_id,
            rows = request.calls.len(),
        )
    )]
    pub async fn dispatch(&self, request: BatchRequest) -> DispatchResponse {
        self.metrics.increment_received();
        debug!(phase = %DispatchPhase::Received);
        let logger = self.logger(request.correlation());
        logger.log(LogStatus::Started, Map::new());

        let row_count = request.row_count();
        match self.run(request).await {
            Ok(replies) => {
                debug!(phase = %DispatchPhase::Responding);
                self.metrics.increment_succeeded();
                self.metrics.add_rows_computed(row_count);
                let response = DispatchResponse::replies(replies);
                logger.log(LogStatus::Success, Map::new());
                response
            }
            Err(failure) => self.fail(&logger, failure),
        }
    }

    async fn run(&self, request: BatchRequest) -> Result<Vec<Value>, DispatchFailure> {
        debug!(phase = %DispatchPhase::QuotaChecking);
        let received_at = self.clock.now();
        let scope = ScopeKey::for_instant(
            request.session_user.clone(),
            self.function.clone(),
            &received_at,
        );
        let decision = self
            .quota
            .check_quotas(&scope, request.row_count(), &request.request_id, received_at)
            .await?;
        if let QuotaDecision::Deny(violation) = decision {
            return Err(DispatchFailure::QuotaExceeded(violation));
        }

        debug!(phase = %DispatchPhase::Computing, mode = self.computation.mode().as_str());
        let ctx = CallContext {
            user_project: request.caller_project().map(str::to_owned),
            request_id: request.request_id,
            user: request.session_user,
            user_defined_context: request.user_defined_context,
            runtime: Arc::clone(&self.context),
        };
        let replies = AssertUnwindSafe(self.computation.run(request.calls, &ctx))
            .catch_unwind()
            .await
            .map_err(|payload| DispatchFailure::from_panic(&*payload))??;
        Ok(replies)
    }

    fn fail(&self, logger: &RequestLogger, failure: DispatchFailure) -> DispatchResponse {
        let status = failure.status();
        debug!(phase = %DispatchPhase::Failed(status));
        match failure {
            DispatchFailure::QuotaExceeded(violation) => {
                self.metrics.increment_quota_denied();
                logger.log_info(status, &format!("{violation}."));
                DispatchResponse::error(self.quota_message(&violation))
            }
            DispatchFailure::Validation(message) => {
                self.metrics.increment_validation_failed();
                logger.log_info(status, &message);
                DispatchResponse::error(message)
            }
            DispatchFailure::Unexpected {
                kind,
                message,
                detail,
            } => {
                self.metrics.increment_unexpected_failed();
                let status_info = truncate_chars(
                    &match detail {
                        Some(d) => format!("{message} --- {d}"),
                        None => message.clone(),
                    },
                    MAX_STATUS_INFO_CHARS,
                );
                logger.log_info(status, &status_info);
                let public = format!("{kind}: {message}");
                warn!(function = %self.function, error = %public, "request failed");
                self.report(logger.correlation(), public.clone(), status_info);
                DispatchResponse::error(public)
            }
        }
    }

    fn quota_message(&self, violation: &QuotaViolation) -> String {
        format!(
            "Thanks for using {}! The use of this function `{}` is limited by quotas. \
             {violation}. To remove this limit, you can ask for quotas increase to `{}` \
             or deploy the function in your own project.",
            self.service_name,
            self.function,
            self.quota.config().contact_or_default(),
        )
    }

    fn report(&self, correlation: &Correlation, message: String, detail: String) {
        let report = ErrorReport {
            function: self.function.to_string(),
            request_id: correlation.request_id.to_string(),
            user: correlation.user.to_string(),
            caller: correlation.caller.clone(),
            message,
            detail,
        };
        let reporter = Arc::clone(&self.reporter);
        self.report_tracker.spawn(async move {
            reporter.report(report).await;
        });
    }

    fn logger(&self, correlation: Correlation) -> RequestLogger {
        RequestLogger::new(self.function.clone(), correlation, Arc::clone(&self.sink))
    }

    /// Wait for in-flight error reports to finish.
    pub async fn shutdown(&self) {
        self.report_tracker.close();
        self.report_tracker.wait().await;
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}
