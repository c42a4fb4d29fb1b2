use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::warn;

use rowgate_core::{FunctionName, QuotaConfig};
use rowgate_usage::UsageStore;

use crate::context::{ErrorReporter, RuntimeContext, TracingErrorReporter};
use crate::dispatcher::{Clock, Dispatcher, SystemClock};
use crate::engine::Computation;
use crate::error::GatewayError;
use crate::logger::{LogSink, StdoutSink};
use crate::metrics::DispatchMetrics;
use crate::quota::{QuotaBackend, QuotaPolicy};

/// Service name shown in quota messages when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "Rowgate";

/// Fluent builder for constructing a [`Dispatcher`].
///
/// A function name and a [`Computation`] are required. When the quota
/// configuration selects a persistent backend a [`UsageStore`] must be
/// supplied as well. Everything else has a default: stdout log sink,
/// tracing error reporter, system clock and an empty runtime context.
pub struct DispatcherBuilder {
    function: Option<FunctionName>,
    service_name: String,
    quota: QuotaConfig,
    usage_store: Option<Arc<dyn UsageStore>>,
    computation: Option<Computation>,
    context: Option<Arc<RuntimeContext>>,
    sink: Option<Arc<dyn LogSink>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    clock: Option<Arc<dyn Clock>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            function: None,
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            quota: QuotaConfig::default(),
            usage_store: None,
            computation: None,
            context: None,
            sink: None,
            reporter: None,
            clock: None,
        }
    }

    /// Set the name of the fronted function.
    #[must_use]
    pub fn function(mut self, name: impl Into<FunctionName>) -> Self {
        self.function = Some(name.into());
        self
    }

    /// Set the service name shown in quota messages.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    #[must_use]
    pub fn quota_config(mut self, config: QuotaConfig) -> Self {
        self.quota = config;
        self
    }

    /// Set the store daily usage is recorded in.
    #[must_use]
    pub fn usage_store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.usage_store = Some(store);
        self
    }

    #[must_use]
    pub fn computation(mut self, computation: Computation) -> Self {
        self.computation = Some(computation);
        self
    }

    #[must_use]
    pub fn context(mut self, context: Arc<RuntimeContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the sink request lifecycle events are written to.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Override the clock used for calendar-day scoping.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Consume the builder and produce a configured [`Dispatcher`].
    ///
    /// Returns a [`GatewayError::Configuration`] if the function name or
    /// computation is missing, or if a persistent backend is configured
    /// without a usage store.
    pub fn build(self) -> Result<Dispatcher, GatewayError> {
        let function = self
            .function
            .filter(|f| !f.is_empty())
            .ok_or_else(|| GatewayError::Configuration("function name is required".into()))?;

        let computation = self
            .computation
            .ok_or_else(|| GatewayError::Configuration("computation is required".into()))?;

        let backend = if self.quota.backend.is_persistent() {
            let store = self.usage_store.ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "usage store is required for the {} backend",
                    self.quota.backend
                ))
            })?;
            QuotaBackend::Persistent(store)
        } else {
            if self.usage_store.is_some() {
                warn!("usage store supplied but quota backend is none; it will not be used");
            }
            QuotaBackend::NoOp
        };

        if self.quota.daily_limit_ignored() {
            warn!(
                function = %function,
                "max_rows_per_user_per_day is set but the quota backend is none; only \
                 max_rows_per_query is enforced"
            );
        }

        Ok(Dispatcher {
            function,
            service_name: self.service_name,
            quota: QuotaPolicy::new(self.quota, backend),
            computation,
            context: self.context.unwrap_or_default(),
            sink: self.sink.unwrap_or_else(|| Arc::new(StdoutSink)),
            reporter: self.reporter.unwrap_or_else(|| Arc::new(TracingErrorReporter)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            metrics: Arc::new(DispatchMetrics::default()),
            report_tracker: TaskTracker::new(),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use rowgate_core::UsageBackendKind;
    use rowgate_usage_memory::MemoryUsageStore;
    use serde_json::Value;

    use super::*;

    fn echo() -> Computation {
        Computation::per_row(|_, _| Ok(Value::Null))
    }

    #[test]
    fn build_missing_function_returns_error() {
        let result = DispatcherBuilder::new().computation(echo()).build();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("function name is required"));
    }

    #[test]
    fn build_empty_function_returns_error() {
        let result = DispatcherBuilder::new().function("").computation(echo()).build();
        assert!(result.is_err());
    }

    #[test]
    fn build_missing_computation_returns_error() {
        let result = DispatcherBuilder::new().function("f").build();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("computation is required"));
    }

    #[test]
    fn persistent_backend_requires_store() {
        let config = QuotaConfig {
            backend: UsageBackendKind::Postgres,
            ..QuotaConfig::default()
        };
        let result = DispatcherBuilder::new()
            .function("f")
            .computation(echo())
            .quota_config(config)
            .build();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("usage store is required for the postgres backend"));
    }

    #[test]
    fn build_with_store_uses_persistent_backend() {
        let config = QuotaConfig {
            backend: UsageBackendKind::Memory,
            max_rows_per_user_per_day: Some(10),
            ..QuotaConfig::default()
        };
        let dispatcher = DispatcherBuilder::new()
            .function("f")
            .computation(echo())
            .quota_config(config)
            .usage_store(Arc::new(MemoryUsageStore::new()))
            .build()
            .unwrap();
        assert!(matches!(dispatcher.quota().backend(), QuotaBackend::Persistent(_)));
        assert_eq!(dispatcher.quota().backend().label(), "memory");
    }

    #[test]
    fn none_backend_is_noop() {
        let dispatcher = DispatcherBuilder::new()
            .function("f")
            .computation(echo())
            .usage_store(Arc::new(MemoryUsageStore::new()))
            .build()
            .unwrap();
        assert!(matches!(dispatcher.quota().backend(), QuotaBackend::NoOp));
        assert_eq!(dispatcher.function().as_str(), "f");
    }
}
