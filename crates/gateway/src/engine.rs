//! The user computation a dispatcher fronts.
//!
//! A computation runs in one of two modes fixed when the dispatcher is
//! built: [`RowFunction`]s are called once per row, sequentially and in
//! input order, and the first failing row aborts the batch.
//! [`BatchFunction`]s receive every row at once and must return exactly one
//! reply per row.
//!
//! Synchronous closures wrapped by [`Computation::per_row`] and
//! [`Computation::batch`] run on tokio's blocking pool, never on a runtime
//! worker.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use rowgate_core::{Identity, RequestId, RowArgs};

use crate::context::RuntimeContext;

/// Failure raised by a computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    /// The input violated a precondition. The message is returned to the
    /// caller verbatim.
    #[error("{0}")]
    Invalid(String),

    /// Any other failure, tagged with a short kind name.
    #[error("{kind}: {message}")]
    Failed { kind: String, message: String },
}

impl ComputeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Per-request inputs a computation may read besides its rows.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: RequestId,
    /// End user the query runs as.
    pub user: Identity,
    /// Project of the calling job, when the caller names one.
    pub user_project: Option<String>,
    pub user_defined_context: Option<HashMap<String, String>>,
    pub runtime: Arc<RuntimeContext>,
}

#[async_trait]
pub trait RowFunction: Send + Sync {
    async fn call(&self, args: RowArgs, ctx: &CallContext) -> Result<Value, ComputeError>;
}

#[async_trait]
pub trait BatchFunction: Send + Sync {
    async fn call(&self, rows: Vec<RowArgs>, ctx: &CallContext) -> Result<Vec<Value>, ComputeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    PerRow,
    Batch,
}

impl ComputeMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerRow => "per_row",
            Self::Batch => "batch",
        }
    }
}

/// A computation bound to its mode.
#[derive(Clone)]
pub enum Computation {
    PerRow(Arc<dyn RowFunction>),
    Batch(Arc<dyn BatchFunction>),
}

impl Computation {
    /// Wrap a synchronous per-row closure.
    pub fn per_row<F>(f: F) -> Self
    where
        F: Fn(RowArgs, &CallContext) -> Result<Value, ComputeError> + Send + Sync + 'static,
    {
        Self::PerRow(Arc::new(FnRow(Arc::new(f))))
    }

    /// Wrap a synchronous whole-batch closure.
    pub fn batch<F>(f: F) -> Self
    where
        F: Fn(Vec<RowArgs>, &CallContext) -> Result<Vec<Value>, ComputeError>
            + Send
            + Sync
            + 'static,
    {
        Self::Batch(Arc::new(FnBatch(Arc::new(f))))
    }

    #[must_use]
    pub fn mode(&self) -> ComputeMode {
        match self {
            Self::PerRow(_) => ComputeMode::PerRow,
            Self::Batch(_) => ComputeMode::Batch,
        }
    }

    /// Compute one reply per row, in input order.
    pub async fn run(&self, rows: Vec<RowArgs>, ctx: &CallContext) -> Result<Vec<Value>, ComputeError> {
        match self {
            Self::PerRow(f) => {
                let mut replies = Vec::with_capacity(rows.len());
                for row in rows {
                    replies.push(f.call(row, ctx).await?);
                }
                Ok(replies)
            }
            Self::Batch(f) => {
                let expected = rows.len();
                let replies = f.call(rows, ctx).await?;
                if replies.len() != expected {
                    return Err(ComputeError::failed(
                        "ReplyCountMismatch",
                        format!("expected {expected} replies, got {}", replies.len()),
                    ));
                }
                Ok(replies)
            }
        }
    }
}

impl std::fmt::Debug for Computation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Computation").field(&self.mode()).finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "computation panicked".to_owned()
    }
}

async fn run_blocking<T, G>(work: G) -> Result<T, ComputeError>
where
    G: FnOnce() -> Result<T, ComputeError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        if e.is_panic() {
            ComputeError::failed("Panic", panic_message(&*e.into_panic()))
        } else {
            ComputeError::failed("Cancelled", e.to_string())
        }
    })?
}

struct FnRow<F>(Arc<F>);

#[async_trait]
impl<F> RowFunction for FnRow<F>
where
    F: Fn(RowArgs, &CallContext) -> Result<Value, ComputeError> + Send + Sync + 'static,
{
    async fn call(&self, args: RowArgs, ctx: &CallContext) -> Result<Value, ComputeError> {
        let f = Arc::clone(&self.0);
        let ctx = ctx.clone();
        run_blocking(move || f(args, &ctx)).await
    }
}

struct FnBatch<F>(Arc<F>);

#[async_trait]
impl<F> BatchFunction for FnBatch<F>
where
    F: Fn(Vec<RowArgs>, &CallContext) -> Result<Vec<Value>, ComputeError> + Send + Sync + 'static,
{
    async fn call(&self, rows: Vec<RowArgs>, ctx: &CallContext) -> Result<Vec<Value>, ComputeError> {
        let f = Arc::clone(&self.0);
        let ctx = ctx.clone();
        run_blocking(move || f(rows, &ctx)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use serde_json::json;

    use super::*;

    fn ctx() -> CallContext {
        CallContext {
            request_id: "req".into(),
            user: "alice".into(),
            user_project: Some("proj".into()),
            user_defined_context: None,
            runtime: Arc::new(RuntimeContext::default()),
        }
    }

    fn rows(n: i64) -> Vec<RowArgs> {
        (1..=n).map(|i| RowArgs::new(vec![json!(i)])).collect()
    }

    #[tokio::test]
    async fn per_row_preserves_order() {
        let c = Computation::per_row(|args, _| {
            let n = args.get(0).and_then(Value::as_i64).unwrap_or_default();
            Ok(json!(n * 10))
        });
        assert_eq!(c.mode(), ComputeMode::PerRow);
        let replies = c.run(rows(4), &ctx()).await.unwrap();
        assert_eq!(replies, vec![json!(10), json!(20), json!(30), json!(40)]);
    }

    #[tokio::test]
    async fn per_row_stops_at_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let c = Computation::per_row(move |args, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            match args.get(0).and_then(Value::as_i64) {
                Some(3) => Err(ComputeError::invalid("row 3 is invalid")),
                _ => Ok(Value::Null),
            }
        });
        let err = c.run(rows(5), &ctx()).await.unwrap_err();
        assert_eq!(err, ComputeError::invalid("row 3 is invalid"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn batch_must_reply_once_per_row() {
        let c = Computation::batch(|rows, _| Ok(rows.iter().skip(1).map(|_| json!(1)).collect()));
        let err = c.run(rows(3), &ctx()).await.unwrap_err();
        assert_eq!(
            err,
            ComputeError::failed("ReplyCountMismatch", "expected 3 replies, got 2")
        );
    }

    #[tokio::test]
    async fn batch_sees_context() {
        let c = Computation::batch(|rows, ctx| {
            Ok(rows
                .iter()
                .map(|_| json!(ctx.user_project.clone()))
                .collect())
        });
        assert_eq!(c.mode(), ComputeMode::Batch);
        let replies = c.run(rows(2), &ctx()).await.unwrap();
        assert_eq!(replies, vec![json!("proj"), json!("proj")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn slow_closures_leave_the_runtime_free() {
        let c = Computation::per_row(|_, _| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Value::Null)
        });
        let started = Instant::now();
        let (ctx_a, ctx_b) = (ctx(), ctx());
        let (a, b) = tokio::join!(c.run(rows(1), &ctx_a), c.run(rows(1), &ctx_b));
        a.unwrap();
        b.unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(550),
            "two blocked closures ran back to back: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn closure_panic_becomes_failure() {
        let c = Computation::batch(|_, _| panic!("boom"));
        let err = c.run(rows(2), &ctx()).await.unwrap_err();
        assert_eq!(err, ComputeError::failed("Panic", "boom"));

        let c = Computation::per_row(|_, _| panic!("{}", String::from("owned")));
        let err = c.run(rows(1), &ctx()).await.unwrap_err();
        assert_eq!(err, ComputeError::failed("Panic", "owned"));
    }

    #[test]
    fn error_display() {
        assert_eq!(ComputeError::invalid("bad").to_string(), "bad");
        assert_eq!(
            ComputeError::failed("ValueError", "boom").to_string(),
            "ValueError: boom"
        );
    }
}
