use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::types::{Identity, RequestId};

/// Extracts the calling project from the `caller` resource name.
static CALLER_PROJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bigquery.googleapis.com/projects/([^/]*)/").expect("caller project pattern")
});

/// Positional arguments of one row, matching the function's declared arity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowArgs(Vec<serde_json::Value>);

impl RowArgs {
    /// Create a row from its positional values.
    #[must_use]
    pub fn new(values: Vec<serde_json::Value>) -> Self {
        Self(values)
    }

    /// Return the argument at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&serde_json::Value> {
        self.0.get(index)
    }

    /// Number of positional arguments in this row.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Consume the row and return its values.
    #[must_use]
    pub fn into_inner(self) -> Vec<serde_json::Value> {
        self.0
    }
}

impl From<Vec<serde_json::Value>> for RowArgs {
    fn from(values: Vec<serde_json::Value>) -> Self {
        Self(values)
    }
}

impl std::ops::Deref for RowArgs {
    type Target = [serde_json::Value];

    fn deref(&self) -> &[serde_json::Value] {
        &self.0
    }
}

/// One batch of function calls as delivered by the warehouse.
///
/// The wire shape is the remote-function protocol: camelCase keys, `calls`
/// holding one positional argument array per row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Identifier the caller assigned to this batch.
    pub request_id: RequestId,
    /// Full resource name of the calling job.
    pub caller: String,
    /// End user the query runs as.
    pub session_user: Identity,
    /// Rows to compute, in order.
    pub calls: Vec<RowArgs>,
    /// Static key/value context configured on the function definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_defined_context: Option<HashMap<String, String>>,
}

impl BatchRequest {
    /// Create a request with the required fields and no user-defined context.
    #[must_use]
    pub fn new(
        request_id: impl Into<RequestId>,
        caller: impl Into<String>,
        session_user: impl Into<Identity>,
        calls: Vec<RowArgs>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            caller: caller.into(),
            session_user: session_user.into(),
            calls,
            user_defined_context: None,
        }
    }

    /// Parse a request from a raw JSON body.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Number of rows in the batch.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.calls.len() as u64
    }

    /// Project id embedded in the caller resource name, if any.
    #[must_use]
    pub fn caller_project(&self) -> Option<&str> {
        caller_project(&self.caller)
    }

    /// The fields every log event of this request is correlated by.
    #[must_use]
    pub fn correlation(&self) -> Correlation {
        Correlation {
            request_id: self.request_id.clone(),
            caller: self.caller.clone(),
            user: self.session_user.clone(),
            row_count: self.row_count(),
        }
    }
}

/// Extract the project id from a caller resource name.
#[must_use]
pub fn caller_project(caller: &str) -> Option<&str> {
    CALLER_PROJECT
        .captures(caller)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Correlating fields shared by every log event of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    pub request_id: RequestId,
    pub caller: String,
    pub user: Identity,
    pub row_count: u64,
}

impl Correlation {
    /// Recover whatever correlating fields a malformed body still carries.
    ///
    /// Used when the body cannot be parsed into a [`BatchRequest`]; missing
    /// or mistyped fields fall back to empty values and a zero row count.
    #[must_use]
    pub fn best_effort(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
            return Self::default();
        };
        let text = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let row_count = value
            .get("calls")
            .and_then(serde_json::Value::as_array)
            .map_or(0, |calls| calls.len() as u64);

        Self {
            request_id: RequestId::new(text("requestId")),
            caller: text("caller"),
            user: Identity::new(text("sessionUser")),
            row_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const CALLER: &str =
        "//bigquery.googleapis.com/projects/acme-analytics/jobs/job_123?location=EU";

    fn body() -> serde_json::Value {
        json!({
            "requestId": "req-1",
            "caller": CALLER,
            "sessionUser": "alice@example.com",
            "calls": [[1, "a"], [2, "b"], [3, "c"]],
        })
    }

    #[test]
    fn parses_wire_payload() {
        let raw = serde_json::to_vec(&body()).unwrap();
        let req = BatchRequest::from_slice(&raw).unwrap();
        assert_eq!(req.request_id.as_str(), "req-1");
        assert_eq!(req.session_user.as_str(), "alice@example.com");
        assert_eq!(req.row_count(), 3);
        assert_eq!(req.calls[1].get(1), Some(&json!("b")));
        assert!(req.user_defined_context.is_none());
    }

    #[test]
    fn parses_user_defined_context() {
        let mut payload = body();
        payload["userDefinedContext"] = json!({"mode": "strict"});
        let req: BatchRequest = serde_json::from_value(payload).unwrap();
        let ctx = req.user_defined_context.unwrap();
        assert_eq!(ctx.get("mode").map(String::as_str), Some("strict"));
    }

    #[test]
    fn missing_calls_is_rejected() {
        let raw = br#"{"requestId": "r", "caller": "c", "sessionUser": "u"}"#;
        let err = BatchRequest::from_slice(raw).unwrap_err();
        assert_eq!(err.kind(), "InvalidPayload");
    }

    #[test]
    fn extracts_caller_project() {
        assert_eq!(caller_project(CALLER), Some("acme-analytics"));
        assert_eq!(caller_project("no project here"), None);
    }

    #[test]
    fn correlation_from_request() {
        let req: BatchRequest = serde_json::from_value(body()).unwrap();
        let corr = req.correlation();
        assert_eq!(corr.request_id.as_str(), "req-1");
        assert_eq!(corr.row_count, 3);
        assert_eq!(corr.caller, CALLER);
    }

    #[test]
    fn best_effort_correlation_from_partial_body() {
        let corr = Correlation::best_effort(br#"{"requestId": "req-9", "calls": [[1], [2]]}"#);
        assert_eq!(corr.request_id.as_str(), "req-9");
        assert_eq!(corr.row_count, 2);
        assert!(corr.user.is_empty());

        let corr = Correlation::best_effort(b"not json");
        assert_eq!(corr, Correlation::default());
    }
}
