use serde::{Deserialize, Serialize};

/// Successful response body: one reply per input row, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReply {
    pub replies: Vec<serde_json::Value>,
}

/// Failure response body shared by every error kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub error_message: String,
}

impl ErrorReply {
    /// Create an error body.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reply_uses_camel_case() {
        let json = serde_json::to_value(ErrorReply::new("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"errorMessage": "boom"}));
    }

    #[test]
    fn batch_reply_shape() {
        let reply = BatchReply {
            replies: vec![serde_json::json!(1), serde_json::Value::Null],
        };
        let json = serde_json::to_value(reply).unwrap();
        assert_eq!(json, serde_json::json!({"replies": [1, null]}));
    }
}
