use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    RequestId,
    "Caller-assigned identifier correlating every event of one batch request."
);
newtype_string!(
    Identity,
    "The end user a batch is executed for; quotas are partitioned by it."
);
newtype_string!(
    FunctionName,
    "Name of the deployed function, used in scope keys and log events."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_from_str() {
        let id = RequestId::from("req-1");
        assert_eq!(id.as_str(), "req-1");
        assert_eq!(&*id, "req-1");
    }

    #[test]
    fn newtype_from_string() {
        let user = Identity::from("alice@example.com".to_string());
        assert_eq!(user.to_string(), "alice@example.com");
    }

    #[test]
    fn newtype_serializes_transparently() {
        let name = FunctionName::new("is_email_valid");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"is_email_valid\"");
    }
}
