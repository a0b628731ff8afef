//! Strongly-typed identifiers.
//!
//! IDs are validated at construction time and implement common traits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `new()` (UUID v4), `from_string()`, `as_str()`, Display,
/// `From<&str>`, Serialize, Deserialize.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        /// Caller-supplied ids; an empty string gets a generated id instead.
        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s.to_string()).unwrap_or_default()
            }
        }
    };
}

define_id!(RequestId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_rejects_empty() {
        assert!(RequestId::from_string(String::new()).is_err());
        assert_eq!(RequestId::from_string("req-1".into()).unwrap().as_str(), "req-1");
    }

    #[test]
    fn test_from_empty_str_generates() {
        let id = RequestId::from("");
        assert!(!id.as_str().is_empty());
        assert_eq!(RequestId::from("job").to_string(), "job");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&RequestId::from("job")).unwrap();
        assert_eq!(json, "\"job\"");
    }
}
