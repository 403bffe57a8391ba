//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of tenant and message identifiers
//! and make the code more self-documenting.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a pending message, as assigned by the remote API.
///
/// The remote API emits ids as JSON numbers, but older dedup files and some
/// deployments use strings, so both forms are accepted on input. Integral
/// floats such as `1.0` are read as the integer they hold; any other float
/// is rejected. Ids are always written back out as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(s: impl Into<String>) -> Self {
        MessageId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
            Float(f64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => MessageId(s),
            Raw::Unsigned(n) => MessageId(n.to_string()),
            Raw::Signed(n) => MessageId(n.to_string()),
            Raw::Float(f) => MessageId(integral_float(f).ok_or_else(|| {
                serde::de::Error::custom(format!("message id {f} is not an integer"))
            })?),
        })
    }
}

/// Formats a finite, whole float as an integer id.
fn integral_float(f: f64) -> Option<String> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    if f >= 0.0 && f <= u64::MAX as f64 {
        Some((f as u64).to_string())
    } else if f < 0.0 && f >= i64::MIN as f64 {
        Some((f as i64).to_string())
    } else {
        None
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        MessageId(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_string())
    }
}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        MessageId(n.to_string())
    }
}

/// An organizational tenant (a school) whose messages are relayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(s: impl Into<String>) -> Self {
        TenantId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId(s.to_string())
    }
}
