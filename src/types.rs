// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name under which the supervisor's own meta-record is published. No
/// service may use it.
pub const SUPERVISOR_KEY: &str = "supervisor";

/// Identifies one managed service.
///
/// Names are lowercase ASCII alphanumerics plus `_` and `-`, so that command
/// identifiers such as `restart_<name>` can be split unambiguously on their
/// first underscore.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ServiceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("service name must not be empty".to_string());
        }
        if s == SUPERVISOR_KEY {
            return Err(format!("service name '{s}' is reserved"));
        }
        let valid = s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(format!(
                "invalid service name '{s}' (expected lowercase letters, digits, '_' or '-')"
            ));
        }
        Ok(ServiceName(s.to_string()))
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
