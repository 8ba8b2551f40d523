//! Access configuration
//!
//! The ini-style knobs that influence the access protocol. Hosts can embed the
//! struct in their own configuration files; every field has a default so a
//! partial document is accepted.

use crate::core::value::Name;
use serde::{Deserialize, Serialize};

/// E_ALL
pub const E_ALL: u32 = 32767;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Bitmask of error levels delivered to the sink (`error_reporting` ini)
    pub error_reporting: u32,
    /// Class of objects created by EnsureObject autovivification
    pub autovivify_class: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            error_reporting: E_ALL,
            autovivify_class: "stdClass".to_string(),
        }
    }
}

impl AccessConfig {
    pub(crate) fn autovivify_class_name(&self) -> Name {
        Name::from(self.autovivify_class.as_str())
    }
}
