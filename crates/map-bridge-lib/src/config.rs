//! Session configuration

use serde::{Deserialize, Serialize};

/// What `create` does when the caller supplies an identifier that is already registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateIdPolicy {
    /// Fail with `DuplicateIdentifier`; engine and registry are left untouched
    #[default]
    Reject,
    /// Dispose the existing manager, then create the new one under the same identifier
    Replace,
}

/// Configuration for one map session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Length of identifiers generated for managers created without an `id`
    pub generated_id_length: usize,
    /// Handling of caller-supplied identifiers that collide with a live manager
    pub duplicate_id_policy: DuplicateIdPolicy,
    /// Map events (`style-loaded`, `render-frame-started`) forwarded from session start
    pub event_types: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            generated_id_length: 5,
            duplicate_id_policy: DuplicateIdPolicy::Reject,
            event_types: Vec::new(),
        }
    }
}
