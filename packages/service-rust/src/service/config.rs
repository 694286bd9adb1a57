use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_core::{CodecOptions, WireFormat};

use super::error::StatusTable;

/// Dispatcher configuration, supplied by the transport adapter.
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Response format when the caller states no acceptable format.
    pub default_format: WireFormat,
    /// Absent-field policy and unknown-field handling for every decode.
    pub codec: CodecOptions,
    /// Largest accepted request body. `None` disables the limit.
    pub max_body_bytes: Option<usize>,
    /// Per-call timeout applied by the pipeline's timeout layer.
    pub call_timeout_ms: Option<u64>,
    /// Whether the detail attached to a declared error reaches the caller.
    pub expose_declared_details: bool,
    pub statuses: StatusTable,
}

impl DispatchConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed JSON or mistyped fields.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_format: WireFormat::Json,
            codec: CodecOptions::default(),
            max_body_bytes: Some(1024 * 1024),
            call_timeout_ms: Some(30_000),
            expose_declared_details: true,
            statuses: StatusTable::http(),
        }
    }
}
