use serde::{Deserialize, Serialize};

/// What an absent, non-required object field without a default decodes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsentPolicy {
    /// Leave the field out of the decoded object.
    #[default]
    Omit,
    /// Record an explicit null, for optional (nullable) fields only.
    Null,
}

/// Decoding behavior shared by every codec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    pub absent: AbsentPolicy,
    /// Reject object fields the schema does not declare instead of ignoring them.
    pub deny_unknown_fields: bool,
}
