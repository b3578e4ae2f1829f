//! Storage key derivation.

use slipway_protocol::ProjectId;

/// Prefix under which every project's output lives.
pub const OUTPUT_PREFIX: &str = "__outputs";

/// Key an artifact is stored under: `__outputs/{project}/{relative_key}`.
///
/// Depends only on its inputs, so redeploying unchanged output overwrites
/// the same objects.
pub fn storage_key(project: &ProjectId, relative_key: &str) -> String {
    format!(
        "{OUTPUT_PREFIX}/{project}/{}",
        relative_key.trim_start_matches('/')
    )
}
