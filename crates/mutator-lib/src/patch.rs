//! JSON Patch construction

use crate::error::MutatorError;
use json_patch::Patch;
use serde_json::Value;

/// Structural diff from `original` to `mutated`.
///
/// Identical documents yield an empty patch.
pub fn build_patch(original: &Value, mutated: &Value) -> Patch {
    json_patch::diff(original, mutated)
}

/// Serialized patch bytes, or `None` when there is nothing to apply
pub fn encode_patch(patch: &Patch) -> Result<Option<Vec<u8>>, MutatorError> {
    if patch.0.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_vec(patch)?))
}
