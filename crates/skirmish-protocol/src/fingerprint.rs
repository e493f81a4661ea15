//! State fingerprinting -- FNV-1a over the canonical serialization.
//!
//! Cheap divergence detection between two independently maintained
//! copies of state. Not a trust boundary: collisions are acceptable.

use serde::Serialize;

use crate::canonical::{to_canonical_string, CanonicalError};

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a (32-bit) over the UTF-16 code units of `text`, as lowercase
/// hex. Folding over UTF-16 units keeps fingerprints bit-compatible
/// with JavaScript peers hashing the same canonical string.
pub fn fnv1a_hex(text: &str) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for unit in text.encode_utf16() {
        hash ^= u32::from(unit);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:x}")
}

/// Fingerprint of any serializable value: canonicalize, then hash.
///
/// Canonicalization failures propagate: they indicate a programming
/// error in what is being fingerprinted, not a runtime condition.
pub fn of<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    Ok(fnv1a_hex(&to_canonical_string(value)?))
}
