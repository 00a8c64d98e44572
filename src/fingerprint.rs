//! Short, stable identifiers for batches of source locators.
//!
//! The fingerprint is derived from counts and lengths only, never from the
//! full content, so it is cheap for very large batches. Two batches with the
//! same shape share a fingerprint; it only disambiguates scratch file names.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Number of hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 8;

/// Derives an 8-character hexadecimal fingerprint from a batch of sources.
///
/// # Errors
///
/// Returns [`Error::EmptyInput`] if `sources` is empty.
pub fn fingerprint<S: AsRef<str>>(sources: &[S]) -> Result<String> {
    let (Some(first), Some(last)) = (sources.first(), sources.last()) else {
        return Err(Error::EmptyInput);
    };
    let middle = &sources[sources.len() / 2];
    let total: usize = sources.iter().map(|s| s.as_ref().len()).sum();

    let shape = format!(
        "{}-{}-{}-{}-{}",
        sources.len(),
        first.as_ref().len(),
        last.as_ref().len(),
        middle.as_ref().len(),
        total
    );

    let digest = Sha256::digest(shape.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(FINGERPRINT_LEN);
    Ok(hex)
}
