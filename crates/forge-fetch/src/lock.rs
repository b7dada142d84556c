//! Lock verification
//!
//! Compares a previously recorded locator (e.g. from a lock file) with the
//! result of a fresh fetch. Any difference here is fatal, unlike the warning
//! issued when a forge's reported tree hash disagrees with a download.

use crate::error::FetchError;
use crate::locator::Locator;

/// Fail if `final_locator` contradicts anything pinned in `specified`
pub fn check_locks(specified: &Locator, final_locator: &Locator) -> Result<(), FetchError> {
    if let Some(expected) = specified.tree_hash() {
        if final_locator.tree_hash() != Some(expected) {
            return Err(FetchError::TreeHashMismatch {
                input: final_locator.to_string(),
                expected: expected.to_hex(),
            });
        }
    }

    if let Some(expected) = specified.rev() {
        if final_locator.rev() != Some(expected) {
            return Err(mismatch(
                final_locator,
                "rev",
                expected.to_hex(),
                final_locator.rev().map(|rev| rev.to_hex()),
            ));
        }
    }

    if let Some(expected) = specified.last_modified() {
        if final_locator.last_modified() != Some(expected) {
            return Err(mismatch(
                final_locator,
                "lastModified",
                expected.to_string(),
                final_locator.last_modified().map(|t| t.to_string()),
            ));
        }
    }

    // NAR hashes are computed by the caller; only compare once one is known
    if let (Some(expected), Some(actual)) = (specified.nar_hash(), final_locator.nar_hash()) {
        if expected != actual {
            return Err(mismatch(
                final_locator,
                "narHash",
                expected.to_string(),
                Some(actual.to_string()),
            ));
        }
    }

    Ok(())
}

fn mismatch(
    final_locator: &Locator,
    attribute: &'static str,
    expected: String,
    actual: Option<String>,
) -> FetchError {
    FetchError::LockMismatch {
        input: final_locator.to_string(),
        attribute,
        expected,
        actual: actual.unwrap_or_else(|| "<none>".to_string()),
    }
}
