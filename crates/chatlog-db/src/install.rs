//! Per-installation storage key.
//!
//! The message log lives under a key generated once per installation
//! (`message_save_{unix_ms}_{random}`) and remembered under
//! `current_storage_key`, so two profiles sharing a backend never write
//! over each other's data.

use rand::distributions::Uniform;
use rand::Rng;
use tracing::{info, warn};

use chatlog_core::defaults::{FILTER_RULES_SUFFIX, STORAGE_KEY_POINTER, STORAGE_KEY_PREFIX};

use crate::backend::{validate_key, StorageBackend};

const TOKEN_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_LEN: usize = 13;

/// Generate a fresh storage key for the given creation time.
pub fn generate_storage_key(now_ms: i64, rng: &mut impl Rng) -> String {
    let dist = Uniform::from(0..TOKEN_ALPHABET.len());
    let token: String = (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.sample(dist)] as char)
        .collect();
    format!("{}_{}_{}", STORAGE_KEY_PREFIX, now_ms, token)
}

/// Key of the filter rule document belonging to a storage key.
pub fn filter_rules_key(storage_key: &str) -> String {
    format!("{}{}", storage_key, FILTER_RULES_SUFFIX)
}

/// Return this installation's storage key, creating it on first use.
///
/// Never fails: a read error falls back to a fresh key, and a key that
/// cannot be remembered is still used for this session.
pub async fn resolve_storage_key(backend: &dyn StorageBackend, now_ms: i64) -> String {
    match backend.get(STORAGE_KEY_POINTER).await {
        Ok(Some(existing)) => {
            let existing = existing.trim();
            if validate_key(existing).is_ok() {
                return existing.to_string();
            }
            warn!(
                storage_key = existing,
                "Stored storage key is invalid, generating a new one"
            );
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to read storage key, generating a new one"),
    }

    let key = generate_storage_key(now_ms, &mut rand::thread_rng());
    match backend.set(STORAGE_KEY_POINTER, &key).await {
        Ok(()) => info!(storage_key = %key, "Created installation storage key"),
        Err(e) => warn!(error = %e, storage_key = %key, "Failed to persist storage key"),
    }
    key
}
