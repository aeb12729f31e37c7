//! Supabase secrets in the OS credential store.
//!
//! Backed by the `keyring` crate: DPAPI on Windows, Keychain on macOS, the
//! Secret Service API on Linux. Flags and environment variables take
//! precedence (see [`crate::config`]); the store is the fallback for
//! long-running installs where the anon key should not sit in a unit file.

use keyring::Entry;
use tracing::{info, warn};
use zeroize::Zeroizing;

const SERVICE_NAME: &str = "cafe-export";

/// A secret this service keeps in the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Secret {
    SupabaseUrl,
    SupabaseAnonKey,
}

impl Secret {
    pub const ALL: [Secret; 2] = [Secret::SupabaseUrl, Secret::SupabaseAnonKey];

    /// Account name of the keyring entry.
    pub fn key(self) -> &'static str {
        match self {
            Secret::SupabaseUrl => "supabase_url",
            Secret::SupabaseAnonKey => "supabase_anon_key",
        }
    }

    /// Setting name used in configuration errors.
    pub fn label(self) -> &'static str {
        match self {
            Secret::SupabaseUrl => "URL",
            Secret::SupabaseAnonKey => "anon key",
        }
    }
}

fn entry(secret: Secret) -> Result<Entry, keyring::Error> {
    Entry::new(SERVICE_NAME, secret.key())
}

/// Read `secret`. A missing entry and a store that cannot be reached both
/// yield `None`; the latter is logged.
pub fn load(secret: Secret) -> Option<Zeroizing<String>> {
    let read = entry(secret).and_then(|e| e.get_password());
    match read {
        Ok(value) if value.trim().is_empty() => None,
        Ok(value) => Some(Zeroizing::new(value)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key = secret.key(), error = %e, "keyring: failed to read credential");
            None
        }
    }
}

fn save(secret: Secret, value: &str) -> Result<(), String> {
    entry(secret)
        .and_then(|e| e.set_password(value))
        .map_err(|e| format!("keyring: failed to store {}: {e}", secret.key()))
}

/// Delete `secret`. Succeeds when there is nothing to delete.
fn remove(secret: Secret) -> Result<(), String> {
    match entry(secret).and_then(|e| e.delete_credential()) {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(format!("keyring: failed to delete {}: {e}", secret.key())),
    }
}

/// Persist the Supabase project URL (normalised) and anon key.
pub fn store_supabase_credentials(url: &str, anon_key: &str) -> Result<(), String> {
    let url = crate::config::normalize_supabase_url(url);
    if url.is_empty() {
        return Err("Missing required field: url".to_string());
    }
    let anon_key = anon_key.trim();
    if anon_key.is_empty() {
        return Err("Missing required field: anon key".to_string());
    }
    save(Secret::SupabaseUrl, &url)?;
    save(Secret::SupabaseAnonKey, anon_key)?;
    info!(url = %url, "supabase credentials stored");
    Ok(())
}

/// Delete every stored secret.
pub fn clear_credentials() -> Result<(), String> {
    info!("deleting stored supabase credentials");
    Secret::ALL.into_iter().try_for_each(remove)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_keys_are_distinct() {
        assert_eq!(Secret::SupabaseUrl.key(), "supabase_url");
        assert_eq!(Secret::SupabaseAnonKey.key(), "supabase_anon_key");
        assert_eq!(Secret::SupabaseAnonKey.label(), "anon key");
    }

    #[test]
    fn test_store_rejects_blank_values_before_touching_keyring() {
        assert_eq!(
            store_supabase_credentials("  ", "key").unwrap_err(),
            "Missing required field: url"
        );
        assert_eq!(
            store_supabase_credentials("demo.supabase.co", " ").unwrap_err(),
            "Missing required field: anon key"
        );
    }
}
