use keyring::Entry;
use tracing::warn;

use super::{StoreError, TokenStore};

const SERVICE_NAME: &str = "sitescout";

/// Keychain account holding the session token
const DEFAULT_ACCOUNT: &str = "session-token";

/// Keeps the session token in the OS keychain.
pub struct KeyringTokenStore {
    entry: Entry,
}

impl KeyringTokenStore {
    pub fn new() -> Result<Self, StoreError> {
        Self::for_account(DEFAULT_ACCOUNT)
    }

    /// Store under a specific keychain account (one token per account)
    pub fn for_account(account: &str) -> Result<Self, StoreError> {
        let entry = Entry::new(SERVICE_NAME, account)?;
        Ok(Self { entry })
    }

    #[cfg(test)]
    fn from_entry(entry: Entry) -> Self {
        Self { entry }
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self) -> Option<String> {
        match self.entry.get_password() {
            Ok(token) => Some(token),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn set(&self, token: &str) -> Result<(), StoreError> {
        self.entry.set_password(token)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
