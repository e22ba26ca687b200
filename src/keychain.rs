//! Credential storage in the OS keychain.

use tracing::debug;

use crate::error::{Error, Result};

/// Read/write access to stored credentials, keyed by account name.
pub trait Keychain: Send + Sync {
  fn get(&self, account: &str) -> Result<String>;

  fn set(&self, account: &str, secret: &str) -> Result<()>;

  fn delete(&self, account: &str) -> Result<()>;
}

/// Keychain backed by `keyring`; the workflow bundle id is the service name.
pub struct KeyringKeychain {
  service: String,
}

impl KeyringKeychain {
  pub fn new(service: impl Into<String>) -> Self {
    Self {
      service: service.into(),
    }
  }

  fn entry(&self, account: &str) -> Result<keyring::Entry> {
    keyring::Entry::new(&self.service, account).map_err(|e| map_keyring_error(account, e))
  }
}

fn map_keyring_error(account: &str, error: keyring::Error) -> Error {
  match error {
    keyring::Error::NoEntry => Error::CredentialNotFound {
      account: account.to_string(),
    },
    source => Error::Keychain {
      account: account.to_string(),
      source,
    },
  }
}

impl Keychain for KeyringKeychain {
  fn get(&self, account: &str) -> Result<String> {
    self
      .entry(account)?
      .get_password()
      .map_err(|e| map_keyring_error(account, e))
  }

  fn set(&self, account: &str, secret: &str) -> Result<()> {
    self
      .entry(account)?
      .set_password(secret)
      .map_err(|e| map_keyring_error(account, e))?;
    debug!("Stored credential in keychain: {}", account);
    Ok(())
  }

  fn delete(&self, account: &str) -> Result<()> {
    self
      .entry(account)?
      .delete_credential()
      .map_err(|e| map_keyring_error(account, e))?;
    debug!("Removed credential from keychain: {}", account);
    Ok(())
  }
}
