use std::error::Error;
use std::fmt;

use keyring::Entry;
use tracing::debug;

const KEYRING_SERVICE: &str = "chatdesk";

/// Environment variables consulted, in order, when the keyring has nothing.
pub const API_KEY_ENV_VARS: &[&str] = &["CHATDESK_API_KEY", "OPENAI_API_KEY"];

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked or inaccessible).
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

/// Where a resolved API key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Keyring,
    Environment(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub api_key: String,
    pub source: CredentialSource,
}

/// API keys per provider, kept in the platform keyring.
pub struct CredentialStore {
    use_keyring: bool,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self { use_keyring: true }
    }

    /// A store that never touches the platform keyring.
    pub fn env_only() -> Self {
        Self { use_keyring: false }
    }

    pub fn store_token(&self, provider: &str, token: &str) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        let entry = Entry::new(KEYRING_SERVICE, provider)?;
        entry.set_password(token)?;
        Ok(())
    }

    pub fn get_token(&self, provider: &str) -> Result<Option<String>, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(None);
        }
        let entry = Entry::new(KEYRING_SERVICE, provider)?;
        match entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn remove_token(&self, provider: &str) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        let entry = Entry::new(KEYRING_SERVICE, provider)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Keyring first, then the process environment.
    pub fn resolve(&self, provider: &str) -> Result<Option<ResolvedCredential>, KeyringAccessError> {
        self.resolve_with(provider, |name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(
        &self,
        provider: &str,
        env: F,
    ) -> Result<Option<ResolvedCredential>, KeyringAccessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self.get_token(provider) {
            Ok(Some(api_key)) => {
                return Ok(Some(ResolvedCredential {
                    api_key,
                    source: CredentialSource::Keyring,
                }))
            }
            Ok(None) => {}
            // A locked keychain should not hide a usable environment key.
            Err(err) if err.is_recoverable() => {
                debug!(provider, "keyring unavailable: {err}");
            }
            Err(err) => return Err(err),
        }

        Ok(API_KEY_ENV_VARS.iter().find_map(|name| {
            env(name)
                .filter(|value| !value.trim().is_empty())
                .map(|api_key| ResolvedCredential {
                    api_key,
                    source: CredentialSource::Environment(name),
                })
        }))
    }
}
