//! Credentials read from the environment.
//!
//! Kept apart from [`crate::config::AppConfig`] so they never pass through
//! config files or `Debug` output. Values are zeroized on drop.

use std::env;
use thiserror::Error;
use zeroize::Zeroize;

pub const DISCORD_TOKEN_VAR: &str = "SEALKEEPER_DISCORD_TOKEN";
pub const VAULT_TOKEN_VAR: &str = "SEALKEEPER_VAULT_TOKEN";
pub const PERSISTENCE_KEY_VAR: &str = "SEALKEEPER_PERSISTENCE_KEY";

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
}

/// Secrets needed at startup.
pub struct Secrets {
    /// Discord bot token
    pub discord_token: String,
    /// Vault token used for the rekey endpoints
    pub vault_token: String,
    /// Optional base64 key for encrypting persisted shares
    pub persistence_key: Option<String>,
}

impl Secrets {
    /// Read secrets from the process environment.
    pub fn from_env() -> Result<Self, SecretsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read secrets through `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SecretsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            discord_token: read(DISCORD_TOKEN_VAR).ok_or(SecretsError::Missing(DISCORD_TOKEN_VAR))?,
            vault_token: read(VAULT_TOKEN_VAR).ok_or(SecretsError::Missing(VAULT_TOKEN_VAR))?,
            persistence_key: read(PERSISTENCE_KEY_VAR),
        })
    }
}

impl Drop for Secrets {
    fn drop(&mut self) {
        self.discord_token.zeroize();
        self.vault_token.zeroize();
        if let Some(ref mut key) = self.persistence_key {
            key.zeroize();
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("persistence_key", &self.persistence_key.is_some())
            .finish_non_exhaustive()
    }
}
