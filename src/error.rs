use crate::ceremony::CeremonyError;
use crate::persistence::PersistenceError;
use crate::secrets::SecretsError;
use crate::vault::VaultError;
use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing secret: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Ceremony error: {0}")]
    Ceremony(#[from] CeremonyError),

    #[error("Discord error: {0}")]
    Discord(String),
}

impl AppError {
    pub fn discord<S: Into<String>>(msg: S) -> Self {
        Self::Discord(msg.into())
    }

    /// Errors that must stop the process at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Secrets(_) | Self::Persistence(PersistenceError::InvalidKey(_))
        )
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::VAULT_TOKEN_VAR;

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::from(SecretsError::Missing(VAULT_TOKEN_VAR)).is_fatal());
        assert!(AppError::from(config::ConfigError::Message("bad".into())).is_fatal());
        assert!(!AppError::from(PersistenceError::Empty).is_fatal());
        assert!(!AppError::discord("gateway closed").is_fatal());
    }
}
