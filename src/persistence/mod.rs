//! Encrypted at-rest storage of unseal shares for auto-unseal.
//!
//! Storage is gated twice: the operator auto-unseal flag must be on and an
//! encryption key must have been supplied (from the environment or once over
//! chat). Without either, calls return [`PersistenceError::Disabled`] and
//! touch nothing on disk.
//!
//! The record is one line per share, each line an independently sealed
//! share (see [`cipher`]). Loading is all-or-nothing: one bad line fails the
//! whole load.

pub mod cipher;

pub use cipher::{CipherError, ShareCipher};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Why persistence is currently a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledReason {
    /// The operator auto-unseal flag is off
    FlagOff,
    /// No encryption key has been supplied
    NoKey,
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlagOff => f.write_str("auto-unseal is not enabled"),
            Self::NoKey => f.write_str("no persistence key has been provided"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Persistence disabled: {0}")]
    Disabled(DisabledReason),

    #[error("Persistence key was already provided by {provider}")]
    KeyAlreadySet { provider: String },

    #[error("Invalid persistence key: {0}")]
    InvalidKey(CipherError),

    #[error("Share record I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Share record has no entries")]
    Empty,

    #[error("Share record entry {line} is unreadable: {source}")]
    Corrupt { line: usize, source: CipherError },

    #[error("Failed to encrypt share: {0}")]
    Encrypt(CipherError),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

struct KeySlot {
    cipher: ShareCipher,
    provider: String,
}

/// Gated, encrypted share store backed by a single file.
pub struct ShareVault {
    record_path: PathBuf,
    enabled: AtomicBool,
    key: RwLock<Option<KeySlot>>,
}

impl ShareVault {
    pub fn new(record_path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            record_path: record_path.into(),
            enabled: AtomicBool::new(enabled),
            key: RwLock::new(None),
        }
    }

    /// Create a vault with a key already installed.
    pub fn with_cipher(
        record_path: impl Into<PathBuf>,
        enabled: bool,
        cipher: ShareCipher,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            record_path: record_path.into(),
            enabled: AtomicBool::new(enabled),
            key: RwLock::new(Some(KeySlot {
                cipher,
                provider: provider.into(),
            })),
        }
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the operator auto-unseal flag.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "Auto-unseal flag changed");
    }

    pub async fn has_key(&self) -> bool {
        self.key.read().await.is_some()
    }

    /// Install the encryption key. Only the first key is accepted.
    pub async fn install_key(&self, encoded: &str, provider: &str) -> PersistenceResult<()> {
        let mut slot = self.key.write().await;
        if let Some(existing) = slot.as_ref() {
            return Err(PersistenceError::KeyAlreadySet {
                provider: existing.provider.clone(),
            });
        }
        let cipher = ShareCipher::from_base64(encoded).map_err(PersistenceError::InvalidKey)?;
        *slot = Some(KeySlot {
            cipher,
            provider: provider.to_string(),
        });
        info!(provider, "Persistence key installed");
        Ok(())
    }

    /// Reason persistence is disabled, if it is.
    pub async fn disabled_reason(&self) -> Option<DisabledReason> {
        if !self.is_enabled() {
            Some(DisabledReason::FlagOff)
        } else if !self.has_key().await {
            Some(DisabledReason::NoKey)
        } else {
            None
        }
    }

    /// Encrypt `shares` and atomically replace the record.
    pub async fn store(&self, shares: &[String]) -> PersistenceResult<usize> {
        if !self.is_enabled() {
            return Err(PersistenceError::Disabled(DisabledReason::FlagOff));
        }
        let guard = self.key.read().await;
        let slot = guard
            .as_ref()
            .ok_or(PersistenceError::Disabled(DisabledReason::NoKey))?;

        let sealed = shares
            .iter()
            .map(|share| slot.cipher.seal(share))
            .collect::<Result<Vec<_>, _>>()
            .map_err(PersistenceError::Encrypt)?;
        drop(guard);

        if let Some(dir) = self.record_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let tmp = self.record_path.with_extension("tmp");
        tokio::fs::write(&tmp, sealed.join("\n")).await?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.record_path).await?;

        info!(
            shares = sealed.len(),
            path = %self.record_path.display(),
            "Stored encrypted unseal shares"
        );
        Ok(sealed.len())
    }

    /// Read and decrypt every stored share, failing closed on any bad entry.
    pub async fn load(&self) -> PersistenceResult<Vec<String>> {
        if !self.is_enabled() {
            return Err(PersistenceError::Disabled(DisabledReason::FlagOff));
        }
        let guard = self.key.read().await;
        let slot = guard
            .as_ref()
            .ok_or(PersistenceError::Disabled(DisabledReason::NoKey))?;

        debug!(path = %self.record_path.display(), "Loading encrypted unseal shares");
        let data = tokio::fs::read_to_string(&self.record_path).await?;

        let mut shares = Vec::new();
        for (index, line) in data.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            match slot.cipher.open(line) {
                Ok(plain) => shares.push(plain.as_str().to_string()),
                Err(source) => {
                    warn!(line = index + 1, "Stored share failed to decrypt, refusing to load");
                    return Err(PersistenceError::Corrupt {
                        line: index + 1,
                        source,
                    });
                }
            }
        }

        if shares.is_empty() {
            return Err(PersistenceError::Empty);
        }
        Ok(shares)
    }
}

impl fmt::Debug for ShareVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareVault")
            .field("record_path", &self.record_path)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
