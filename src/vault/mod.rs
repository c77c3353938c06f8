//! Adapter for the secret-management server (HashiCorp Vault).
//!
//! The coordinator only sees the [`SealResource`] trait. It hides the
//! init/update/finalize handshake behind typed outcomes so callers branch on
//! [`RekeyInit`] and [`RekeyProgress`] instead of inspecting error strings.

pub mod client;
pub mod types;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

pub use client::VaultClient;
pub use types::{HealthResponse, RekeyStatusResponse};

/// Errors talking to Vault.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vault returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected Vault response: {0}")]
    Decode(String),

    #[error("Vault reported a rekey in progress but returned no nonce")]
    MissingNonce,
}

pub type VaultResult<T> = Result<T, VaultError>;

/// Seal state as reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealHealth {
    pub initialized: bool,
    pub sealed: bool,
}

/// Rekey status as reported by `GET /sys/rekey/init`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RekeyStatus {
    pub started: bool,
    pub nonce: String,
    pub progress: u32,
    pub required: u32,
}

/// Outcome of asking Vault to begin a rekey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RekeyInit {
    /// A new rekey was started and this nonce identifies it.
    Started { nonce: String },
    /// Vault already has a rekey running. Shares should be submitted against it.
    AlreadyInProgress,
    /// Vault refused the request.
    Rejected(String),
}

/// Shares minted by a completed rekey.
#[derive(Clone, PartialEq, Eq)]
pub struct NewShares {
    pub keys: Vec<String>,
    pub keys_base64: Vec<String>,
}

impl NewShares {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Drop for NewShares {
    fn drop(&mut self) {
        self.keys.zeroize();
        self.keys_base64.zeroize();
    }
}

impl fmt::Debug for NewShares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewShares")
            .field("count", &self.keys.len())
            .finish_non_exhaustive()
    }
}

/// Outcome of submitting one share to a running rekey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RekeyProgress {
    /// Vault accepted the share and wants more.
    Pending { progress: u32, required: u32 },
    /// Vault reached its threshold and minted new shares.
    Complete(NewShares),
}

/// The operations the coordinator needs from the sealed resource.
#[async_trait]
pub trait SealResource: Send + Sync {
    /// Current initialized/sealed state.
    async fn health(&self) -> VaultResult<SealHealth>;

    /// Submit every share in order. Any non-success response aborts.
    async fn unseal(&self, shares: &[String]) -> VaultResult<()>;

    /// Current rekey status.
    async fn rekey_status(&self) -> VaultResult<RekeyStatus>;

    /// Begin a rekey producing `total` shares with threshold `required`.
    async fn rekey_init(&self, total: usize, required: usize) -> VaultResult<RekeyInit>;

    /// Submit one existing share to the rekey identified by `nonce`.
    async fn rekey_update(&self, share: &str, nonce: &str) -> VaultResult<RekeyProgress>;

    /// Cancel any running rekey. Cancelling when none is running succeeds.
    async fn rekey_cancel(&self) -> VaultResult<()>;
}
