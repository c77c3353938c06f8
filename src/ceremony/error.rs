use crate::ceremony::share_text::ShareTextError;
use crate::ceremony::CeremonyKind;
use crate::parties::PartyId;
use crate::persistence::PersistenceError;
use crate::vault::VaultError;
use thiserror::Error;

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input; nothing changed, re-prompt the party
    UserInput,
    /// Rejected because of current ceremony state; nothing changed
    Conflict,
    /// Duplicate share across parties; the ceremony was reset
    Security,
    /// Vault unreachable or failing; resubmit
    Transient,
}

/// Every way a ceremony operation can be refused or fail.
#[derive(Debug, Error)]
pub enum CeremonyError {
    #[error("Invalid key format: {0}. Send it as /{1} \"key\".")]
    InvalidShare(ShareTextError, &'static str),

    #[error("Another ceremony ({active}) is in progress. Finish or cancel it first.")]
    OtherCeremonyActive { active: CeremonyKind },

    #[error("You have already provided a key for this {kind}. Ask the other key holders to provide theirs.")]
    AlreadySubmitted { kind: CeremonyKind },

    #[error("The {kind} is being finalized. Please wait for the result.")]
    Finalizing { kind: CeremonyKind },

    #[error("The vault is already unsealed.")]
    AlreadyUnsealed,

    #[error("The vault is sealed. Unseal it before rekeying.")]
    Sealed,

    #[error("A rekey is already in progress. Provide your key with /rekey_init_keys or stop it with /rekey_cancel.")]
    RekeyAlreadyActive,

    #[error("Rekey process has not been started yet. Start it with /rekey_init.")]
    RekeyNotStarted,

    #[error("No rekey process is currently active.")]
    NoActiveRekey,

    #[error("Received the same key from {first} and {second}. This looks like a violation of key custody; the ceremony has been reset. Please talk to your administrator.")]
    SecurityViolation { first: PartyId, second: PartyId },

    #[error("Unable to reach the vault: {0}. Please try again.")]
    Unavailable(#[source] VaultError),

    #[error("Error unsealing Vault: {0}. Please send the unseal keys again.")]
    UnsealFailed(#[source] VaultError),

    #[error("Error updating rekey process: {0}. Please start the rekey again.")]
    RekeyFailed(String),

    #[error("Stored shares could not be used: {0}")]
    Persistence(#[from] PersistenceError),
}

impl CeremonyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidShare(..) => ErrorClass::UserInput,
            Self::OtherCeremonyActive { .. }
            | Self::AlreadySubmitted { .. }
            | Self::Finalizing { .. }
            | Self::AlreadyUnsealed
            | Self::Sealed
            | Self::RekeyAlreadyActive
            | Self::RekeyNotStarted
            | Self::NoActiveRekey => ErrorClass::Conflict,
            Self::SecurityViolation { .. } => ErrorClass::Security,
            Self::Unavailable(_)
            | Self::UnsealFailed(_)
            | Self::RekeyFailed(_)
            | Self::Persistence(_) => ErrorClass::Transient,
        }
    }
}

pub type CeremonyResult<T> = Result<T, CeremonyError>;
