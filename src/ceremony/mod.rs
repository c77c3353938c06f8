//! Unseal and rekey ceremonies.
//!
//! A ceremony collects one share from each of `required_keys` distinct
//! parties, then hands the whole set to Vault in one finalize step:
//!
//! ```text
//!            first share / rekey_init        quorum reached
//!   Idle ─────────────────────────▶ Collecting ───────────────▶ Finalizing
//!    ▲                                 │  deadline, cancel,          │
//!    │                                 │  duplicate share            │ success or failure
//!    └─────────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! Unseal and rekey are mutually exclusive: while one is Collecting or
//! Finalizing the other cannot start.

pub mod coordinator;
pub mod error;
pub mod share_text;
pub mod shares;
pub mod timer;

pub use coordinator::{
    CancelOutcome, CeremonySettings, CeremonySnapshot, Coordinator, RefreshOutcome, RekeyOutcome,
    RekeyReport, UnsealOutcome,
};
pub use error::{CeremonyError, CeremonyResult, ErrorClass};
pub use share_text::{parse_share, ShareTextError};
pub use shares::{RecordOutcome, ShareStore};
pub use timer::DeadlineTimer;

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyKind {
    Unseal,
    Rekey,
}

impl CeremonyKind {
    /// Chat command a party uses to submit a share for this ceremony.
    pub fn share_command(&self) -> &'static str {
        match self {
            Self::Unseal => "unseal",
            Self::Rekey => "rekey_init_keys",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Unseal => Self::Rekey,
            Self::Rekey => Self::Unseal,
        }
    }
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unseal => f.write_str("unseal"),
            Self::Rekey => f.write_str("rekey"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyStatus {
    Idle,
    Collecting,
    Finalizing,
}

impl CeremonyStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}
