pub mod general;
pub mod rekey;
pub mod unseal;

pub use general::{help, refresh, start, vault_status};
pub use rekey::{rekey_cancel, rekey_init, rekey_init_keys};
pub use unseal::{auto_unseal, persistence_key, unseal};

use crate::bot::Data;

type Error = Box<dyn std::error::Error + Send + Sync>;

/// Get all registered commands
pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        start(),
        help(),
        vault_status(),
        unseal(),
        rekey_init(),
        rekey_init_keys(),
        rekey_cancel(),
        refresh(),
        auto_unseal(),
        persistence_key(),
    ]
}
