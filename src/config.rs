use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Vault connection settings. The access token is a secret and lives in
/// [`crate::secrets::Secrets`].
#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    /// Base URL, e.g. `https://vault.internal:8200`
    pub url: String,
    #[serde(default = "default_vault_timeout")]
    pub timeout_secs: u64,
}

fn default_vault_timeout() -> u64 {
    30
}

/// Ceremony sizing and timing.
#[derive(Debug, Deserialize, Clone)]
pub struct CeremonyConfig {
    /// Shares needed to unseal, and the threshold requested on rekey
    pub required_keys: usize,
    /// Shares Vault should mint on rekey; must equal the number of parties
    pub total_keys: usize,
    /// Collection deadline for both unseal and rekey
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Health polls after an unseal before warning that it did not stick
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
    #[serde(default = "default_verify_interval_secs")]
    pub verify_interval_secs: u64,
}

fn default_deadline_secs() -> u64 {
    600
}

fn default_verify_attempts() -> u32 {
    5
}

fn default_verify_interval_secs() -> u64 {
    10
}

impl CeremonyConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn verify_interval(&self) -> Duration {
        Duration::from_secs(self.verify_interval_secs)
    }
}

/// Discord settings (non-sensitive parts only).
#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    /// Usernames of the key holders, in key-distribution order
    pub parties: Vec<String>,
    /// Register commands in this guild only (faster than global registration)
    #[serde(default)]
    pub guild_id: Option<u64>,
}

/// Encrypted share persistence for auto-unseal.
#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    /// Initial value of the operator auto-unseal flag
    #[serde(default)]
    pub auto_unseal: bool,
    /// Directory holding the `unsealkeys` record
    #[serde(default = "default_persistence_path")]
    pub path: PathBuf,
}

fn default_persistence_path() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            auto_unseal: false,
            path: default_persistence_path(),
        }
    }
}

impl PersistenceConfig {
    pub fn record_path(&self) -> PathBuf {
        self.path.join("unsealkeys")
    }
}

/// Background health monitoring.
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Minimum gap between two status alerts to the same party
    #[serde(default = "default_notify_cooldown_secs")]
    pub notify_cooldown_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_notify_cooldown_secs() -> u64 {
    300
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            notify_cooldown_secs: default_notify_cooldown_secs(),
        }
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub vault: VaultConfig,
    pub ceremony: CeremonyConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. SEALKEEPER_VAULT__URL, SEALKEEPER_CEREMONY__REQUIRED_KEYS
            .add_source(
                Environment::with_prefix("SEALKEEPER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("discord.parties")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ceremony = &self.ceremony;
        if self.vault.url.trim().is_empty() {
            return Err(ConfigError::Message("vault.url must be set".into()));
        }
        if ceremony.required_keys == 0 {
            return Err(ConfigError::Message(
                "ceremony.required_keys must be at least 1".into(),
            ));
        }
        if ceremony.required_keys > ceremony.total_keys {
            return Err(ConfigError::Message(format!(
                "ceremony.required_keys ({}) exceeds ceremony.total_keys ({})",
                ceremony.required_keys, ceremony.total_keys
            )));
        }
        if self.discord.parties.len() != ceremony.total_keys {
            return Err(ConfigError::Message(format!(
                "discord.parties lists {} users but ceremony.total_keys is {}",
                self.discord.parties.len(),
                ceremony.total_keys
            )));
        }
        let mut seen = HashSet::new();
        for party in &self.discord.parties {
            if party.trim().is_empty() {
                return Err(ConfigError::Message("discord.parties has an empty name".into()));
            }
            if !seen.insert(party.as_str()) {
                return Err(ConfigError::Message(format!(
                    "discord.parties lists {} twice",
                    party
                )));
            }
        }
        if ceremony.verify_attempts == 0 {
            return Err(ConfigError::Message(
                "ceremony.verify_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Initialize the global config singleton
    pub fn init() -> Result<&'static Self, ConfigError> {
        let config = Self::load()?;
        Ok(CONFIG.get_or_init(|| config))
    }
}
