//! Background Vault health polling.

use crate::ceremony::{CeremonyError, Coordinator};
use crate::config::MonitorConfig;
use crate::vault::{SealHealth, VaultResult};
use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Polls Vault health and warns parties when it goes down or re-seals.
pub struct HealthMonitor {
    coordinator: Coordinator,
    interval: Duration,
    cooldown: chrono::Duration,
}

impl HealthMonitor {
    pub fn new(coordinator: Coordinator, config: &MonitorConfig) -> Self {
        Self {
            coordinator,
            interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            cooldown: chrono::Duration::seconds(config.notify_cooldown_secs as i64),
        }
    }

    /// Poll forever.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Health monitor started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already checked.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// One health check. Returns the alert that was due, if any.
    pub async fn poll_once(&self) -> Option<String> {
        let health = self.coordinator.resource().health().await;
        let message = status_alert(&health)?;

        let recipients = self
            .coordinator
            .parties()
            .claim_status_recipients(self.cooldown, Utc::now());
        debug!(recipients = recipients.len(), "Sending Vault status alert");
        for party in &recipients {
            self.coordinator.notifier().send_to(&party.id, &message).await;
        }

        if matches!(health, Ok(SealHealth { sealed: true, .. })) {
            self.try_auto_unseal().await;
        }

        Some(message)
    }

    async fn try_auto_unseal(&self) {
        if !self.coordinator.vault().is_enabled() {
            return;
        }
        match self.coordinator.auto_unseal().await {
            Ok(()) => info!("Vault auto-unsealed after re-seal"),
            Err(CeremonyError::OtherCeremonyActive { active }) => {
                debug!(ceremony = %active, "Skipping auto-unseal while a ceremony is running")
            }
            Err(CeremonyError::AlreadyUnsealed) => {}
            Err(e) => warn!("Auto-unseal failed: {}", e),
        }
    }
}

/// Alert text for a health result, or `None` when Vault is up and unsealed.
pub fn status_alert(health: &VaultResult<SealHealth>) -> Option<String> {
    match health {
        Err(e) => Some(format!(
            "Vault is down and will restart soon. Here is the error: {}",
            e
        )),
        Ok(h) if h.sealed => Some(format!(
            "Vault restarted. Initialized is {} and Sealed is {}",
            h.initialized, h.sealed
        )),
        Ok(_) => None,
    }
}

/// Human-readable status line for the `vault_status` command.
pub fn status_line(health: &VaultResult<SealHealth>) -> String {
    match health {
        Ok(h) => format!(
            "Current status of the vault: Initialized is {} and Sealed is {}",
            h.initialized, h.sealed
        ),
        Err(e) => format!(
            "Unable to get the status of the vault. Please try again later. Error: {}",
            e
        ),
    }
}
