use sealkeeper::{
    bot::{self, DiscordNotifier},
    ceremony::{CeremonyError, CeremonySettings, Coordinator},
    config::AppConfig,
    monitor::HealthMonitor,
    parties::PartyRegistry,
    persistence::ShareVault,
    secrets::Secrets,
    vault::{SealResource, VaultClient},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();

    let json_logs = std::env::var("SEALKEEPER_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealkeeper=debug".into()),
        )
        .with(fmt_layer)
        .init();

    info!("Starting sealkeeper v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        if e.is_fatal() {
            error!("Cannot start: {}", e);
        } else {
            error!("Stopped: {}", e);
        }
        return Err(e.into());
    }
    Ok(())
}

async fn run() -> AppResult<()> {
    let config = AppConfig::init()?;
    info!(
        required_keys = config.ceremony.required_keys,
        total_keys = config.ceremony.total_keys,
        "Configuration loaded"
    );

    let secrets = Secrets::from_env()?;

    let resource: Arc<dyn SealResource> =
        Arc::new(VaultClient::new(&config.vault, secrets.vault_token.clone())?);
    info!(url = %config.vault.url, "Vault client initialized");

    let vault = Arc::new(ShareVault::new(
        config.persistence.record_path(),
        config.persistence.auto_unseal,
    ));
    if let Some(key) = secrets.persistence_key.as_deref() {
        vault.install_key(key, "environment").await?;
    }

    let parties = Arc::new(PartyRegistry::new(config.discord.parties.as_slice()));
    let notifier = Arc::new(DiscordNotifier::new(&secrets.discord_token, parties.clone()));

    let coordinator = Coordinator::new(
        CeremonySettings::from(&config.ceremony),
        resource,
        notifier,
        parties,
        vault,
    );

    startup_auto_unseal(&coordinator).await;

    let monitor = HealthMonitor::new(coordinator.clone(), &config.monitor);
    let monitor_handle = tokio::spawn(monitor.run());

    let result = bot::start_bot(coordinator, &secrets.discord_token, config.discord.guild_id)
        .await
        .map_err(|e| AppError::discord(e.to_string()));

    monitor_handle.abort();
    match &result {
        Ok(()) => info!("Discord bot shut down gracefully"),
        Err(e) => error!("Discord bot error: {}", e),
    }
    result
}

/// Unseal from stored shares if Vault came up sealed.
async fn startup_auto_unseal(coordinator: &Coordinator) {
    if !coordinator.vault().is_enabled() {
        return;
    }
    match coordinator.auto_unseal().await {
        Ok(()) => info!("Vault auto-unsealed at startup"),
        Err(CeremonyError::AlreadyUnsealed) => info!("Vault is already unsealed"),
        Err(e) => warn!("Auto-unseal at startup skipped: {}", e),
    }
}
