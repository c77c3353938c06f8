use crate::bot::handler::{exposes_key, party, reply, reply_error};
use crate::bot::Data;
use crate::ceremony::UnsealOutcome;
use crate::persistence::PersistenceError;
use tracing::info;

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

const KEY_IN_CHANNEL: &str =
    "Keys must not be posted in a channel. Send the command to me in a direct message or use the slash command.";

/// Provide your unseal key
#[poise::command(slash_command, prefix_command)]
pub async fn unseal(
    ctx: Context<'_>,
    #[description = "Your unseal key"] key: Option<String>,
) -> Result<(), Error> {
    let party = party(ctx)?;
    if exposes_key(ctx) {
        return reply(ctx, KEY_IN_CHANNEL).await;
    }
    ctx.defer_ephemeral().await?;
    let coordinator = &ctx.data().coordinator;

    let Some(key) = key else {
        return match coordinator.start_unseal(&party).await {
            Ok(snapshot) => {
                reply(
                    ctx,
                    format!(
                        "Please provide your unseal key with /unseal \"key\". Keys received so far: {}/{}",
                        snapshot.submitted, snapshot.required
                    ),
                )
                .await
            }
            Err(e) => reply_error(ctx, &party, &e).await,
        };
    };

    match coordinator.submit_unseal_share(&party, &key).await {
        Ok(UnsealOutcome::Recorded { count, required }) => {
            reply(ctx, format!("Received unseal key: {}/{}", count, required)).await
        }
        Ok(UnsealOutcome::Unsealed) => reply(ctx, "Vault unsealed successfully.").await,
        Err(e) => reply_error(ctx, &party, &e).await,
    }
}

/// Enable or disable storing keys for automatic unsealing
#[poise::command(slash_command, prefix_command)]
pub async fn auto_unseal(
    ctx: Context<'_>,
    #[description = "true to enable, false to disable"] enabled: bool,
) -> Result<(), Error> {
    let party = party(ctx)?;
    let vault = ctx.data().coordinator.vault();
    vault.set_enabled(enabled);
    info!(party = %party, enabled, "Auto-unseal toggled");

    if !enabled {
        return reply(ctx, "Auto-Unseal disabled.").await;
    }
    let mut text = String::from("Auto-Unseal enabled. Future unseal keys will be encrypted and stored.");
    if !vault.has_key().await {
        text.push_str(" No persistence key is set yet; provide one with /persistence_key \"key\".");
    }
    reply(ctx, text).await
}

/// Provide the key used to encrypt stored unseal keys
#[poise::command(slash_command, prefix_command)]
pub async fn persistence_key(
    ctx: Context<'_>,
    #[description = "Base64 encoded 32 byte key"] key: String,
) -> Result<(), Error> {
    let party = party(ctx)?;
    if exposes_key(ctx) {
        return reply(ctx, KEY_IN_CHANNEL).await;
    }
    let coordinator = &ctx.data().coordinator;

    match coordinator.vault().install_key(key.trim(), party.as_str()).await {
        Ok(()) => {
            coordinator
                .notifier()
                .broadcast(&format!("The persistence key has been provided by {}.", party))
                .await;
            reply(ctx, "Persistence key set.").await
        }
        Err(e @ PersistenceError::KeyAlreadySet { .. }) => reply(ctx, e.to_string()).await,
        Err(e) => {
            reply(
                ctx,
                format!("{}. Provide a base64 encoded 32 byte key: /persistence_key \"key\"", e),
            )
            .await
        }
    }
}
