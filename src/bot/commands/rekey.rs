use crate::bot::handler::{exposes_key, party, reply, reply_error};
use crate::bot::Data;
use crate::ceremony::RekeyOutcome;

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Start a rekey of the vault
#[poise::command(slash_command, prefix_command)]
pub async fn rekey_init(ctx: Context<'_>) -> Result<(), Error> {
    let party = party(ctx)?;
    ctx.defer_ephemeral().await?;

    match ctx.data().coordinator.start_rekey(&party).await {
        Ok(snapshot) => {
            reply(
                ctx,
                format!(
                    "Rekey process started. {} key holders must provide their key with /rekey_init_keys \"key\".",
                    snapshot.required
                ),
            )
            .await
        }
        Err(e) => reply_error(ctx, &party, &e).await,
    }
}

/// Provide your current unseal key for the running rekey
#[poise::command(slash_command, prefix_command)]
pub async fn rekey_init_keys(
    ctx: Context<'_>,
    #[description = "Your current unseal key"] key: String,
) -> Result<(), Error> {
    let party = party(ctx)?;
    if exposes_key(ctx) {
        return reply(
            ctx,
            "Keys must not be posted in a channel. Send the command to me in a direct message or use the slash command.",
        )
        .await;
    }
    ctx.defer_ephemeral().await?;

    match ctx.data().coordinator.submit_rekey_share(&party, &key).await {
        Ok(RekeyOutcome::Recorded { count, required }) => {
            reply(ctx, format!("Received rekey key: {}/{}", count, required)).await
        }
        Ok(RekeyOutcome::Rekeyed(report)) => {
            let mut text = String::from("Vault rekey process successfully completed.");
            if report.delivered.contains(&party) {
                text.push_str(" Your new key has been sent to you by direct message.");
            }
            if !report.persisted && ctx.data().coordinator.vault().is_enabled() {
                text.push_str(" The new keys were not stored for auto-unseal.");
            }
            reply(ctx, text).await
        }
        Err(e) => reply_error(ctx, &party, &e).await,
    }
}

/// Cancel the running rekey
#[poise::command(slash_command, prefix_command)]
pub async fn rekey_cancel(ctx: Context<'_>) -> Result<(), Error> {
    let party = party(ctx)?;
    ctx.defer_ephemeral().await?;

    match ctx.data().coordinator.cancel_rekey(&party).await {
        Ok(outcome) => {
            let text = match outcome.external_error {
                None => "Rekey process has been canceled.".to_string(),
                Some(e) => format!(
                    "Local rekey state has been reset, but the vault did not confirm the cancellation: {}",
                    e
                ),
            };
            reply(ctx, text).await
        }
        Err(e) => reply_error(ctx, &party, &e).await,
    }
}
