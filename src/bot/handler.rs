use crate::bot::{Context, Data, Error, COMMAND_PREFIX};
use crate::ceremony::{CeremonyError, ErrorClass};
use crate::parties::PartyId;
use poise::serenity_prelude::{self as serenity, Message};
use poise::CreateReply;
use tracing::{error, info, warn};

pub const NOT_ALLOWED: &str = "You are not allowed to use this bot";

/// Resolve the command author to a configured party.
pub fn caller(ctx: Context<'_>) -> Option<PartyId> {
    let author = ctx.author();
    let label = author.global_name.as_deref().unwrap_or(&author.name);
    ctx.data()
        .coordinator
        .parties()
        .authorize(&author.name, author.id.get(), label)
}

/// Command check run before every command.
pub async fn authorize(ctx: Context<'_>) -> Result<bool, Error> {
    if caller(ctx).is_some() {
        return Ok(true);
    }
    warn!(user = %ctx.author().name, command = %ctx.command().name, "Rejected command from unknown user");
    reply(ctx, NOT_ALLOWED).await?;
    Ok(false)
}

/// The authenticated party for a command that already passed [`authorize`].
pub fn party(ctx: Context<'_>) -> Result<PartyId, Error> {
    caller(ctx).ok_or_else(|| NOT_ALLOWED.into())
}

/// Reply visible only to the caller.
pub async fn reply(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

/// Reply with a refused or failed ceremony operation.
pub async fn reply_error(ctx: Context<'_>, party: &PartyId, err: &CeremonyError) -> Result<(), Error> {
    match err.class() {
        ErrorClass::UserInput | ErrorClass::Conflict => {
            info!(party = %party, "Operation refused: {}", err)
        }
        ErrorClass::Security => warn!(party = %party, "Security violation: {}", err),
        ErrorClass::Transient => error!(party = %party, "Operation failed: {}", err),
    }
    reply(ctx, err.to_string()).await
}

/// Key material typed into a guild channel is visible to everyone there.
pub fn exposes_key(ctx: Context<'_>) -> bool {
    matches!(ctx, poise::Context::Prefix(_)) && ctx.guild_id().is_some()
}

/// Plain direct messages that are not commands.
pub async fn handle_message(ctx: &serenity::Context, msg: &Message, data: &Data) {
    if msg.author.bot || msg.guild_id.is_some() {
        return;
    }
    if msg.content.trim_start().starts_with(COMMAND_PREFIX) {
        return;
    }

    let label = msg.author.global_name.as_deref().unwrap_or(&msg.author.name);
    let known = data
        .coordinator
        .parties()
        .authorize(&msg.author.name, msg.author.id.get(), label)
        .is_some();

    let text = if known {
        "Only commands are accepted. Use /help to see available commands."
    } else {
        NOT_ALLOWED
    };
    if let Err(e) = msg.channel_id.say(&ctx.http, text).await {
        error!("Failed to answer direct message: {}", e);
    }
}
