pub mod commands;
pub mod handler;
pub mod notifier;

pub use notifier::DiscordNotifier;

use crate::ceremony::Coordinator;
use poise::serenity_prelude::{self as serenity, FullEvent, GatewayIntents};
use tracing::{error, info};

/// Shared data accessible in all commands
#[derive(Debug)]
pub struct Data {
    pub coordinator: Coordinator,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Prefix for text commands sent by direct message.
pub const COMMAND_PREFIX: &str = "!";

/// Event handler for Discord events
async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!("Bot is ready! Logged in as {}", data_about_bot.user.name);
        }
        FullEvent::Message { new_message } => {
            handler::handle_message(ctx, new_message, data).await;
        }
        _ => {}
    }
    Ok(())
}

/// Create and configure the Discord bot framework
pub fn create_framework(
    coordinator: Coordinator,
    guild_id: Option<u64>,
) -> poise::Framework<Data, Error> {
    poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all_commands(),
            command_check: Some(|ctx| Box::pin(handler::authorize(ctx))),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Command error: {}", error);
                            let _ = handler::reply(ctx, format!("An error occurred: {}", error)).await;
                        }
                        poise::FrameworkError::ArgumentParse { error, ctx, .. } => {
                            let _ = handler::reply(
                                ctx,
                                format!("Could not read the command arguments: {}. Use /help.", error),
                            )
                            .await;
                        }
                        poise::FrameworkError::Setup { error, .. } => {
                            error!("Setup error: {}", error);
                        }
                        err => {
                            if let Err(e) = poise::builtins::on_error(err).await {
                                error!("Error while handling error: {}", e);
                            }
                        }
                    }
                })
            },
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(COMMAND_PREFIX.into()),
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                let commands = &framework.options().commands;
                match guild_id {
                    Some(id) => {
                        poise::builtins::register_in_guild(ctx, commands, serenity::GuildId::new(id))
                            .await?;
                        info!(guild_id = id, "Registered {} slash commands in guild", commands.len());
                    }
                    None => {
                        poise::builtins::register_globally(ctx, commands).await?;
                        info!("Registered {} slash commands globally", commands.len());
                    }
                }
                Ok(Data { coordinator })
            })
        })
        .build()
}

/// Connect to Discord and serve commands until the gateway closes.
pub async fn start_bot(
    coordinator: Coordinator,
    token: &str,
    guild_id: Option<u64>,
) -> Result<(), Error> {
    if token.is_empty() {
        return Err("Discord token is empty".into());
    }

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let framework = create_framework(coordinator, guild_id);

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting Discord bot...");
    client.start().await?;

    Ok(())
}
