use crate::bot::handler::{party, reply};
use crate::bot::Data;
use crate::ceremony::{CeremonyKind, CeremonySnapshot, CeremonyStatus};
use crate::monitor::status_line;

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

const COMMANDS: &str = "Available commands:\n\
    /vault_status - show whether the vault is sealed\n\
    /unseal \"key\" - provide your unseal key\n\
    /rekey_init - start a rekey\n\
    /rekey_init_keys \"key\" - provide your current key for the rekey\n\
    /rekey_cancel - cancel the running rekey\n\
    /refresh - discard all ongoing processes\n\
    /auto_unseal true|false - store keys for automatic unsealing\n\
    /persistence_key \"key\" - provide the key used to encrypt stored keys\n\
    /help - show this message";

/// Introduce the bot
#[poise::command(slash_command, prefix_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    let vault = ctx.data().coordinator.vault();
    let mut text = String::from(
        "Welcome to sealkeeper! I coordinate unsealing and rekeying the vault \
        between its key holders. Use /help to see available commands.",
    );
    if vault.is_enabled() && !vault.has_key().await {
        text.push_str(
            "\n\nAuto-unseal is enabled but no persistence key is set. \
            Provide one with /persistence_key \"key\".",
        );
    }
    reply(ctx, text).await
}

/// List available commands
#[poise::command(slash_command, prefix_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    reply(ctx, COMMANDS).await
}

/// Show the vault seal status and any running ceremony
#[poise::command(slash_command, prefix_command)]
pub async fn vault_status(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let coordinator = &ctx.data().coordinator;

    let health = coordinator.resource().health().await;
    let mut text = status_line(&health);

    for kind in [CeremonyKind::Unseal, CeremonyKind::Rekey] {
        if let Some(line) = ceremony_line(&coordinator.snapshot(kind).await) {
            text.push('\n');
            text.push_str(&line);
        }
    }

    let vault = coordinator.vault();
    text.push_str(match vault.disabled_reason().await {
        None => "\nAuto-unseal: enabled",
        Some(_) if vault.is_enabled() => "\nAuto-unseal: enabled, waiting for a persistence key",
        Some(_) => "\nAuto-unseal: disabled",
    });

    reply(ctx, text).await
}

/// Discard every ongoing process
#[poise::command(slash_command, prefix_command)]
pub async fn refresh(ctx: Context<'_>) -> Result<(), Error> {
    let party = party(ctx)?;
    ctx.defer_ephemeral().await?;

    let outcome = ctx.data().coordinator.refresh(&party).await;
    let text = match outcome.rekey_error {
        None => "Bot has been refreshed. All ongoing processes have been discarded.".to_string(),
        Some(e) => format!(
            "Bot has been refreshed. All ongoing processes have been discarded except the rekey process on the vault: {}",
            e
        ),
    };
    reply(ctx, text).await
}

fn ceremony_line(snapshot: &CeremonySnapshot) -> Option<String> {
    let name = match snapshot.kind {
        CeremonyKind::Unseal => "Unseal",
        CeremonyKind::Rekey => "Rekey",
    };
    match snapshot.status {
        CeremonyStatus::Idle => None,
        CeremonyStatus::Collecting => {
            let mut line = format!(
                "{} in progress: {}/{} keys received",
                name, snapshot.submitted, snapshot.required
            );
            if let Some(deadline) = snapshot.deadline {
                line.push_str(&format!(", expires at {}", deadline.format("%H:%M:%S UTC")));
            }
            Some(line)
        }
        CeremonyStatus::Finalizing => Some(format!("{} is being finalized", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceremony_line() {
        let mut snapshot = CeremonySnapshot {
            kind: CeremonyKind::Rekey,
            status: CeremonyStatus::Idle,
            id: None,
            submitted: 0,
            required: 3,
            deadline: None,
        };
        assert!(ceremony_line(&snapshot).is_none());

        snapshot.status = CeremonyStatus::Collecting;
        snapshot.submitted = 2;
        assert_eq!(
            ceremony_line(&snapshot).unwrap(),
            "Rekey in progress: 2/3 keys received"
        );
    }
}
