use crate::notify::Notifier;
use crate::parties::{PartyId, PartyRegistry};
use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Delivers ceremony messages as Discord direct messages.
///
/// A party can only be reached after it has talked to the bot once, which
/// is when [`PartyRegistry::authorize`] learns its user id.
pub struct DiscordNotifier {
    http: Arc<Http>,
    parties: Arc<PartyRegistry>,
}

impl DiscordNotifier {
    pub fn new(token: &str, parties: Arc<PartyRegistry>) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
            parties,
        }
    }

    async fn deliver(&self, address: u64, text: &str) -> serenity::Result<()> {
        let channel = UserId::new(address).create_dm_channel(&*self.http).await?;
        channel.id.say(&*self.http, text).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send_to(&self, party: &PartyId, text: &str) -> bool {
        let Some(address) = self.parties.get(party).and_then(|p| p.address) else {
            debug!(party = %party, "Party has not contacted the bot yet; cannot deliver");
            return false;
        };
        match self.deliver(address, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(party = %party, "Failed to send direct message: {}", e);
                false
            }
        }
    }

    async fn broadcast(&self, text: &str) {
        for party in self.parties.reachable() {
            self.send_to(&party.id, text).await;
        }
    }
}
