//! The fixed set of key holders and what we learn about them on first contact.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Identity of a key holder: the configured chat username, case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PartyId(String);

impl PartyId {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key holder.
#[derive(Debug, Clone, Serialize)]
pub struct Party {
    pub id: PartyId,
    /// Display name seen on last contact
    pub label: String,
    /// Transport address for direct messages (a Discord user id); unknown
    /// until the party first talks to the bot
    pub address: Option<u64>,
    /// Last time a throttled status alert went to this party
    pub last_notified: Option<DateTime<Utc>>,
}

/// Registry of recognized parties.
///
/// Entries exist for every configured party from the start and are never
/// removed; first contact fills in the delivery address.
pub struct PartyRegistry {
    order: Vec<PartyId>,
    parties: DashMap<PartyId, Party>,
}

impl PartyRegistry {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let order: Vec<PartyId> = names.iter().map(|n| PartyId::new(n.as_ref())).collect();
        let parties = DashMap::new();
        for (id, name) in order.iter().zip(names) {
            parties.insert(
                id.clone(),
                Party {
                    id: id.clone(),
                    label: name.as_ref().trim().to_string(),
                    address: None,
                    last_notified: None,
                },
            );
        }
        Self { order, parties }
    }

    /// Resolve a chat user to a party, recording the delivery address.
    ///
    /// Returns `None` for users that are not configured parties.
    pub fn authorize(&self, username: &str, address: u64, label: &str) -> Option<PartyId> {
        let id = PartyId::new(username);
        let mut party = self.parties.get_mut(&id)?;
        if party.address != Some(address) {
            info!(party = %id, "Registered delivery address for party");
            party.address = Some(address);
        }
        if !label.is_empty() && party.label != label {
            party.label = label.to_string();
        }
        Some(id)
    }

    pub fn get(&self, id: &PartyId) -> Option<Party> {
        self.parties.get(id).map(|p| p.value().clone())
    }

    /// Every party, in configured order.
    pub fn all(&self) -> Vec<Party> {
        self.order.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Parties that can currently receive messages, in configured order.
    pub fn reachable(&self) -> Vec<Party> {
        self.all().into_iter().filter(|p| p.address.is_some()).collect()
    }

    /// Reachable parties whose last status alert is older than `cooldown`;
    /// their `last_notified` is set to `now`.
    pub fn claim_status_recipients(&self, cooldown: Duration, now: DateTime<Utc>) -> Vec<Party> {
        let mut due = Vec::new();
        for id in &self.order {
            if let Some(mut party) = self.parties.get_mut(id) {
                let ready = party.address.is_some()
                    && party.last_notified.map_or(true, |at| now - at >= cooldown);
                if ready {
                    party.last_notified = Some(now);
                    due.push(party.value().clone());
                }
            }
        }
        due
    }
}

impl fmt::Debug for PartyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartyRegistry")
            .field("parties", &self.order)
            .finish()
    }
}
