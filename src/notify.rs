use crate::parties::PartyId;
use async_trait::async_trait;

/// Outbound side of the chat transport.
///
/// Delivery failures are logged by the implementation and never surface to
/// the coordinator: a party that cannot be reached must not stall a ceremony.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text` to one party. Returns whether it was delivered.
    async fn send_to(&self, party: &PartyId, text: &str) -> bool;

    /// Send `text` to every reachable party.
    async fn broadcast(&self, text: &str);
}
