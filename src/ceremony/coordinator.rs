use crate::ceremony::error::{CeremonyError, CeremonyResult};
use crate::ceremony::share_text::parse_share;
use crate::ceremony::shares::{RecordOutcome, ShareStore};
use crate::ceremony::timer::DeadlineTimer;
use crate::ceremony::{CeremonyKind, CeremonyStatus};
use crate::config::CeremonyConfig;
use crate::notify::Notifier;
use crate::parties::{PartyId, PartyRegistry};
use crate::persistence::{PersistenceError, ShareVault};
use crate::vault::{NewShares, RekeyInit, RekeyProgress, SealResource, VaultError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Sizing and timing for ceremonies.
#[derive(Debug, Clone)]
pub struct CeremonySettings {
    pub required_keys: usize,
    pub total_keys: usize,
    pub deadline: Duration,
    pub verify_attempts: u32,
    pub verify_interval: Duration,
}

impl From<&CeremonyConfig> for CeremonySettings {
    fn from(config: &CeremonyConfig) -> Self {
        Self {
            required_keys: config.required_keys,
            total_keys: config.total_keys,
            deadline: config.deadline(),
            verify_attempts: config.verify_attempts,
            verify_interval: config.verify_interval(),
        }
    }
}

/// Read-only view of a ceremony.
#[derive(Debug, Clone, Serialize)]
pub struct CeremonySnapshot {
    pub kind: CeremonyKind,
    pub status: CeremonyStatus,
    pub id: Option<Uuid>,
    pub submitted: usize,
    pub required: usize,
    pub deadline: Option<DateTime<Utc>>,
}

/// Successful result of an unseal share submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsealOutcome {
    /// Share recorded, quorum not yet reached.
    Recorded { count: usize, required: usize },
    /// This share completed the unseal.
    Unsealed,
}

/// Successful result of a rekey share submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RekeyOutcome {
    /// Share recorded, quorum not yet reached.
    Recorded { count: usize, required: usize },
    /// This share completed the rekey.
    Rekeyed(RekeyReport),
}

/// What happened to newly minted shares after a rekey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyReport {
    pub minted: usize,
    pub delivered: Vec<PartyId>,
    pub undelivered: Vec<PartyId>,
    pub persisted: bool,
}

/// Result of a rekey cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    /// Error from Vault's cancel call; local state was reset regardless
    pub external_error: Option<String>,
}

/// Result of a full state refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub rekey_error: Option<String>,
}

/// How a finalize was triggered; selects the announcement wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnsealTrigger {
    Interactive,
    Stored,
}

struct Ceremony {
    kind: CeremonyKind,
    status: CeremonyStatus,
    id: Option<Uuid>,
    epoch: u64,
    shares: ShareStore,
    deadline: Option<DateTime<Utc>>,
    nonce: Option<String>,
    timer: DeadlineTimer,
}

impl Ceremony {
    fn new(kind: CeremonyKind) -> Self {
        Self {
            kind,
            status: CeremonyStatus::Idle,
            id: None,
            epoch: 0,
            shares: ShareStore::new(),
            deadline: None,
            nonce: None,
            timer: DeadlineTimer::new(),
        }
    }

    fn begin(&mut self, epoch: u64, status: CeremonyStatus) {
        self.timer.cancel();
        self.shares.clear();
        self.status = status;
        self.epoch = epoch;
        self.id = Some(Uuid::new_v4());
        self.deadline = None;
        self.nonce = None;
        info!(ceremony = %self.kind, id = ?self.id, "Ceremony started");
    }

    fn reset(&mut self) {
        self.timer.cancel();
        self.shares.clear();
        self.status = CeremonyStatus::Idle;
        self.id = None;
        self.deadline = None;
        self.nonce = None;
        debug!(ceremony = %self.kind, "Ceremony state reset");
    }

    fn snapshot(&self, required: usize) -> CeremonySnapshot {
        CeremonySnapshot {
            kind: self.kind,
            status: self.status,
            id: self.id,
            submitted: self.shares.count(),
            required,
            deadline: self.deadline,
        }
    }
}

struct Ceremonies {
    unseal: Ceremony,
    rekey: Ceremony,
    next_epoch: u64,
}

impl Ceremonies {
    fn new() -> Self {
        Self {
            unseal: Ceremony::new(CeremonyKind::Unseal),
            rekey: Ceremony::new(CeremonyKind::Rekey),
            next_epoch: 1,
        }
    }

    fn get(&self, kind: CeremonyKind) -> &Ceremony {
        match kind {
            CeremonyKind::Unseal => &self.unseal,
            CeremonyKind::Rekey => &self.rekey,
        }
    }

    fn get_mut(&mut self, kind: CeremonyKind) -> &mut Ceremony {
        match kind {
            CeremonyKind::Unseal => &mut self.unseal,
            CeremonyKind::Rekey => &mut self.rekey,
        }
    }

    fn epoch(&mut self) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    fn active(&self) -> Option<CeremonyKind> {
        [&self.unseal, &self.rekey]
            .into_iter()
            .find(|c| c.status.is_active())
            .map(|c| c.kind)
    }

    /// Refuse to touch `kind` while the other ceremony is running.
    fn ensure_exclusive(&self, kind: CeremonyKind) -> CeremonyResult<()> {
        let other = kind.other();
        if self.get(other).status.is_active() {
            return Err(CeremonyError::OtherCeremonyActive { active: other });
        }
        Ok(())
    }
}

struct Inner {
    state: Mutex<Ceremonies>,
    resource: Arc<dyn SealResource>,
    notifier: Arc<dyn Notifier>,
    parties: Arc<PartyRegistry>,
    vault: Arc<ShareVault>,
    settings: CeremonySettings,
}

/// Drives unseal and rekey ceremonies.
///
/// All ceremony state sits behind one mutex. It is only held for in-memory
/// bookkeeping, never across a Vault or chat round trip; after every such
/// round trip the state is re-checked (by epoch) before it is changed.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(
        settings: CeremonySettings,
        resource: Arc<dyn SealResource>,
        notifier: Arc<dyn Notifier>,
        parties: Arc<PartyRegistry>,
        vault: Arc<ShareVault>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(Ceremonies::new()),
                resource,
                notifier,
                parties,
                vault,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &CeremonySettings {
        &self.inner.settings
    }

    pub fn resource(&self) -> &Arc<dyn SealResource> {
        &self.inner.resource
    }

    pub fn vault(&self) -> &Arc<ShareVault> {
        &self.inner.vault
    }

    pub fn parties(&self) -> &Arc<PartyRegistry> {
        &self.inner.parties
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }

    pub async fn snapshot(&self, kind: CeremonyKind) -> CeremonySnapshot {
        let state = self.inner.state.lock().await;
        state.get(kind).snapshot(self.inner.settings.required_keys)
    }

    // ---------------------------------------------------------------------
    // Unseal
    // ---------------------------------------------------------------------

    /// Check that `party` may contribute to an unseal right now.
    ///
    /// Unseal has no explicit start: the first accepted share opens the
    /// collection. This performs the same checks without recording anything.
    pub async fn start_unseal(&self, party: &PartyId) -> CeremonyResult<CeremonySnapshot> {
        self.precheck_share(CeremonyKind::Unseal, party).await?;

        let health = self
            .inner
            .resource
            .health()
            .await
            .map_err(CeremonyError::Unavailable)?;
        if !health.sealed {
            return Err(CeremonyError::AlreadyUnsealed);
        }

        Ok(self.snapshot(CeremonyKind::Unseal).await)
    }

    /// Record an unseal share and unseal once quorum is reached.
    pub async fn submit_unseal_share(
        &self,
        party: &PartyId,
        raw: &str,
    ) -> CeremonyResult<UnsealOutcome> {
        let kind = CeremonyKind::Unseal;
        let share = parse_share(raw)
            .map_err(|e| CeremonyError::InvalidShare(e, kind.share_command()))?;

        self.start_unseal(party).await?;

        let required = self.inner.settings.required_keys;
        let (epoch, snapshot) = {
            let mut state = self.inner.state.lock().await;
            state.ensure_exclusive(kind)?;

            if state.unseal.status == CeremonyStatus::Idle {
                let epoch = state.epoch();
                state.unseal.begin(epoch, CeremonyStatus::Collecting);
                self.arm_deadline(&mut state.unseal);
            }

            let ceremony = &mut state.unseal;
            if ceremony.status == CeremonyStatus::Finalizing {
                return Err(CeremonyError::Finalizing { kind });
            }

            let outcome = ceremony.shares.record(party, &share);
            match outcome {
                RecordOutcome::AlreadySubmitted => {
                    return Err(CeremonyError::AlreadySubmitted { kind });
                }
                RecordOutcome::DuplicateValue { first } => {
                    ceremony.reset();
                    drop(state);
                    return Err(self.security_violation(kind, first, party.clone()).await);
                }
                RecordOutcome::Accepted { count } => {
                    info!(ceremony = %kind, party = %party, progress = count, required, "Share accepted");
                    if count < required {
                        return Ok(UnsealOutcome::Recorded { count, required });
                    }
                    // This submission pushed the ceremony past quorum.
                    ceremony.status = CeremonyStatus::Finalizing;
                    ceremony.timer.cancel();
                    ceremony.deadline = None;
                    (ceremony.epoch, Zeroizing::new(ceremony.shares.values()))
                }
            }
        };

        self.finish_unseal(&snapshot, epoch, UnsealTrigger::Interactive)
            .await
            .map(|()| UnsealOutcome::Unsealed)
    }

    /// Unseal from the encrypted share record.
    pub async fn auto_unseal(&self) -> CeremonyResult<()> {
        let shares = Zeroizing::new(self.inner.vault.load().await?);

        let health = self
            .inner
            .resource
            .health()
            .await
            .map_err(CeremonyError::Unavailable)?;
        if !health.sealed {
            return Err(CeremonyError::AlreadyUnsealed);
        }

        let epoch = {
            let mut state = self.inner.state.lock().await;
            if let Some(active) = state.active() {
                return Err(CeremonyError::OtherCeremonyActive { active });
            }
            let epoch = state.epoch();
            state.unseal.begin(epoch, CeremonyStatus::Finalizing);
            epoch
        };

        info!(shares = shares.len(), "Auto-unsealing from stored shares");
        self.finish_unseal(&shares, epoch, UnsealTrigger::Stored).await
    }

    async fn finish_unseal(
        &self,
        shares: &[String],
        epoch: u64,
        trigger: UnsealTrigger,
    ) -> CeremonyResult<()> {
        let result = self.inner.resource.unseal(shares).await;

        self.reset_if_current(CeremonyKind::Unseal, epoch).await;

        match result {
            Ok(()) => {
                let message = match trigger {
                    UnsealTrigger::Interactive => "Vault unsealed successfully.",
                    UnsealTrigger::Stored => "Vault has been successfully auto-unsealed.",
                };
                self.inner.notifier.broadcast(message).await;
                self.spawn_unseal_verification();
                Ok(())
            }
            Err(e) => {
                error!("Error unsealing Vault: {}", e);
                if trigger == UnsealTrigger::Interactive {
                    self.inner
                        .notifier
                        .broadcast("Error unsealing Vault. Please send the unseal keys again.")
                        .await;
                }
                Err(CeremonyError::UnsealFailed(e))
            }
        }
    }

    fn spawn_unseal_verification(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            this.verify_unsealed().await;
        });
    }

    /// Poll Vault until it reports unsealed, announcing the result.
    ///
    /// A 200 from the unseal endpoint does not prove the seal opened (for
    /// instance when `required_keys` is below Vault's real threshold).
    pub async fn verify_unsealed(&self) -> bool {
        let settings = &self.inner.settings;
        for attempt in 1..=settings.verify_attempts {
            tokio::time::sleep(settings.verify_interval).await;
            match self.inner.resource.health().await {
                Ok(health) if !health.sealed => {
                    info!(attempt, "Unseal verified");
                    self.inner
                        .notifier
                        .broadcast("Vault unsealed successfully verified.")
                        .await;
                    return true;
                }
                Ok(_) => debug!(attempt, "Vault still sealed"),
                Err(e) => warn!(attempt, "Error checking Vault status: {}", e),
            }
        }

        warn!(attempts = settings.verify_attempts, "Vault still sealed after unseal");
        self.inner
            .notifier
            .broadcast("Vault is still sealed. The required keys setting might be incorrect.")
            .await;
        false
    }

    // ---------------------------------------------------------------------
    // Rekey
    // ---------------------------------------------------------------------

    /// Open a rekey collection and start the matching rekey on Vault.
    ///
    /// Vault issues the nonce here; shares collected afterwards are all
    /// submitted against it once quorum is reached.
    pub async fn start_rekey(&self, party: &PartyId) -> CeremonyResult<CeremonySnapshot> {
        let kind = CeremonyKind::Rekey;
        {
            let state = self.inner.state.lock().await;
            state.ensure_exclusive(kind)?;
            if state.rekey.status.is_active() {
                return Err(CeremonyError::RekeyAlreadyActive);
            }
        }

        let health = self
            .inner
            .resource
            .health()
            .await
            .map_err(CeremonyError::Unavailable)?;
        if health.sealed {
            return Err(CeremonyError::Sealed);
        }

        // Vault's own view wins: a restart mid-ceremony leaves it running there.
        let status = self
            .inner
            .resource
            .rekey_status()
            .await
            .map_err(CeremonyError::Unavailable)?;
        if status.started {
            info!(progress = status.progress, "Vault already has a rekey running");
            return Err(CeremonyError::RekeyAlreadyActive);
        }

        let settings = &self.inner.settings;
        let init = self
            .inner
            .resource
            .rekey_init(settings.total_keys, settings.required_keys)
            .await
            .map_err(CeremonyError::Unavailable)?;
        let nonce = match init {
            RekeyInit::Started { nonce } => nonce,
            RekeyInit::AlreadyInProgress => {
                info!("Vault started a rekey concurrently");
                return Err(CeremonyError::RekeyAlreadyActive);
            }
            RekeyInit::Rejected(reason) => {
                warn!("Vault refused to start the rekey: {}", reason);
                return Err(CeremonyError::RekeyFailed(reason));
            }
        };

        let opened = {
            let mut state = self.inner.state.lock().await;
            self.open_rekey(&mut state, nonce)
        };
        let snapshot = match opened {
            Ok(snapshot) => snapshot,
            Err(e @ CeremonyError::OtherCeremonyActive { .. }) => {
                // An unseal won the lock meanwhile; don't leave our rekey behind on Vault.
                self.cancel_external_rekey().await;
                return Err(e);
            }
            // A share submission already adopted the rekey we just started.
            Err(e) => return Err(e),
        };

        info!(party = %party, "Rekey collection opened");
        self.inner
            .notifier
            .broadcast(&format!(
                "Rekey process has begun (started by {}). Please provide your unseal key using /rekey_init_keys \"key\": 0/{}",
                party, snapshot.required
            ))
            .await;

        Ok(snapshot)
    }

    fn open_rekey(&self, state: &mut Ceremonies, nonce: String) -> CeremonyResult<CeremonySnapshot> {
        state.ensure_exclusive(CeremonyKind::Rekey)?;
        if state.rekey.status.is_active() {
            return Err(CeremonyError::RekeyAlreadyActive);
        }
        let epoch = state.epoch();
        state.rekey.begin(epoch, CeremonyStatus::Collecting);
        state.rekey.nonce = Some(nonce);
        self.arm_deadline(&mut state.rekey);
        Ok(state.rekey.snapshot(self.inner.settings.required_keys))
    }

    /// Take over a rekey Vault is running that this process holds no collection for.
    async fn adopt_external_rekey(&self) -> CeremonyResult<()> {
        {
            let state = self.inner.state.lock().await;
            state.ensure_exclusive(CeremonyKind::Rekey)?;
            if state.rekey.status.is_active() {
                return Ok(());
            }
        }

        let status = self
            .inner
            .resource
            .rekey_status()
            .await
            .map_err(CeremonyError::Unavailable)?;
        if !status.started {
            return Err(CeremonyError::RekeyNotStarted);
        }
        if status.nonce.is_empty() {
            return Err(CeremonyError::RekeyFailed(VaultError::MissingNonce.to_string()));
        }

        let required = {
            let mut state = self.inner.state.lock().await;
            if state.rekey.status.is_active() {
                return Ok(());
            }
            self.open_rekey(&mut state, status.nonce)?.required
        };

        info!(progress = status.progress, "Resuming rekey already running on Vault");
        self.inner
            .notifier
            .broadcast(&format!(
                "Resuming the rekey already in progress on the vault. Please provide your unseal key using /rekey_init_keys \"key\": 0/{}",
                required
            ))
            .await;
        Ok(())
    }

    /// Record a rekey share and drive the Vault handshake once quorum is reached.
    pub async fn submit_rekey_share(
        &self,
        party: &PartyId,
        raw: &str,
    ) -> CeremonyResult<RekeyOutcome> {
        let kind = CeremonyKind::Rekey;
        let share = parse_share(raw)
            .map_err(|e| CeremonyError::InvalidShare(e, kind.share_command()))?;

        self.adopt_external_rekey().await?;

        let required = self.inner.settings.required_keys;
        let (epoch, nonce, snapshot) = {
            let mut state = self.inner.state.lock().await;
            state.ensure_exclusive(kind)?;

            let ceremony = &mut state.rekey;
            match ceremony.status {
                CeremonyStatus::Idle => return Err(CeremonyError::RekeyNotStarted),
                CeremonyStatus::Finalizing => return Err(CeremonyError::Finalizing { kind }),
                CeremonyStatus::Collecting => {}
            }

            let outcome = ceremony.shares.record(party, &share);
            match outcome {
                RecordOutcome::AlreadySubmitted => {
                    return Err(CeremonyError::AlreadySubmitted { kind });
                }
                RecordOutcome::DuplicateValue { first } => {
                    ceremony.reset();
                    drop(state);
                    self.cancel_external_rekey().await;
                    return Err(self.security_violation(kind, first, party.clone()).await);
                }
                RecordOutcome::Accepted { count } => {
                    info!(ceremony = %kind, party = %party, progress = count, required, "Share accepted");
                    if count < required {
                        drop(state);
                        self.inner
                            .notifier
                            .broadcast(&format!("Received rekey key: {}/{}", count, required))
                            .await;
                        return Ok(RekeyOutcome::Recorded { count, required });
                    }
                    ceremony.status = CeremonyStatus::Finalizing;
                    ceremony.timer.cancel();
                    ceremony.deadline = None;
                    (
                        ceremony.epoch,
                        ceremony.nonce.clone(),
                        Zeroizing::new(ceremony.shares.values()),
                    )
                }
            }
        };

        self.inner
            .notifier
            .broadcast(&format!(
                "Received rekey key: {}/{}. Submitting keys to Vault.",
                required, required
            ))
            .await;

        match self.drive_rekey(&snapshot, nonce).await {
            Ok(new_shares) => {
                self.reset_if_current(kind, epoch).await;
                let report = self.distribute_new_shares(new_shares).await;
                Ok(RekeyOutcome::Rekeyed(report))
            }
            Err(e) => {
                error!("Rekey handshake failed: {}", e);
                // A half-fed rekey cannot take the same shares again; start clean.
                self.cancel_external_rekey().await;
                self.reset_if_current(kind, epoch).await;
                self.inner
                    .notifier
                    .broadcast(&format!(
                        "Rekey process failed: {}. Please start the rekey again with /rekey_init.",
                        e
                    ))
                    .await;
                Err(e)
            }
        }
    }

    /// update per share, stopping as soon as Vault reports completion.
    async fn drive_rekey(&self, shares: &[String], nonce: Option<String>) -> CeremonyResult<NewShares> {
        let nonce = self.current_nonce(nonce).await?;

        for (index, share) in shares.iter().enumerate() {
            match self.inner.resource.rekey_update(share, &nonce).await {
                Ok(RekeyProgress::Complete(new_shares)) => {
                    info!(submitted = index + 1, "Vault completed the rekey");
                    return Ok(new_shares);
                }
                Ok(RekeyProgress::Pending { progress, required }) => {
                    debug!(submitted = index + 1, progress, required, "Rekey in progress");
                }
                Err(e) => {
                    return Err(CeremonyError::RekeyFailed(format!(
                        "key {} of {} was rejected: {}",
                        index + 1,
                        shares.len(),
                        e
                    )));
                }
            }
        }

        Err(CeremonyError::RekeyFailed(format!(
            "Vault did not complete the rekey after {} keys",
            shares.len()
        )))
    }

    /// Nonce of the rekey Vault is running right now.
    ///
    /// Normally that is the one issued when collection opened. If Vault has
    /// since dropped it, a new rekey is started so the collected shares are
    /// not wasted.
    async fn current_nonce(&self, collected_under: Option<String>) -> CeremonyResult<String> {
        let settings = &self.inner.settings;
        let resource = &self.inner.resource;
        let failed = |e: VaultError| CeremonyError::RekeyFailed(e.to_string());

        let status = resource.rekey_status().await.map_err(failed)?;
        if status.started && !status.nonce.is_empty() {
            if collected_under.as_deref() != Some(status.nonce.as_str()) {
                warn!(progress = status.progress, "Vault is running a different rekey; submitting against it");
            }
            return Ok(status.nonce);
        }

        info!("Vault no longer has the rekey; starting a new one");
        match resource
            .rekey_init(settings.total_keys, settings.required_keys)
            .await
            .map_err(failed)?
        {
            RekeyInit::Started { nonce } => Ok(nonce),
            RekeyInit::AlreadyInProgress => {
                let status = resource.rekey_status().await.map_err(failed)?;
                if status.nonce.is_empty() {
                    return Err(failed(VaultError::MissingNonce));
                }
                info!(progress = status.progress, "Joining rekey already running on Vault");
                Ok(status.nonce)
            }
            RekeyInit::Rejected(reason) => Err(CeremonyError::RekeyFailed(reason)),
        }
    }

    /// Persist new shares and hand one to each party in configured order.
    async fn distribute_new_shares(&self, new_shares: NewShares) -> RekeyReport {
        let persisted = match self.inner.vault.store(&new_shares.keys).await {
            Ok(_) => true,
            Err(PersistenceError::Disabled(reason)) => {
                info!("New shares not persisted: {}", reason);
                false
            }
            Err(e) => {
                error!("Failed to store new unseal keys: {}", e);
                self.inner
                    .notifier
                    .broadcast(&format!(
                        "Warning: the new keys could not be stored for auto-unseal: {}",
                        e
                    ))
                    .await;
                false
            }
        };

        let parties = self.inner.parties.all();
        if new_shares.len() != parties.len() {
            warn!(
                minted = new_shares.len(),
                parties = parties.len(),
                "Vault minted a different number of shares than there are parties"
            );
        }

        let mut delivered = Vec::new();
        let mut undelivered = Vec::new();
        for (index, party) in parties.iter().enumerate() {
            let Some(key) = new_shares.keys.get(index) else {
                undelivered.push(party.id.clone());
                continue;
            };
            let mut text = format!("Hi {}, your new key: {}", party.label, key);
            if let Some(b64) = new_shares.keys_base64.get(index) {
                text.push_str(&format!("\nYour new key (base64): {}", b64));
            }
            let text = Zeroizing::new(text);

            if self.inner.notifier.send_to(&party.id, &text).await {
                delivered.push(party.id.clone());
            } else {
                warn!(party = %party.id, "Could not deliver new key");
                undelivered.push(party.id.clone());
            }
        }

        let mut summary = String::from("Vault rekey process successfully completed.");
        if undelivered.is_empty() {
            summary.push_str(" All key holders have received their new keys.");
        } else {
            let names: Vec<&str> = undelivered.iter().map(PartyId::as_str).collect();
            summary.push_str(&format!(
                " Could not deliver new keys to: {}.",
                names.join(", ")
            ));
        }
        self.inner.notifier.broadcast(&summary).await;

        RekeyReport {
            minted: new_shares.len(),
            delivered,
            undelivered,
            persisted,
        }
    }

    /// Abort the rekey Vault is running and drop the local collection.
    pub async fn cancel_rekey(&self, party: &PartyId) -> CeremonyResult<CancelOutcome> {
        {
            let state = self.inner.state.lock().await;
            if state.rekey.status == CeremonyStatus::Finalizing {
                return Err(CeremonyError::Finalizing {
                    kind: CeremonyKind::Rekey,
                });
            }
        }

        let external = self
            .inner
            .resource
            .rekey_status()
            .await
            .map_err(CeremonyError::Unavailable)?;
        if !external.started {
            let mut state = self.inner.state.lock().await;
            if state.rekey.status == CeremonyStatus::Collecting {
                debug!("Dropping rekey collection Vault no longer backs");
                state.rekey.reset();
            }
            return Err(CeremonyError::NoActiveRekey);
        }

        let external_error = self.cancel_external_rekey().await;

        // Local state must never stay stuck, whatever Vault said.
        self.inner.state.lock().await.rekey.reset();

        info!(party = %party, "Rekey cancelled");
        self.inner
            .notifier
            .broadcast(&format!("Rekey process has been canceled by {}.", party))
            .await;

        Ok(CancelOutcome { external_error })
    }

    async fn cancel_external_rekey(&self) -> Option<String> {
        match self.inner.resource.rekey_cancel().await {
            Ok(()) => None,
            Err(e) => {
                warn!("Cancel rekey process failed: {}", e);
                Some(e.to_string())
            }
        }
    }

    // ---------------------------------------------------------------------
    // Shared
    // ---------------------------------------------------------------------

    /// Discard every collection and any rekey running on Vault.
    pub async fn refresh(&self, party: &PartyId) -> RefreshOutcome {
        {
            let mut state = self.inner.state.lock().await;
            state.unseal.reset();
            state.rekey.reset();
        }
        info!(party = %party, "Ceremony state refreshed");

        let rekey_error = match self.inner.resource.rekey_status().await {
            Ok(status) if status.started => self.cancel_external_rekey().await,
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        };

        RefreshOutcome { rekey_error }
    }

    async fn precheck_share(&self, kind: CeremonyKind, party: &PartyId) -> CeremonyResult<()> {
        let state = self.inner.state.lock().await;
        state.ensure_exclusive(kind)?;
        let ceremony = state.get(kind);
        if ceremony.status == CeremonyStatus::Finalizing {
            return Err(CeremonyError::Finalizing { kind });
        }
        if ceremony.shares.contains(party) {
            return Err(CeremonyError::AlreadySubmitted { kind });
        }
        Ok(())
    }

    async fn security_violation(
        &self,
        kind: CeremonyKind,
        first: PartyId,
        second: PartyId,
    ) -> CeremonyError {
        error!(
            ceremony = %kind,
            first = %first,
            second = %second,
            "Two parties submitted the same share; ceremony reset"
        );
        self.inner
            .notifier
            .broadcast(&format!(
                "Security alert: the same {} key was received from two different key holders ({} and {}). \
                This looks like a violation of your vault key custody. The {} process has been reset. \
                Please talk to your administrator.",
                kind, first, second, kind
            ))
            .await;
        CeremonyError::SecurityViolation { first, second }
    }

    async fn reset_if_current(&self, kind: CeremonyKind, epoch: u64) {
        let mut state = self.inner.state.lock().await;
        let ceremony = state.get_mut(kind);
        if ceremony.epoch == epoch {
            ceremony.reset();
        } else {
            debug!(ceremony = %kind, "Ceremony replaced while finalizing; leaving it alone");
        }
    }

    fn arm_deadline(&self, ceremony: &mut Ceremony) {
        let deadline = self.inner.settings.deadline;
        let kind = ceremony.kind;
        let epoch = ceremony.epoch;
        ceremony.deadline = chrono::Duration::from_std(deadline)
            .ok()
            .map(|d| Utc::now() + d);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        ceremony.timer.arm(deadline, async move {
            if let Some(inner) = weak.upgrade() {
                Coordinator { inner }.expire(kind, epoch).await;
            }
        });
    }

    async fn expire(&self, kind: CeremonyKind, epoch: u64) {
        let expired = {
            let mut state = self.inner.state.lock().await;
            let ceremony = state.get_mut(kind);
            if ceremony.epoch != epoch {
                false
            } else if ceremony.status == CeremonyStatus::Collecting {
                // Running inside the timer task: forget the handle, don't abort ourselves.
                ceremony.timer.disarm();
                match kind {
                    CeremonyKind::Unseal => ceremony.reset(),
                    // Held until Vault's rekey is gone too, so nothing can join it.
                    CeremonyKind::Rekey => {
                        ceremony.status = CeremonyStatus::Finalizing;
                        ceremony.deadline = None;
                    }
                }
                true
            } else {
                debug!(ceremony = %kind, status = ?ceremony.status, "Deadline passed outside collection");
                false
            }
        };
        if !expired {
            return;
        }

        warn!(ceremony = %kind, "Ceremony timed out");
        let message = match kind {
            CeremonyKind::Unseal => "Unseal process timed out. Please start the process again if needed.",
            CeremonyKind::Rekey => {
                self.cancel_external_rekey().await;
                self.reset_if_current(kind, epoch).await;
                "Rekey process timed out. Please start the process again if needed."
            }
        };
        self.inner.notifier.broadcast(message).await;
    }
}
