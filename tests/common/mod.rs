//! In-memory stand-ins for Vault and Discord shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sealkeeper::ceremony::{CeremonySettings, Coordinator};
use sealkeeper::notify::Notifier;
use sealkeeper::parties::{PartyId, PartyRegistry};
use sealkeeper::persistence::{ShareCipher, ShareVault};
use sealkeeper::vault::{
    NewShares, RekeyInit, RekeyProgress, RekeyStatus, SealHealth, SealResource, VaultError,
    VaultResult,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Mutable behaviour and call log of [`FakeResource`].
#[derive(Debug, Default)]
pub struct FakeState {
    pub sealed: bool,
    pub down: bool,
    /// Stay sealed even after a successful unseal call
    pub stay_sealed: bool,
    pub fail_unseal: bool,
    pub unseal_delay: Option<Duration>,
    pub unseal_calls: Vec<Vec<String>>,

    pub rekey_started: bool,
    pub rekey_nonce: String,
    pub rekey_total: usize,
    pub reject_init: Option<String>,
    /// Vault completes the rekey after this many updates
    pub complete_after: usize,
    pub fail_update_at: Option<usize>,
    pub init_calls: usize,
    pub updates: Vec<(String, String)>,
    pub cancel_calls: usize,
}

/// Vault double that follows the sys API's observable behaviour.
#[derive(Debug, Default)]
pub struct FakeResource {
    pub state: Mutex<FakeState>,
}

impl FakeResource {
    pub fn sealed() -> Arc<Self> {
        let fake = Self::default();
        fake.with(|s| {
            s.sealed = true;
            s.complete_after = usize::MAX;
        });
        Arc::new(fake)
    }

    pub fn unsealed(complete_after: usize) -> Arc<Self> {
        let fake = Self::default();
        fake.with(|s| s.complete_after = complete_after);
        Arc::new(fake)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Someone else started a rekey directly against Vault.
    pub fn start_external_rekey(&self, nonce: &str, total: usize) {
        self.with(|s| {
            s.rekey_started = true;
            s.rekey_nonce = nonce.to_string();
            s.rekey_total = total;
        });
    }

    pub fn unseal_calls(&self) -> Vec<Vec<String>> {
        self.with(|s| s.unseal_calls.clone())
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.with(|s| s.updates.clone())
    }

    pub fn new_key(index: usize) -> String {
        format!("{:064x}", 0xfeed_0000 + index)
    }
}

#[async_trait]
impl SealResource for FakeResource {
    async fn health(&self) -> VaultResult<SealHealth> {
        self.with(|s| {
            if s.down {
                return Err(VaultError::Decode("connection refused".into()));
            }
            Ok(SealHealth {
                initialized: true,
                sealed: s.sealed,
            })
        })
    }

    async fn unseal(&self, shares: &[String]) -> VaultResult<()> {
        if let Some(delay) = self.with(|s| s.unseal_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with(|s| {
            s.unseal_calls.push(shares.to_vec());
            if s.fail_unseal {
                return Err(VaultError::Status {
                    status: 400,
                    message: "invalid key".into(),
                });
            }
            if !s.stay_sealed {
                s.sealed = false;
            }
            Ok(())
        })
    }

    async fn rekey_status(&self) -> VaultResult<RekeyStatus> {
        self.with(|s| {
            if s.down {
                return Err(VaultError::Decode("connection refused".into()));
            }
            Ok(RekeyStatus {
                started: s.rekey_started,
                nonce: if s.rekey_started {
                    s.rekey_nonce.clone()
                } else {
                    String::new()
                },
                progress: s.updates.len() as u32,
                required: 0,
            })
        })
    }

    async fn rekey_init(&self, total: usize, _required: usize) -> VaultResult<RekeyInit> {
        self.with(|s| {
            s.init_calls += 1;
            if s.rekey_started {
                return Ok(RekeyInit::AlreadyInProgress);
            }
            if let Some(reason) = &s.reject_init {
                return Ok(RekeyInit::Rejected(reason.clone()));
            }
            s.rekey_started = true;
            s.rekey_nonce = format!("nonce-{}", s.init_calls);
            s.rekey_total = total;
            Ok(RekeyInit::Started {
                nonce: s.rekey_nonce.clone(),
            })
        })
    }

    async fn rekey_update(&self, share: &str, nonce: &str) -> VaultResult<RekeyProgress> {
        self.with(|s| {
            if !s.rekey_started || nonce != s.rekey_nonce {
                return Err(VaultError::Status {
                    status: 400,
                    message: "no rekey in progress or wrong nonce".into(),
                });
            }
            if s.fail_update_at == Some(s.updates.len()) {
                return Err(VaultError::Status {
                    status: 400,
                    message: "invalid key".into(),
                });
            }
            s.updates.push((share.to_string(), nonce.to_string()));
            if s.updates.len() >= s.complete_after {
                s.rekey_started = false;
                let keys: Vec<String> = (0..s.rekey_total).map(FakeResource::new_key).collect();
                let keys_base64 = keys.iter().map(|k| format!("b64:{}", k)).collect();
                return Ok(RekeyProgress::Complete(NewShares { keys, keys_base64 }));
            }
            Ok(RekeyProgress::Pending {
                progress: s.updates.len() as u32,
                required: s.complete_after as u32,
            })
        })
    }

    async fn rekey_cancel(&self) -> VaultResult<()> {
        self.with(|s| {
            s.cancel_calls += 1;
            s.rekey_started = false;
            s.updates.clear();
            Ok(())
        })
    }
}

/// Chat double recording everything it was asked to send.
pub struct RecordingNotifier {
    parties: Arc<PartyRegistry>,
    unreachable: Mutex<HashSet<PartyId>>,
    pub direct: Mutex<Vec<(PartyId, String)>>,
    pub broadcasts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new(parties: Arc<PartyRegistry>) -> Arc<Self> {
        Arc::new(Self {
            parties,
            unreachable: Mutex::new(HashSet::new()),
            direct: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
        })
    }

    pub fn make_unreachable(&self, party: &str) {
        self.unreachable.lock().unwrap().insert(PartyId::new(party));
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn broadcast_containing(&self, needle: &str) -> bool {
        self.broadcasts().iter().any(|m| m.contains(needle))
    }

    pub fn direct_to(&self, party: &str) -> Vec<String> {
        let id = PartyId::new(party);
        self.direct
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == id)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_to(&self, party: &PartyId, text: &str) -> bool {
        let reachable = self.parties.get(party).is_some_and(|p| p.address.is_some());
        if !reachable || self.unreachable.lock().unwrap().contains(party) {
            return false;
        }
        self.direct
            .lock()
            .unwrap()
            .push((party.clone(), text.to_string()));
        true
    }

    async fn broadcast(&self, text: &str) {
        self.broadcasts.lock().unwrap().push(text.to_string());
    }
}

/// A coordinator wired to fakes, with every party already reachable.
pub struct Harness {
    pub coordinator: Coordinator,
    pub resource: Arc<FakeResource>,
    pub notifier: Arc<RecordingNotifier>,
    pub parties: Arc<PartyRegistry>,
    pub vault: Arc<ShareVault>,
    _dir: TempDir,
}

pub const PARTIES: [&str; 4] = ["alice", "bob", "carol", "dave"];

impl Harness {
    pub fn new(resource: Arc<FakeResource>, required_keys: usize) -> Self {
        Self::build(resource, required_keys, None)
    }

    /// Harness whose share vault is enabled and keyed.
    pub fn with_persistence(resource: Arc<FakeResource>, required_keys: usize) -> Self {
        Self::build(resource, required_keys, Some(ShareCipher::generate()))
    }

    fn build(resource: Arc<FakeResource>, required_keys: usize, cipher: Option<ShareCipher>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("unsealkeys");
        let vault = Arc::new(match cipher {
            Some(cipher) => ShareVault::with_cipher(record, true, cipher, "test"),
            None => ShareVault::new(record, false),
        });

        let parties = Arc::new(PartyRegistry::new(&PARTIES[..]));
        for (i, name) in PARTIES.iter().enumerate() {
            parties.authorize(name, i as u64 + 1, name);
        }
        let notifier = RecordingNotifier::new(parties.clone());

        let settings = CeremonySettings {
            required_keys,
            total_keys: PARTIES.len(),
            deadline: Duration::from_secs(600),
            verify_attempts: 5,
            verify_interval: Duration::from_secs(10),
        };
        let coordinator = Coordinator::new(
            settings,
            resource.clone(),
            notifier.clone(),
            parties.clone(),
            vault.clone(),
        );

        Self {
            coordinator,
            resource,
            notifier,
            parties,
            vault,
            _dir: dir,
        }
    }
}

pub fn party(name: &str) -> PartyId {
    PartyId::new(name)
}

/// A syntactically valid share unique to `n`.
pub fn share(n: usize) -> String {
    format!("{:064x}", n * 7919 + 13)
}
