use crate::parties::PartyId;
use zeroize::Zeroizing;

/// Result of recording a share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Recorded; `count` shares are now held.
    Accepted { count: usize },
    /// This party already submitted in the current ceremony. Nothing changed.
    AlreadySubmitted,
    /// Another party already submitted this exact value. Nothing changed;
    /// the caller must treat this as a security incident.
    DuplicateValue { first: PartyId },
}

struct Submission {
    party: PartyId,
    share: Zeroizing<String>,
}

/// Shares collected for the active ceremony, in arrival order.
///
/// Ceremonies hold at most a handful of shares, so lookups are linear scans.
#[derive(Default)]
pub struct ShareStore {
    submissions: Vec<Submission>,
}

impl ShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, party: &PartyId, share: &str) -> RecordOutcome {
        if self.contains(party) {
            return RecordOutcome::AlreadySubmitted;
        }
        if let Some(existing) = self.submissions.iter().find(|s| s.share.as_str() == share) {
            return RecordOutcome::DuplicateValue {
                first: existing.party.clone(),
            };
        }
        self.submissions.push(Submission {
            party: party.clone(),
            share: Zeroizing::new(share.to_string()),
        });
        RecordOutcome::Accepted {
            count: self.submissions.len(),
        }
    }

    pub fn contains(&self, party: &PartyId) -> bool {
        self.submissions.iter().any(|s| &s.party == party)
    }

    pub fn count(&self) -> usize {
        self.submissions.len()
    }

    /// Snapshot of every recorded share.
    pub fn values(&self) -> Vec<String> {
        self.submissions.iter().map(|s| s.share.as_str().to_owned()).collect()
    }

    /// Parties that have submitted, in arrival order.
    fn parties(&self) -> Vec<PartyId> {
        self.submissions.iter().map(|s| s.party.clone()).collect()
    }

    /// Drop (and wipe) every recorded share.
    pub fn clear(&mut self) {
        self.submissions.clear();
    }
}

impl std::fmt::Debug for ShareStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareStore")
            .field("parties", &self.parties())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn party(name: &str) -> PartyId {
        PartyId::new(name)
    }

    #[test]
    fn test_record_and_clear() {
        let mut store = ShareStore::new();
        assert_eq!(
            store.record(&party("alice"), "aaaa"),
            RecordOutcome::Accepted { count: 1 }
        );
        assert_eq!(
            store.record(&party("bob"), "bbbb"),
            RecordOutcome::Accepted { count: 2 }
        );
        assert_eq!(store.values(), vec!["aaaa".to_string(), "bbbb".to_string()]);

        store.clear();
        assert_eq!(store.count(), 0);
        assert!(!store.contains(&party("alice")));
    }

    #[test]
    fn test_second_submission_rejected_without_change() {
        let mut store = ShareStore::new();
        store.record(&party("alice"), "aaaa");
        assert_eq!(
            store.record(&party("alice"), "cccc"),
            RecordOutcome::AlreadySubmitted
        );
        assert_eq!(store.values(), vec!["aaaa".to_string()]);
    }

    #[test]
    fn test_duplicate_value_names_first_party() {
        let mut store = ShareStore::new();
        store.record(&party("alice"), "same");
        assert_eq!(
            store.record(&party("bob"), "same"),
            RecordOutcome::DuplicateValue {
                first: party("alice")
            }
        );
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_debug_hides_values() {
        let mut store = ShareStore::new();
        store.record(&party("alice"), "topsecretshare");
        assert!(!format!("{:?}", store).contains("topsecretshare"));
    }

    proptest! {
        #[test]
        fn prop_one_share_per_party_and_unique_values(
            ops in prop::collection::vec((0usize..5, 0usize..5), 0..40)
        ) {
            let mut store = ShareStore::new();
            let mut by_party: HashMap<usize, usize> = HashMap::new();
            let mut by_value: HashMap<usize, usize> = HashMap::new();

            for (p, v) in ops {
                let outcome = store.record(&party(&format!("p{}", p)), &format!("share-{}", v));
                if by_party.contains_key(&p) {
                    prop_assert_eq!(outcome, RecordOutcome::AlreadySubmitted);
                } else if let Some(first) = by_value.get(&v) {
                    prop_assert_eq!(
                        outcome,
                        RecordOutcome::DuplicateValue { first: party(&format!("p{}", first)) }
                    );
                } else {
                    by_party.insert(p, v);
                    by_value.insert(v, p);
                    prop_assert_eq!(outcome, RecordOutcome::Accepted { count: by_party.len() });
                }
                prop_assert_eq!(store.count(), by_party.len());
            }
        }
    }
}
