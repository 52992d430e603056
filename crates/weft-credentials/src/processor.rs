//! Credential processor
//!
//! Wraps the party state machine with the durable credential log, the
//! notification surface and snapshot support. One processor exists per
//! party for the lifetime of the process.
//!
//! Credentials are expected to arrive serially from the party's pipeline.
//! The internal lock only makes the processor shareable with readers.

use parking_lot::RwLock;
use tracing::{debug, warn};

use weft_core::{
    Credential, FeedKey, FeedMeta, MemberKey, MembershipMessage, Observers, PartyKey,
    Subscription,
};

use crate::{
    assertion_digest, Admission, FeedInfo, MemberInfo, PartySnapshot, PartyState, RejectReason,
    SnapshotEntry,
};

/// Result of processing one credential
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialOutcome {
    Accepted(Admission),
    Rejected(RejectReason),
}

impl CredentialOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CredentialOutcome::Accepted(_))
    }
}

/// Notifications raised by the processor
#[derive(Clone, Debug)]
pub enum CredentialEvent {
    /// Raised for every credential, accepted or not
    Processed {
        credential: Credential,
        feed_key: FeedKey,
        outcome: CredentialOutcome,
    },
    MemberAdmitted(MemberInfo),
    FeedAdmitted(FeedInfo),
}

struct ProcessorState {
    machine: PartyState,
    log: Vec<SnapshotEntry>,
}

pub struct CredentialProcessor {
    state: RwLock<ProcessorState>,
    events: Observers<CredentialEvent>,
}

impl CredentialProcessor {
    pub fn new(party_key: PartyKey) -> Self {
        CredentialProcessor {
            state: RwLock::new(ProcessorState {
                machine: PartyState::new(party_key),
                log: Vec::new(),
            }),
            events: Observers::new(),
        }
    }

    pub fn party_key(&self) -> PartyKey {
        self.state.read().machine.party_key()
    }

    /// True until the genesis credential has been accepted
    pub fn genesis_required(&self) -> bool {
        !self.state.read().machine.genesis_processed()
    }

    pub fn member_keys(&self) -> Vec<MemberKey> {
        self.state.read().machine.member_keys()
    }

    pub fn feed_keys(&self) -> Vec<FeedKey> {
        self.state.read().machine.feed_keys()
    }

    pub fn is_feed_admitted(&self, feed_key: &FeedKey) -> bool {
        self.state.read().machine.feed(feed_key).is_some()
    }

    pub fn is_member_key(&self, key: &MemberKey) -> bool {
        self.state.read().machine.member(key).is_some()
    }

    pub fn member_info(&self, key: &MemberKey) -> Option<MemberInfo> {
        self.state.read().machine.member(key).copied()
    }

    /// Identity key that owns a feed, or `None` if the feed was never admitted
    pub fn feed_owning_member(&self, feed_key: &FeedKey) -> Option<MemberKey> {
        self.state.read().machine.feed(feed_key).map(|f| f.owner)
    }

    /// Number of credentials in the log, accepted or rejected
    pub fn credential_count(&self) -> usize {
        self.state.read().log.len()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CredentialEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    /// Log a credential and run it through the state machine.
    ///
    /// Rejected credentials are dropped; the outcome is returned and also
    /// carried by the `Processed` notification.
    pub fn process_message(&self, message: MembershipMessage) -> CredentialOutcome {
        let MembershipMessage { meta, credential } = message;

        let outcome = {
            let mut state = self.state.write();
            state.log.push(SnapshotEntry {
                message: credential.clone(),
                feed_key: meta.feed_key,
            });
            match state.machine.process(&credential) {
                Ok(admission) => CredentialOutcome::Accepted(admission),
                Err(reason) => CredentialOutcome::Rejected(reason),
            }
        };

        let digest = assertion_digest(&credential.assertion);
        match &outcome {
            CredentialOutcome::Accepted(admission) => {
                debug!(
                    credential = %digest,
                    kind = credential.assertion.kind(),
                    feed = %meta.feed_key,
                    seq = meta.seq,
                    "credential accepted"
                );
                self.emit_admission(admission);
            }
            CredentialOutcome::Rejected(reason) => {
                warn!(
                    credential = %digest,
                    kind = credential.assertion.kind(),
                    feed = %meta.feed_key,
                    seq = meta.seq,
                    %reason,
                    "credential rejected"
                );
            }
        }

        self.events.emit(&CredentialEvent::Processed {
            credential,
            feed_key: meta.feed_key,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn emit_admission(&self, admission: &Admission) {
        match *admission {
            Admission::Genesis { member, feed } => {
                self.events.emit(&CredentialEvent::MemberAdmitted(member));
                self.events.emit(&CredentialEvent::FeedAdmitted(feed));
            }
            Admission::Member(member) => {
                self.events.emit(&CredentialEvent::MemberAdmitted(member));
            }
            Admission::Feed(feed) => {
                self.events.emit(&CredentialEvent::FeedAdmitted(feed));
            }
        }
    }

    pub fn make_snapshot(&self) -> PartySnapshot {
        PartySnapshot {
            messages: self.state.read().log.clone(),
        }
    }

    /// Replay a snapshot into this processor.
    ///
    /// # Panics
    ///
    /// Panics if the processor has already logged a credential; restore must
    /// run once, on a freshly constructed processor.
    pub fn restore_from_snapshot(&self, snapshot: &PartySnapshot) {
        assert!(
            self.state.read().log.is_empty(),
            "restore_from_snapshot on a processor that already has credentials"
        );

        debug!(
            party = %self.party_key(),
            entries = snapshot.len(),
            "restoring party snapshot"
        );
        for (seq, entry) in snapshot.messages.iter().enumerate() {
            self.process_message(MembershipMessage {
                meta: FeedMeta {
                    feed_key: entry.feed_key,
                    seq: seq as u64,
                },
                credential: entry.message.clone(),
            });
        }
    }
}

impl std::fmt::Debug for CredentialProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("CredentialProcessor")
            .field("party_key", &state.machine.party_key())
            .field("members", &state.machine.member_keys().len())
            .field("feeds", &state.machine.feed_keys().len())
            .field("log", &state.log.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{feed_admit, key_admit, party_genesis, Keypair};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn message(feed: &Keypair, seq: u64, credential: Credential) -> MembershipMessage {
        MembershipMessage {
            meta: FeedMeta {
                feed_key: feed.public_key(),
                seq,
            },
            credential,
        }
    }

    struct Fixture {
        party: Keypair,
        founder: Keypair,
        feed: Keypair,
        processor: CredentialProcessor,
    }

    fn fixture() -> Fixture {
        let party = Keypair::generate();
        Fixture {
            processor: CredentialProcessor::new(party.public_key()),
            party,
            founder: Keypair::generate(),
            feed: Keypair::generate(),
        }
    }

    #[test]
    fn test_fresh_processor() {
        let f = fixture();
        assert!(f.processor.genesis_required());
        assert!(f.processor.feed_keys().is_empty());
        assert!(f.processor.member_keys().is_empty());
        assert_eq!(f.processor.party_key(), f.party.public_key());
    }

    #[test]
    fn test_genesis_transition() {
        let f = fixture();
        let outcome = f.processor.process_message(message(
            &f.feed,
            0,
            party_genesis(&f.party, &f.founder, &f.feed),
        ));

        assert!(outcome.is_accepted());
        assert!(!f.processor.genesis_required());
        assert_eq!(f.processor.member_keys(), vec![f.founder.public_key()]);
        assert_eq!(f.processor.feed_keys(), vec![f.feed.public_key()]);
        assert_eq!(
            f.processor.feed_owning_member(&f.feed.public_key()),
            Some(f.founder.public_key())
        );
        assert!(f.processor.is_member_key(&f.founder.public_key()));
        assert!(f.processor.is_feed_admitted(&f.feed.public_key()));
    }

    #[test]
    fn test_unknown_feed_has_no_owner() {
        let f = fixture();
        assert_eq!(f.processor.feed_owning_member(&f.feed.public_key()), None);
    }

    #[test]
    fn test_rejected_credential_logged_and_dropped() {
        let f = fixture();
        f.processor.process_message(message(
            &f.feed,
            0,
            party_genesis(&f.party, &f.founder, &f.feed),
        ));

        let stranger = Keypair::generate();
        let outcome = f.processor.process_message(message(
            &f.feed,
            1,
            key_admit(f.party.public_key(), &Keypair::generate(), &stranger),
        ));

        assert_eq!(
            outcome,
            CredentialOutcome::Rejected(RejectReason::NoAdmittingMember)
        );
        assert_eq!(f.processor.member_keys().len(), 1);
        assert_eq!(f.processor.credential_count(), 2);
    }

    #[test]
    fn test_processed_event_raised_for_every_credential() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        let _sub = f.processor.subscribe(move |event| {
            let label = match event {
                CredentialEvent::Processed { outcome, .. } => {
                    if outcome.is_accepted() { "accepted" } else { "rejected" }
                }
                CredentialEvent::MemberAdmitted(_) => "member",
                CredentialEvent::FeedAdmitted(_) => "feed",
            };
            s.lock().push(label);
        });

        f.processor.process_message(message(
            &f.feed,
            0,
            party_genesis(&f.party, &f.founder, &f.feed),
        ));
        f.processor.process_message(message(
            &f.feed,
            1,
            party_genesis(&f.party, &f.founder, &f.feed),
        ));

        assert_eq!(
            *seen.lock(),
            vec!["member", "feed", "accepted", "rejected"]
        );
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let f = fixture();
        let member = Keypair::generate();
        let feed2 = Keypair::generate();
        let credentials = vec![
            party_genesis(&f.party, &f.founder, &f.feed),
            key_admit(f.party.public_key(), &member, &f.founder),
            feed_admit(f.party.public_key(), &feed2, &member),
            // rejected, but still part of the log
            key_admit(f.party.public_key(), &member, &f.founder),
        ];
        for (seq, c) in credentials.into_iter().enumerate() {
            f.processor.process_message(message(&f.feed, seq as u64, c));
        }

        let snapshot = f.processor.make_snapshot();
        assert_eq!(snapshot.len(), 4);

        let restored = CredentialProcessor::new(f.party.public_key());
        restored.restore_from_snapshot(&snapshot);

        assert_eq!(restored.member_keys(), f.processor.member_keys());
        assert_eq!(restored.feed_keys(), f.processor.feed_keys());
        assert_eq!(restored.genesis_required(), f.processor.genesis_required());
        assert_eq!(restored.make_snapshot(), snapshot);
    }

    #[test]
    fn test_snapshot_survives_json() {
        let f = fixture();
        f.processor.process_message(message(
            &f.feed,
            0,
            party_genesis(&f.party, &f.founder, &f.feed),
        ));

        let json = serde_json::to_string(&f.processor.make_snapshot()).unwrap();
        let snapshot: PartySnapshot = serde_json::from_str(&json).unwrap();

        let restored = CredentialProcessor::new(f.party.public_key());
        restored.restore_from_snapshot(&snapshot);
        assert!(!restored.genesis_required());
        assert_eq!(restored.member_keys(), vec![f.founder.public_key()]);
    }

    #[test]
    #[should_panic(expected = "already has credentials")]
    fn test_double_restore_panics() {
        let f = fixture();
        f.processor.process_message(message(
            &f.feed,
            0,
            party_genesis(&f.party, &f.founder, &f.feed),
        ));
        let snapshot = f.processor.make_snapshot();

        let restored = CredentialProcessor::new(f.party.public_key());
        restored.restore_from_snapshot(&snapshot);
        restored.restore_from_snapshot(&snapshot);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Step {
            AdmitMember { by: usize },
            AdmitFeed { owner: usize },
            Forged,
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                (0usize..8).prop_map(|by| Step::AdmitMember { by }),
                (0usize..8).prop_map(|owner| Step::AdmitFeed { owner }),
                Just(Step::Forged),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_membership_only_grows(steps in proptest::collection::vec(step(), 0..12)) {
                let f = fixture();
                let party_key = f.party.public_key();
                let mut members = vec![f.founder.clone()];
                let mut genesis_transitions = 0;

                let before = f.processor.genesis_required();
                f.processor.process_message(message(
                    &f.feed, 0, party_genesis(&f.party, &f.founder, &f.feed),
                ));
                if before && !f.processor.genesis_required() {
                    genesis_transitions += 1;
                }

                let (mut last_members, mut last_feeds) =
                    (f.processor.member_keys().len(), f.processor.feed_keys().len());

                for (i, step) in steps.into_iter().enumerate() {
                    let credential = match step {
                        Step::AdmitMember { by } => {
                            let newcomer = Keypair::generate();
                            let credential =
                                key_admit(party_key, &newcomer, &members[by % members.len()]);
                            members.push(newcomer);
                            credential
                        }
                        Step::AdmitFeed { owner } => {
                            feed_admit(party_key, &Keypair::generate(), &members[owner % members.len()])
                        }
                        Step::Forged => key_admit(party_key, &Keypair::generate(), &Keypair::generate()),
                    };

                    let was_required = f.processor.genesis_required();
                    f.processor.process_message(message(&f.feed, i as u64 + 1, credential));
                    if was_required && !f.processor.genesis_required() {
                        genesis_transitions += 1;
                    }

                    let (m, fd) = (f.processor.member_keys().len(), f.processor.feed_keys().len());
                    prop_assert!(m >= last_members);
                    prop_assert!(fd >= last_feeds);
                    last_members = m;
                    last_feeds = fd;
                }

                prop_assert_eq!(genesis_transitions, 1);
                prop_assert_eq!(last_members, members.len());
            }
        }
    }
}
