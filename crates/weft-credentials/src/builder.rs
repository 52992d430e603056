//! Credential builders

use weft_core::{Assertion, Credential, PartyKey};

use crate::Keypair;

/// Sign an assertion with every given keypair
pub fn sign_credential(assertion: Assertion, signers: &[&Keypair]) -> Credential {
    let signatures = signers
        .iter()
        .map(|k| k.sign_assertion(&assertion))
        .collect();
    Credential {
        assertion,
        signatures,
    }
}

/// Found a party: admits `member` and its `feed`
pub fn party_genesis(party: &Keypair, member: &Keypair, feed: &Keypair) -> Credential {
    sign_credential(
        Assertion::PartyGenesis {
            party_key: party.public_key(),
            member_key: member.public_key(),
            feed_key: feed.public_key(),
        },
        &[party, member, feed],
    )
}

/// Admit `admit` as a member, vouched for by the existing member `admitted_by`
pub fn key_admit(party_key: PartyKey, admit: &Keypair, admitted_by: &Keypair) -> Credential {
    sign_credential(
        Assertion::KeyAdmit {
            party_key,
            admit_key: admit.public_key(),
        },
        &[admit, admitted_by],
    )
}

/// Admit `feed` as owned by the member `owner`
pub fn feed_admit(party_key: PartyKey, feed: &Keypair, owner: &Keypair) -> Credential {
    sign_credential(
        Assertion::FeedAdmit {
            party_key,
            feed_key: feed.public_key(),
            owner: owner.public_key(),
        },
        &[feed, owner],
    )
}
