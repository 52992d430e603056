//! Weft Credentials - Party membership
//!
//! Provides the credential-gated membership layer of a party:
//! - Keypairs and credential signing (Ed25519)
//! - Builders for genesis, key-admit and feed-admit credentials
//! - The party state machine that validates admissions
//! - The credential processor: durable log, notifications and snapshots

pub mod builder;
pub mod keypair;
pub mod processor;
pub mod snapshot;
pub mod state;

pub use builder::*;
pub use keypair::*;
pub use processor::*;
pub use snapshot::*;
pub use state::*;
