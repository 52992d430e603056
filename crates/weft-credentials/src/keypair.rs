//! Key management using Ed25519

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use weft_core::{Assertion, KeySignature, PublicKey, Signature};

/// Signing keypair for a party, member, or feed
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    public_key: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create keypair from existing secret key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey::new(signing_key.verifying_key().to_bytes());
        Keypair {
            signing_key,
            public_key,
        }
    }

    /// Get the secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Sign the canonical encoding of an assertion
    pub fn sign_assertion(&self, assertion: &Assertion) -> KeySignature {
        KeySignature {
            signer: self.public_key,
            signature: self.sign(&assertion.signing_bytes()),
        }
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Verify a signature against a public key.
///
/// Keys that are not valid curve points never verify.
pub fn verify(key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(key.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify(message, &sig).is_ok()
}

/// Short digest of an assertion, used to identify credentials in logs
pub fn assertion_digest(assertion: &Assertion) -> String {
    let mut hasher = Sha256::new();
    hasher.update(assertion.signing_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}
