//! Ed25519 keypair for feed authorship
//!
//! Every feed is owned by one keypair; the feed id is derived from the
//! public half, and every message in the feed is signed with the secret
//! half.

use crate::identity::feed_id::FeedId;
use crate::identity::signature::FeedSignature;
use crate::SyncError;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

/// Signing keypair owning one feed.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        // Use getrandom directly to avoid rand version conflicts
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).expect("Failed to get random bytes");
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Generate a deterministic keypair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Get the feed id owned by this keypair
    pub fn feed_id(&self) -> FeedId {
        FeedId::from_public_key(&self.signing.verifying_key())
    }

    /// Get the public key for this keypair
    pub fn public_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Sign a message digest
    pub fn sign(&self, message: &[u8]) -> FeedSignature {
        FeedSignature::new(self.signing.sign(message))
    }

    /// Serialize the private seed to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// Deserialize a keypair from its 32-byte seed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SyncError::Identity("Keypair seed must be 32 bytes".to_string()))?;
        Ok(Self::from_seed(&seed))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("feed_id", &self.feed_id())
            .finish()
    }
}
