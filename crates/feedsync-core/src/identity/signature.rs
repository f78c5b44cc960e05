//! Message signature wrapper
//!
//! Wraps an ed25519 signature with a stable byte encoding so it can travel
//! inside serialized messages.

use ed25519_dalek::Signature as Ed25519Signature;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Signature over a message's signing digest.
#[derive(Clone)]
pub struct FeedSignature {
    pub(crate) inner: Ed25519Signature,
}

impl FeedSignature {
    /// Create a signature wrapper from an ed25519 signature
    pub(crate) fn new(inner: Ed25519Signature) -> Self {
        Self { inner }
    }

    /// Get the underlying ed25519 signature
    pub fn ed25519(&self) -> &Ed25519Signature {
        &self.inner
    }

    /// Serialize the signature to its 64-byte encoding
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    /// Deserialize a signature from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::SyncError> {
        let raw: [u8; 64] = bytes.try_into().map_err(|_| {
            crate::SyncError::Identity("Signature must be exactly 64 bytes".to_string())
        })?;
        Ok(Self {
            inner: Ed25519Signature::from_bytes(&raw),
        })
    }
}

impl PartialEq for FeedSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FeedSignature {}

impl std::fmt::Debug for FeedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSignature")
            .field("ed25519", &hex::encode(self.to_bytes()))
            .finish()
    }
}

impl Serialize for FeedSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for FeedSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    #[test]
    fn test_signature_byte_roundtrip() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"test message for signature");

        let bytes = signature.to_bytes();
        let recovered = FeedSignature::from_bytes(&bytes).expect("Failed to deserialize");

        assert_eq!(signature, recovered);
    }

    #[test]
    fn test_signature_serde_roundtrip() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"test message for serde");

        let encoded = postcard::to_allocvec(&signature).expect("Failed to serialize");
        let recovered: FeedSignature =
            postcard::from_bytes(&encoded).expect("Failed to deserialize");

        assert_eq!(signature, recovered);
    }

    #[test]
    fn test_signature_rejects_short_input() {
        assert!(FeedSignature::from_bytes(&[0u8; 10]).is_err());
    }
}
