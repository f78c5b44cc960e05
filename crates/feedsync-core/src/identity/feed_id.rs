//! Feed identifier implementation
//!
//! Format: `feed:z{base58-ed25519-public-key}`
//!
//! A feed id names one append-only log and doubles as the verification key
//! for every message in that log: the ed25519 public key is recoverable
//! from the identifier, so messages can be checked standalone without a
//! separate key lookup.

use crate::SyncError;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one append-only feed.
///
/// Format: `feed:z{base58-ed25519-public-key}`
///
/// Derived directly from the author's ed25519 public key, providing:
/// - A stable key for the per-identity log
/// - Standalone signature verification (the key decodes back out)
/// - Deterministic ordering, so identity snapshots enumerate stably
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId(String);

impl FeedId {
    /// Create a feed id from an ed25519 public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let encoded = bs58::encode(public_key.as_bytes()).into_string();
        FeedId(format!("feed:z{}", encoded))
    }

    /// Get the feed id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the identifier part (after "feed:z")
    pub fn identifier(&self) -> &str {
        &self.0[6..]
    }

    /// Recover the ed25519 public key encoded in this feed id
    pub fn public_key(&self) -> Result<VerifyingKey, SyncError> {
        let bytes = bs58::decode(self.identifier())
            .into_vec()
            .map_err(|_| SyncError::Identity("Invalid base58 in feed id".to_string()))?;

        let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SyncError::Identity("Feed id does not encode a 32-byte key".to_string())
        })?;

        VerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| SyncError::Identity("Feed id is not a valid ed25519 key".to_string()))
    }

    /// Validate the format of a feed id string without parsing
    fn validate_format(id_str: &str) -> Result<(), SyncError> {
        let parts: Vec<&str> = id_str.split(':').collect();

        if parts.len() != 2 {
            return Err(SyncError::Identity(
                "Feed id must have 2 parts separated by ':'".to_string(),
            ));
        }

        if parts[0] != "feed" {
            return Err(SyncError::Identity(
                "Feed id must start with 'feed:'".to_string(),
            ));
        }

        if !parts[1].starts_with('z') {
            return Err(SyncError::Identity(
                "Feed id identifier must start with 'z' (multibase prefix)".to_string(),
            ));
        }

        let identifier = &parts[1][1..];
        if identifier.is_empty() {
            return Err(SyncError::Identity(
                "Feed id identifier cannot be empty".to_string(),
            ));
        }

        let decoded = bs58::decode(identifier).into_vec().map_err(|_| {
            SyncError::Identity("Invalid base58 encoding in feed id".to_string())
        })?;

        if decoded.len() != 32 {
            return Err(SyncError::Identity(
                "Feed id must encode exactly 32 key bytes".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse a feed id from a string
    pub fn parse(id_str: &str) -> Result<Self, SyncError> {
        Self::validate_format(id_str)?;
        Ok(FeedId(id_str.to_string()))
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FeedId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    #[test]
    fn test_feed_id_format() {
        let keypair = Keypair::generate();
        let id = keypair.feed_id();

        assert!(id.as_str().starts_with("feed:z"));
        assert!(!id.identifier().is_empty());
    }

    #[test]
    fn test_feed_id_roundtrip() {
        let keypair = Keypair::generate();
        let id = keypair.feed_id();

        let parsed = FeedId::parse(id.as_str()).expect("Should parse");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_feed_id_recovers_public_key() {
        let keypair = Keypair::generate();
        let id = keypair.feed_id();

        let recovered = id.public_key().expect("Should recover key");
        assert_eq!(recovered.as_bytes(), keypair.public_key().as_bytes());
    }

    #[test]
    fn test_feed_id_rejects_bad_prefix() {
        assert!(FeedId::parse("did:sync:zabc").is_err());
        assert!(FeedId::parse("feed:abc").is_err());
        assert!(FeedId::parse("feed:z").is_err());
        assert!(FeedId::parse("feed:z!!!not-base58!!!").is_err());
    }

    #[test]
    fn test_feed_id_rejects_wrong_key_length() {
        let short = bs58::encode(&[1u8; 16]).into_string();
        assert!(FeedId::parse(&format!("feed:z{}", short)).is_err());
    }

    #[test]
    fn test_feed_id_ordering_is_stable() {
        let a = FeedId("feed:zAAA".to_string());
        let b = FeedId("feed:zBBB".to_string());
        assert!(a < b);
    }
}
