//! Message types for append-only feeds
//!
//! Each message occupies one slot in its author's feed:
//!
//! ```text
//! Message:
//! ┌─────────────────────────────────────────────────────────┐
//! │  author: FeedId          - Who owns the feed            │
//! │  sequence: u64           - 1-based position in the feed │
//! │  timestamp: i64          - Unix timestamp (ms)          │
//! │  previous: Option<Id>    - Id of the predecessor        │
//! │  content: MessageContent - Tagged payload               │
//! │  signature: FeedSignature- Signs all of the above       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The signature covers the BLAKE3 digest of the serialized fields; when a
//! network key is configured, the digest is keyed with it so messages from
//! one network never verify on another.

use crate::error::{SyncError, SyncResult};
use crate::identity::{FeedId, FeedSignature, Keypair};

use ed25519_dalek::Verifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single message: the BLAKE3 hash of its encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId([u8; 32]);

impl MessageId {
    /// Wrap a raw 32-byte hash
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", hex::encode(self.0))
    }
}

/// Reference to a profile image.
///
/// Older writers emit the blob reference as a bare string, newer ones nest
/// it under a `link` field; both decode to the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageRef {
    /// Nested form: `{ link: "..." }`
    Link { link: String },
    /// Bare blob reference
    Blob(String),
}

impl ImageRef {
    /// The blob reference regardless of encoding form
    pub fn link(&self) -> &str {
        match self {
            ImageRef::Link { link } => link,
            ImageRef::Blob(link) => link,
        }
    }
}

/// Message payload, tagged by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageContent {
    /// A public post, optionally part of a reply thread
    Post {
        text: String,
        /// Root message of the thread this post replies to
        root: Option<MessageId>,
        /// Immediate predecessor in the thread
        branch: Option<MessageId>,
    },
    /// Self-description; the fields feed the profile aggregator
    About {
        about: FeedId,
        name: Option<String>,
        description: Option<String>,
        image: Option<ImageRef>,
    },
    /// Reaction to another message
    Vote { link: MessageId, value: i32 },
    /// Follow/unfollow of another feed
    Contact { contact: FeedId, following: bool },
    /// Opaque private payload; replicated but never inspected
    Encrypted(String),
}

impl MessageContent {
    /// Whether this is a post
    pub fn is_post(&self) -> bool {
        matches!(self, MessageContent::Post { .. })
    }

    /// Whether this is an about-message describing the given feed
    pub fn is_about(&self, feed: &FeedId) -> bool {
        matches!(self, MessageContent::About { about, .. } if about == feed)
    }
}

/// One entry in an append-only feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Feed this message belongs to
    pub author: FeedId,
    /// 1-based position within the author's feed
    pub sequence: u64,
    /// Unix timestamp in milliseconds when the message was created
    pub timestamp: i64,
    /// Id of the predecessor; `None` only for the first message
    pub previous: Option<MessageId>,
    /// Tagged payload
    pub content: MessageContent,
    /// Signature over the digest of all fields above
    pub signature: FeedSignature,
}

impl Message {
    /// Create and sign a new message.
    pub fn create(
        keypair: &Keypair,
        sequence: u64,
        previous: Option<MessageId>,
        content: MessageContent,
        hmac_key: Option<&[u8; 32]>,
    ) -> SyncResult<Self> {
        let author = keypair.feed_id();
        let timestamp = chrono::Utc::now().timestamp_millis();

        let digest = signing_digest(&author, sequence, timestamp, &previous, &content, hmac_key)?;
        let signature = keypair.sign(&digest);

        Ok(Self {
            author,
            sequence,
            timestamp,
            previous,
            content,
            signature,
        })
    }

    /// Compute this message's id.
    ///
    /// The id is the BLAKE3 hash of the full encoding, signature included,
    /// and is what successor messages reference in `previous`.
    pub fn id(&self) -> MessageId {
        let bytes =
            postcard::to_allocvec(self).expect("message serialization should not fail");
        MessageId(*blake3::hash(&bytes).as_bytes())
    }

    /// Check structural well-formedness without touching the signature.
    ///
    /// The first message of a feed must not reference a predecessor; every
    /// later one must.
    pub fn check_well_formed(&self) -> SyncResult<()> {
        if self.sequence == 0 {
            return Err(SyncError::MessageValidation(format!(
                "Message from {} has sequence 0; sequences are 1-based",
                self.author
            )));
        }

        if self.sequence == 1 && self.previous.is_some() {
            return Err(SyncError::MessageValidation(format!(
                "First message of {} must not reference a predecessor",
                self.author
            )));
        }

        if self.sequence > 1 && self.previous.is_none() {
            return Err(SyncError::MessageValidation(format!(
                "Message {} of {} is missing its predecessor link",
                self.sequence, self.author
            )));
        }

        Ok(())
    }

    /// Verify the signature against the author's public key.
    pub fn verify(&self, hmac_key: Option<&[u8; 32]>) -> SyncResult<()> {
        let public_key = self.author.public_key()?;
        let digest = signing_digest(
            &self.author,
            self.sequence,
            self.timestamp,
            &self.previous,
            &self.content,
            hmac_key,
        )?;

        public_key
            .verify(&digest, self.signature.ed25519())
            .map_err(|_| {
                SyncError::MessageValidation(format!(
                    "Signature of message {} from {} does not verify",
                    self.sequence, self.author
                ))
            })
    }

    /// Encode the message for storage or the wire.
    pub fn encode(&self) -> SyncResult<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    /// Decode a message from its storage/wire encoding.
    pub fn decode(bytes: &[u8]) -> SyncResult<Self> {
        postcard::from_bytes(bytes).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}

/// Last known message of a feed, as carried in identity snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestMessage {
    /// Sequence of the newest known message
    pub sequence: u64,
    /// Its Unix timestamp in milliseconds
    pub timestamp: i64,
}

/// Digest a message's signed fields, keyed with the network key when set.
fn signing_digest(
    author: &FeedId,
    sequence: u64,
    timestamp: i64,
    previous: &Option<MessageId>,
    content: &MessageContent,
    hmac_key: Option<&[u8; 32]>,
) -> SyncResult<[u8; 32]> {
    let bytes = postcard::to_allocvec(&(author, sequence, timestamp, previous, content))
        .map_err(|e| SyncError::Serialization(e.to_string()))?;

    let digest = match hmac_key {
        Some(key) => blake3::keyed_hash(key, &bytes),
        None => blake3::hash(&bytes),
    };

    Ok(*digest.as_bytes())
}
