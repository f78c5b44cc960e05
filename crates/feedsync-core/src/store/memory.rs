//! In-memory message store
//!
//! Keeps everything in maps behind a mutex. Used by tests and by callers
//! embedding the pipeline without persistence.

use crate::error::SyncResult;
use crate::identity::FeedId;
use crate::message::Message;
use crate::validate::{self, FeedState, ValidationContext};

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use super::MessageStore;

#[derive(Default)]
struct MemoryInner {
    messages: BTreeMap<(FeedId, u64), Message>,
    heads: HashMap<FeedId, u64>,
    partial: HashMap<FeedId, bool>,
}

/// Map-backed [`MessageStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    context: Mutex<ValidationContext>,
    hmac_key: Option<[u8; 32]>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store validating under a network key
    pub fn with_hmac(hmac_key: [u8; 32]) -> Self {
        Self {
            hmac_key: Some(hmac_key),
            ..Default::default()
        }
    }

    /// Number of stored messages
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Whether the store holds no messages
    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    /// Look up one message
    pub fn message(&self, feed: &FeedId, sequence: u64) -> Option<Message> {
        self.inner
            .lock()
            .messages
            .get(&(feed.clone(), sequence))
            .cloned()
    }

    /// Highest stored sequence for a feed, through any append path
    pub fn head(&self, feed: &FeedId) -> Option<u64> {
        self.inner.lock().heads.get(feed).copied()
    }

    fn persist(&self, message: &Message) {
        let mut inner = self.inner.lock();
        let head = inner.heads.entry(message.author.clone()).or_insert(0);
        if message.sequence > *head {
            *head = message.sequence;
        }
        inner
            .messages
            .insert((message.author.clone(), message.sequence), message.clone());
    }
}

impl MessageStore for MemoryStore {
    async fn add(&self, message: &Message) -> SyncResult<()> {
        self.persist(message);
        Ok(())
    }

    async fn validate_and_add(&self, message: &Message) -> SyncResult<()> {
        {
            let mut context = self.context.lock();
            validate::append_out_of_order(&mut context, self.hmac_key.as_ref(), message)?;
        }
        self.persist(message);
        Ok(())
    }

    async fn validate_and_add_strict_order(&self, message: &Message) -> SyncResult<()> {
        {
            let mut context = self.context.lock();
            validate::append_strict(&mut context, self.hmac_key.as_ref(), message)?;
        }
        self.persist(message);
        Ok(())
    }

    async fn mark_partially_replicated(&self, feed: &FeedId, partial: bool) -> SyncResult<()> {
        self.inner.lock().partial.insert(feed.clone(), partial);
        Ok(())
    }

    async fn is_partially_replicated(&self, feed: &FeedId) -> SyncResult<bool> {
        Ok(self.inner.lock().partial.get(feed).copied().unwrap_or(false))
    }

    async fn feed_states(&self) -> SyncResult<Vec<(FeedId, FeedState)>> {
        Ok(self.context.lock().states())
    }

    async fn reset_feed(&self, feed: &FeedId) -> SyncResult<()> {
        self.context.lock().remove(feed);
        Ok(())
    }
}
