//! Persistent message store backed by redb
//!
//! ## Storage Schema
//!
//! ```text
//! messages table:     "{feed}:{sequence}" -> Message bytes
//! feed_heads table:   feed -> highest stored sequence (8-byte LE u64)
//! feed_states table:  feed -> FeedState bytes (strict path only)
//! partial_feeds table: feed -> 1 byte flag
//! profiles table:     feed -> Profile bytes
//! ```
//!
//! Heads advance on any append; validated chain states advance only
//! through the strict append path, so a windowed backfill never moves a
//! feed's validated position. States are reloaded into the validation
//! context when the store is reopened.

use crate::error::{SyncError, SyncResult};
use crate::identity::FeedId;
use crate::message::Message;
use crate::profile::Profile;
use crate::validate::{self, FeedState, ValidationContext};

use parking_lot::{Mutex, RwLock};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::MessageStore;

/// Table for message bodies
/// Key: "{feed}:{sequence}", value: serialized Message
pub(crate) const MESSAGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

/// Table for the highest stored sequence per feed
pub(crate) const HEADS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("feed_heads");

/// Table for validated chain states (strict path only)
pub(crate) const FEED_STATES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("feed_states");

/// Table for the partial-replication bookkeeping flag
pub(crate) const PARTIAL_FEEDS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("partial_feeds");

/// Table for derived profile snapshots
pub(crate) const PROFILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("profiles");

/// redb-backed [`MessageStore`].
pub struct RedbStore {
    db: Arc<RwLock<Database>>,
    context: Mutex<ValidationContext>,
    hmac_key: Option<[u8; 32]>,
}

impl RedbStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        Self::open_with_hmac(path, None)
    }

    /// Open (or create) a store validating under a network key.
    pub fn open_with_hmac(path: impl AsRef<Path>, hmac_key: Option<[u8; 32]>) -> SyncResult<Self> {
        let db = Database::create(path)?;

        // Initialize tables
        {
            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(MESSAGES_TABLE)?;
                let _ = write_txn.open_table(HEADS_TABLE)?;
                let _ = write_txn.open_table(FEED_STATES_TABLE)?;
                let _ = write_txn.open_table(PARTIAL_FEEDS_TABLE)?;
                let _ = write_txn.open_table(PROFILES_TABLE)?;
            }
            write_txn.commit()?;
        }

        let store = Self {
            db: Arc::new(RwLock::new(db)),
            context: Mutex::new(ValidationContext::new()),
            hmac_key,
        };
        store.reload_states()?;
        Ok(store)
    }

    /// Reload validated chain states from disk into the context.
    fn reload_states(&self) -> SyncResult<()> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(FEED_STATES_TABLE)?;

        let mut context = self.context.lock();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let feed = FeedId::parse(key.value())?;
            let state: FeedState = postcard::from_bytes(value.value())
                .map_err(|e| SyncError::Serialization(e.to_string()))?;
            context.restore(feed, state);
        }

        debug!(feeds = context.states().len(), "reloaded validated feed states");
        Ok(())
    }

    /// Look up one message.
    pub fn message(&self, feed: &FeedId, sequence: u64) -> SyncResult<Option<Message>> {
        let key = format_message_key(feed.as_str(), sequence);

        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(MESSAGES_TABLE)?;

        match table.get(key.as_str())? {
            Some(v) => Ok(Some(Message::decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// Highest stored sequence for a feed, through any append path.
    pub fn head(&self, feed: &FeedId) -> SyncResult<Option<u64>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(HEADS_TABLE)?;

        match table.get(feed.as_str())? {
            Some(v) => {
                let bytes: [u8; 8] = v
                    .value()
                    .try_into()
                    .map_err(|_| SyncError::Store("Invalid head sequence bytes".to_string()))?;
                Ok(Some(u64::from_le_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Stored messages of one feed in a sequence range (inclusive).
    pub fn range(&self, feed: &FeedId, from: u64, to: u64) -> SyncResult<Vec<Message>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(MESSAGES_TABLE)?;

        let mut result = Vec::new();
        for seq in from..=to {
            let key = format_message_key(feed.as_str(), seq);
            if let Some(v) = table.get(key.as_str())? {
                result.push(Message::decode(v.value())?);
            }
        }
        Ok(result)
    }

    fn persist_message(&self, message: &Message) -> SyncResult<()> {
        let key = format_message_key(message.author.as_str(), message.sequence);
        let bytes = message.encode()?;

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut messages = write_txn.open_table(MESSAGES_TABLE)?;
            messages.insert(key.as_str(), bytes.as_slice())?;

            let mut heads = write_txn.open_table(HEADS_TABLE)?;
            let current = heads
                .get(message.author.as_str())?
                .map(|v| v.value().to_vec());
            let advance = match current {
                Some(bytes) => {
                    let head = u64::from_le_bytes(bytes.as_slice().try_into().map_err(|_| {
                        SyncError::Store("Invalid head sequence bytes".to_string())
                    })?);
                    message.sequence > head
                }
                None => true,
            };
            if advance {
                heads.insert(
                    message.author.as_str(),
                    &message.sequence.to_le_bytes()[..],
                )?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn persist_state(&self, feed: &FeedId, state: &FeedState) -> SyncResult<()> {
        let bytes = postcard::to_allocvec(state)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(FEED_STATES_TABLE)?;
            table.insert(feed.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Profile Snapshots
    // ═══════════════════════════════════════════════════════════════════

    /// Save a derived profile snapshot for a feed.
    pub fn save_profile(&self, feed: &FeedId, profile: &Profile) -> SyncResult<()> {
        let bytes = postcard::to_allocvec(profile)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(PROFILES_TABLE)?;
            table.insert(feed.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load the profile snapshot for a feed.
    pub fn load_profile(&self, feed: &FeedId) -> SyncResult<Option<Profile>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(PROFILES_TABLE)?;

        match table.get(feed.as_str())? {
            Some(v) => {
                let profile = postcard::from_bytes(v.value())
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    /// List every stored profile snapshot.
    pub fn list_profiles(&self) -> SyncResult<Vec<(FeedId, Profile)>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(PROFILES_TABLE)?;

        let mut profiles = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let feed = FeedId::parse(key.value())?;
            let profile = postcard::from_bytes(value.value())
                .map_err(|e| SyncError::Serialization(e.to_string()))?;
            profiles.push((feed, profile));
        }
        Ok(profiles)
    }

    /// Delete the profile snapshot for a feed.
    pub fn delete_profile(&self, feed: &FeedId) -> SyncResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(PROFILES_TABLE)?;
            table.remove(feed.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl MessageStore for RedbStore {
    async fn add(&self, message: &Message) -> SyncResult<()> {
        self.persist_message(message)
    }

    async fn validate_and_add(&self, message: &Message) -> SyncResult<()> {
        {
            let mut context = self.context.lock();
            validate::append_out_of_order(&mut context, self.hmac_key.as_ref(), message)?;
        }
        self.persist_message(message)
    }

    async fn validate_and_add_strict_order(&self, message: &Message) -> SyncResult<()> {
        let state = {
            let mut context = self.context.lock();
            validate::append_strict(&mut context, self.hmac_key.as_ref(), message)?;
            *context
                .state(&message.author)
                .expect("state exists after strict append")
        };

        self.persist_message(message)?;
        self.persist_state(&message.author, &state)
    }

    async fn mark_partially_replicated(&self, feed: &FeedId, partial: bool) -> SyncResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(PARTIAL_FEEDS_TABLE)?;
            table.insert(feed.as_str(), &[partial as u8][..])?;
        }
        write_txn.commit()?;
        Ok(())
    }

    async fn is_partially_replicated(&self, feed: &FeedId) -> SyncResult<bool> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(PARTIAL_FEEDS_TABLE)?;

        Ok(table
            .get(feed.as_str())?
            .map(|v| v.value() == [1u8])
            .unwrap_or(false))
    }

    async fn feed_states(&self) -> SyncResult<Vec<(FeedId, FeedState)>> {
        Ok(self.context.lock().states())
    }

    async fn reset_feed(&self, feed: &FeedId) -> SyncResult<()> {
        self.context.lock().remove(feed);

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(FEED_STATES_TABLE)?;
            table.remove(feed.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

/// Format a key for the messages table.
fn format_message_key(feed: &str, sequence: u64) -> String {
    format!("{}:{}", feed, sequence)
}
