//! Durable message storage behind the replication pipeline
//!
//! The pipeline talks to storage through [`MessageStore`]. Three append
//! entry points share the validator:
//!
//! - `add`: unconditional, for messages validated upstream
//! - `validate_and_add`: relaxed (out-of-order) validation, then append
//! - `validate_and_add_strict_order`: hash-chain validation, then append
//!
//! Only the strict path advances a feed's validated chain state; relaxed
//! appends never move it. Stores also record which feeds hold a windowed
//! slice of history rather than the complete log.

pub mod disk;
pub mod memory;

pub use disk::RedbStore;
pub use memory::MemoryStore;

use crate::error::SyncResult;
use crate::identity::FeedId;
use crate::message::Message;
use crate::validate::FeedState;

/// Storage surface consumed by the replication pipeline.
#[allow(async_fn_in_trait)]
pub trait MessageStore {
    /// Append without validating; the caller already did.
    async fn add(&self, message: &Message) -> SyncResult<()>;

    /// Validate under the relaxed out-of-order rule, then append.
    async fn validate_and_add(&self, message: &Message) -> SyncResult<()>;

    /// Validate under the strict hash-chain rule, then append.
    async fn validate_and_add_strict_order(&self, message: &Message) -> SyncResult<()>;

    /// Record whether this feed's local log is a partial window.
    async fn mark_partially_replicated(&self, feed: &FeedId, partial: bool) -> SyncResult<()>;

    /// Whether this feed's local log is a partial window.
    async fn is_partially_replicated(&self, feed: &FeedId) -> SyncResult<bool>;

    /// Snapshot of every feed's validated chain state.
    async fn feed_states(&self) -> SyncResult<Vec<(FeedId, FeedState)>>;

    /// Forget a feed's validated chain state so its next strict message
    /// re-baselines the chain. Stored messages are kept.
    async fn reset_feed(&self, feed: &FeedId) -> SyncResult<()>;
}
