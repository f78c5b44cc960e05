//! Feedsync Core Library
//!
//! Replication of append-only per-identity message logs ("feeds") over
//! gossip-style peers, with validation before anything reaches durable
//! state.
//!
//! ## Overview
//!
//! Every identity owns one append-only feed of signed, hash-chained
//! messages. Syncing against a peer means deciding, per tracked feed, how
//! much history to pull (full vs. a recent window), streaming it in order,
//! validating each message (strictly against the hash chain when the feed
//! is tracked contiguously, relaxed when messages arrive out of order),
//! and folding the survivors into the store. Profiles are reconstructed
//! on demand by scanning a feed's history backward; reply threads are
//! assembled from causally linked message sets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Replicator (one pass, one feed at a time)                      │
//! │  ├── SessionManager (memoized peer session)                     │
//! │  ├── plan_feed_fetch (skip / full / windowed, per feed)         │
//! │  ├── history/window streams ──▶ Validator ──▶ MessageStore      │
//! │  │     strict: append_strict   (chain state advances)           │
//! │  │     relaxed: append_out_of_order (chain state untouched)     │
//! │  └── SyncReport (feeds / messages / accepted)                   │
//! │                                                                 │
//! │  sync_latest_profile (backward windowed about-scan)             │
//! │  fetch_thread (tangle fold with cancellation)                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use feedsync_core::{Replicator, SyncConfig, MemoryStore, Keypair};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keys = Keypair::generate();
//!     let config = SyncConfig::with_remote("net:peer.example:8008");
//!     let mut replicator =
//!         Replicator::new(my_connector, MemoryStore::new(), config, keys.feed_id());
//!
//!     let report = replicator.initial_sync(&onboard_snapshot).await?;
//!     println!("accepted {} of {} messages", report.accepted, report.messages);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod peer;
pub mod profile;
pub mod replicate;
pub mod session;
pub mod store;
pub mod strategy;
pub mod tangle;
pub mod validate;

// Re-exports
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use identity::{FeedId, FeedSignature, Keypair};
pub use message::{ImageRef, LatestMessage, Message, MessageContent, MessageId};
pub use peer::{Connector, FetchDirection, MessageStream, PeerSession};
pub use profile::{sync_latest_profile, Profile};
pub use replicate::{OnboardEntry, Replicator, SyncReport};
pub use session::{InitialSyncGuard, SessionManager};
pub use store::{MemoryStore, MessageStore, RedbStore};
pub use strategy::{
    plan_feed_fetch, FetchDecision, FetchMode, FetchPlan, FetchPolicy, SkipReason,
};
pub use tangle::{fetch_thread, sync_thread};
pub use validate::{append_out_of_order, append_strict, FeedState, ValidationContext};
