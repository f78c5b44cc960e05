//! Abstract peer surface consumed by the replication pipeline
//!
//! The wire protocol, handshake and transport live behind these traits.
//! The pipeline only needs four operations from a connected peer: an
//! ordered history stream, a bounded window of a feed, the causally linked
//! set around a root message, and a request that the peer replicate the
//! local operator's own feed back.

use crate::error::SyncResult;
use crate::identity::FeedId;
use crate::message::{Message, MessageId};

use futures::stream::BoxStream;

/// Ordered stream of fetched messages; each item yields after the previous
/// one was pulled, which is what gives the pipeline its backpressure.
pub type MessageStream<'a> = BoxStream<'a, SyncResult<Message>>;

/// Which way a windowed fetch walks the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    /// Ascending sequences starting at `from_sequence`
    Forward,
    /// Descending sequences starting at `from_sequence`; a `from_sequence`
    /// of 0 means "start at the feed's newest message"
    Reverse,
}

/// One established session with a remote peer.
#[allow(async_fn_in_trait)]
pub trait PeerSession {
    /// Whether the session has been torn down; a closed session is
    /// replaced on the next connect
    fn is_closed(&self) -> bool;

    /// Ordered history of one feed from `from_sequence` (inclusive)
    /// onward. `include_keys` asks the peer to precompute message ids.
    fn history_stream(
        &self,
        feed: &FeedId,
        from_sequence: u64,
        include_keys: bool,
    ) -> MessageStream<'static>;

    /// Up to `limit` messages of one feed, walked per `direction`.
    async fn windowed_feed(
        &self,
        feed: &FeedId,
        from_sequence: u64,
        limit: usize,
        direction: FetchDirection,
        include_keys: bool,
    ) -> SyncResult<Vec<Message>>;

    /// The causally linked message set around a root message, in whatever
    /// order the peer presents it.
    async fn tangle(&self, root: &MessageId) -> SyncResult<Vec<Message>>;

    /// Ask the peer to start replicating the local operator's own feed.
    async fn request_own_feed_replication(&self, own: &FeedId) -> SyncResult<()>;
}

/// Dials remote peers.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// Session type produced by a successful dial
    type Session: PeerSession;

    /// Open a session to the peer at `address`. Failure is fatal to the
    /// caller; there is no retry policy.
    async fn connect(&self, address: &str) -> SyncResult<Self::Session>;
}
