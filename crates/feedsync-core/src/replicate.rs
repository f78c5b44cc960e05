//! Replication streams: driving feeds from the peer into the store
//!
//! [`Replicator`] is the engine facade. A sync pass enumerates a snapshot
//! of tracked feeds and drives them strictly one at a time; within one
//! feed, the next message is pulled only after the previous one finished
//! validation and storage, so the fetch can never run ahead of the
//! pipeline.
//!
//! Entry points:
//!
//! - [`Replicator::initial_sync`]: full onboarding pass over an identity
//!   snapshot, strict validation, windowed per the fetch policy
//! - [`Replicator::sync`]: incremental pass continuing every known feed
//!   from its validated position
//! - [`Replicator::sync_feed_from_sequence`]: forward backfill around a
//!   known sequence, relaxed validation
//! - [`Replicator::sync_feed_after_follow`] /
//!   [`Replicator::sync_feed_from_latest`]: newest-first windowed
//!   backfills, relaxed validation
//!
//! Error discipline: stream and chain-validation errors abort the pass;
//! store failures and (on relaxed paths) per-message validation failures
//! are logged and skipped.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::identity::FeedId;
use crate::message::{LatestMessage, Message, MessageId};
use crate::peer::{Connector, PeerSession};
use crate::profile::{self, Profile};
use crate::session::SessionManager;
use crate::store::MessageStore;
use crate::strategy::{plan_feed_fetch, FetchDecision, FetchPlan, FetchPolicy};
use crate::tangle;

use chrono::Utc;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What an identity snapshot knows about one feed before syncing it.
#[derive(Debug, Clone, Default)]
pub struct OnboardEntry {
    /// Newest known message of the feed, if any
    pub latest: Option<LatestMessage>,
    /// Display name carried by the snapshot
    pub name: Option<String>,
    /// Avatar blob reference carried by the snapshot
    pub image: Option<String>,
    /// Description carried by the snapshot
    pub description: Option<String>,
}

/// Counters accumulated over one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Feeds a fetch was issued for (skips not counted)
    pub feeds: u64,
    /// Messages seen on the wire
    pub messages: u64,
    /// Messages the store accepted
    pub accepted: u64,
}

/// Drives replication of tracked feeds through one peer session.
pub struct Replicator<C: Connector, S: MessageStore> {
    sessions: SessionManager<C>,
    store: S,
    config: SyncConfig,
    own_id: FeedId,
    /// Locally authored profile edits; they win over derived values
    local_profiles: HashMap<FeedId, Profile>,
    /// Derived profile snapshot, rebuilt after each full sync pass
    profiles: HashMap<FeedId, Profile>,
}

impl<C: Connector, S: MessageStore> Replicator<C, S> {
    /// Create a replicator for the feed owned by `own_id`.
    pub fn new(connector: C, store: S, config: SyncConfig, own_id: FeedId) -> Self {
        let sessions = SessionManager::new(connector, config.remote_address.clone());
        Self {
            sessions,
            store,
            config,
            own_id,
            local_profiles: HashMap::new(),
            profiles: HashMap::new(),
        }
    }

    /// The store this replicator folds into
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The local operator's own feed id
    pub fn own_id(&self) -> &FeedId {
        &self.own_id
    }

    /// Whether a full sync pass is currently in progress
    pub fn is_initial_sync(&self) -> bool {
        self.sessions.is_initial_sync()
    }

    /// Record a locally authored profile edit. Local edits take precedence
    /// over derived values for the same feed when snapshots are rebuilt.
    pub fn set_local_profile(&mut self, feed: FeedId, profile: Profile) {
        self.local_profiles.insert(feed, profile);
    }

    /// The current profile snapshot for a feed
    pub fn profile(&self, feed: &FeedId) -> Option<&Profile> {
        self.profiles.get(feed)
    }

    /// The full profile snapshot
    pub fn profiles(&self) -> &HashMap<FeedId, Profile> {
        &self.profiles
    }

    /// Full onboarding pass over a snapshot of tracked feeds.
    ///
    /// The snapshot is taken by the caller and iterated exactly once; feeds
    /// added or dropped mid-pass wait for the next one. Each feed goes
    /// through the fetch planner; planned fetches stream history through
    /// strict validation into the store. A fatal error aborts the
    /// remainder of the pass, and the initial-sync flag is cleared either
    /// way.
    pub async fn initial_sync(
        &mut self,
        onboard: &BTreeMap<FeedId, OnboardEntry>,
    ) -> SyncResult<SyncReport> {
        let session = self.sessions.connected().await?;
        let _guard = self.sessions.begin_initial_sync();

        let policy = FetchPolicy::from_config(&self.config);
        let now = Utc::now();
        let mut report = SyncReport::default();

        info!(feeds = onboard.len(), "starting full sync pass");

        for (feed, entry) in onboard {
            let is_self = *feed == self.own_id;

            let plan = match plan_feed_fetch(is_self, entry.latest.as_ref(), &policy, now) {
                FetchDecision::Skip(reason) => {
                    debug!(%feed, ?reason, "skipping feed");
                    continue;
                }
                FetchDecision::Fetch(plan) => plan,
            };

            if !is_self {
                self.store.mark_partially_replicated(feed, plan.partial).await?;
            }

            report.feeds += 1;
            debug!(%feed, start = plan.start_sequence, "downloading messages");

            let mut stream = session.history_stream(feed, plan.start_sequence, false);
            while let Some(next) = stream.next().await {
                let message = next?;
                report.messages += 1;

                match self.store.validate_and_add_strict_order(&message).await {
                    Ok(()) => report.accepted += 1,
                    Err(err) if err.is_store_error() => {
                        warn!(%feed, sequence = message.sequence, error = %err, "store rejected message");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        info!(
            feeds = report.feeds,
            messages = report.messages,
            accepted = report.accepted,
            "full sync pass complete"
        );

        self.rebuild_profiles(onboard);
        Ok(report)
    }

    /// Incremental pass: continue every known feed from its validated
    /// position, and ask the peer to replicate our own feed back.
    pub async fn sync(&mut self) -> SyncResult<SyncReport> {
        let session = self.sessions.connected().await?;

        session.request_own_feed_replication(&self.own_id).await?;

        let states = self.store.feed_states().await?;
        let mut report = SyncReport::default();

        for (feed, state) in states {
            report.feeds += 1;

            let mut stream = session.history_stream(&feed, state.last_sequence + 1, false);
            while let Some(next) = stream.next().await {
                let message = next?;
                report.messages += 1;

                match self.store.validate_and_add_strict_order(&message).await {
                    Ok(()) => report.accepted += 1,
                    Err(err) if err.is_store_error() => {
                        warn!(%feed, sequence = message.sequence, error = %err, "store rejected message");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        info!(
            feeds = report.feeds,
            messages = report.messages,
            accepted = report.accepted,
            "incremental sync complete"
        );
        Ok(report)
    }

    /// Forward backfill of one feed around a known sequence, relaxed
    /// validation. Used to widen a partial window.
    pub async fn sync_feed_from_sequence(
        &mut self,
        feed: &FeedId,
        sequence: u64,
    ) -> SyncResult<SyncReport> {
        let session = self.sessions.connected().await?;

        let start = sequence.saturating_sub(self.config.backfill_window);
        if start > 0 {
            self.store.mark_partially_replicated(feed, true).await?;
        }

        debug!(%feed, start, "backfilling feed");

        let mut report = SyncReport { feeds: 1, ..Default::default() };
        let mut stream = session.history_stream(feed, start, false);
        while let Some(next) = stream.next().await {
            let message = next?;
            report.messages += 1;
            if self.fold_relaxed(feed, &message).await? {
                report.accepted += 1;
            }
        }

        Ok(report)
    }

    /// Backfill a feed just followed: forget any stale validation state,
    /// then pull a newest-first window.
    pub async fn sync_feed_after_follow(&mut self, feed: &FeedId) -> SyncResult<SyncReport> {
        self.store.reset_feed(feed).await?;
        self.store.mark_partially_replicated(feed, false).await?;

        let limit = self.config.backfill_window;
        self.reverse_window_fill(feed, limit).await
    }

    /// Refresh a feed from its newest messages with the regular sync
    /// window.
    pub async fn sync_feed_from_latest(&mut self, feed: &FeedId) -> SyncResult<SyncReport> {
        let limit = self.config.sync_window;
        self.reverse_window_fill(feed, limit).await
    }

    async fn reverse_window_fill(&mut self, feed: &FeedId, limit: u64) -> SyncResult<SyncReport> {
        let session = self.sessions.connected().await?;
        let plan = FetchPlan::reverse_window();

        debug!(%feed, limit, "downloading newest-first window");

        let batch = session
            .windowed_feed(
                feed,
                plan.start_sequence,
                limit as usize,
                plan.mode.direction(),
                false,
            )
            .await?;

        let mut report = SyncReport { feeds: 1, ..Default::default() };
        let mut oldest = u64::MAX;
        for message in &batch {
            report.messages += 1;
            if self.fold_relaxed(feed, message).await? {
                report.accepted += 1;
                oldest = oldest.min(message.sequence);
            }
        }

        // A window that stops short of the first message leaves a partial
        // local log.
        if oldest != u64::MAX && oldest > 1 {
            self.store.mark_partially_replicated(feed, true).await?;
        }

        Ok(report)
    }

    /// Fold one message under the relaxed rule. Per-message validation
    /// failures and store failures are logged and skipped; anything else
    /// propagates. Returns whether the message was accepted.
    async fn fold_relaxed(&self, feed: &FeedId, message: &Message) -> SyncResult<bool> {
        match self.store.validate_and_add(message).await {
            Ok(()) => Ok(true),
            Err(SyncError::MessageValidation(reason)) => {
                warn!(%feed, sequence = message.sequence, %reason, "dropping invalid message");
                Ok(false)
            }
            Err(err) if err.is_store_error() => {
                warn!(%feed, sequence = message.sequence, error = %err, "store rejected message");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Reconstruct a feed's profile by scanning its history backward.
    pub async fn sync_latest_profile(
        &mut self,
        feed: &FeedId,
        profile: Profile,
        latest_sequence: u64,
    ) -> SyncResult<Profile> {
        let session = self.sessions.connected().await?;
        profile::sync_latest_profile(
            session.as_ref(),
            feed,
            profile,
            latest_sequence,
            self.config.profile_window,
            self.config.hmac_key.as_ref(),
        )
        .await
    }

    /// Fetch and fold the thread around a root message. The fold stops
    /// promptly once `cancel` fires.
    pub async fn thread(
        &mut self,
        root: &MessageId,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<Message>> {
        let session = self.sessions.connected().await?;
        tangle::fetch_thread(session.as_ref(), &self.store, root, cancel).await
    }

    /// Rebuild the derived profile snapshot from onboarding data, with
    /// locally authored edits taking precedence.
    fn rebuild_profiles(&mut self, onboard: &BTreeMap<FeedId, OnboardEntry>) {
        let mut cleaned: HashMap<FeedId, Profile> = HashMap::new();

        for (feed, entry) in onboard {
            cleaned.insert(
                feed.clone(),
                Profile {
                    name: entry.name.clone(),
                    image: entry.image.clone(),
                    description: entry.description.clone(),
                },
            );
        }

        for (feed, local) in &self.local_profiles {
            cleaned.entry(feed.clone()).or_default().overlay(local);
        }

        self.profiles = cleaned;
    }
}
