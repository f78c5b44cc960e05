//! Message validation: strict hash-chain and relaxed out-of-order modes
//!
//! Two acceptance rules share one context:
//!
//! - **Strict** ([`append_strict`]): the message must extend its author's
//!   chain exactly: sequence `last + 1`, `previous` equal to the id of the
//!   last validated message. Used when a feed is replicated contiguously.
//!   The first violation poisons the context; the stream that produced it
//!   cannot be trusted past the break.
//! - **Out-of-order** ([`append_out_of_order`]): only the message's own
//!   integrity is checked (shape and signature). Used when messages arrive
//!   in reverse or non-contiguous order: profile scans, thread assembly,
//!   windowed backfill. Never advances the validated chain state.
//!
//! A feed with no recorded state accepts its first strict message as the
//! chain baseline, whatever its sequence. Windowed replication starts
//! mid-chain, so the baseline's own predecessor link cannot be checked;
//! everything after it can, and is.

use crate::error::{SyncError, SyncResult};
use crate::identity::FeedId;
use crate::message::{Message, MessageId};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Out-of-order appends remembered per context; older entries fall off.
const RECENT_QUEUE_LIMIT: usize = 64;

/// Validated chain position of one feed.
///
/// Advanced only by strict validation, and only forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedState {
    /// Sequence of the last strictly validated message
    pub last_sequence: u64,
    /// Id of that message (the required `previous` of its successor)
    pub last_hash: MessageId,
}

/// Mutable validation state shared by a run of appends.
///
/// Holds the per-feed chain states, a bounded queue of recently appended
/// out-of-order message ids, and the poison marker set by the first strict
/// violation. Independent scans (each profile window, each thread fold)
/// start from a fresh context.
#[derive(Debug, Default)]
pub struct ValidationContext {
    states: HashMap<FeedId, FeedState>,
    recent_out_of_order: VecDeque<MessageId>,
    poisoned: Option<String>,
}

impl ValidationContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the validated chain state for a feed
    pub fn state(&self, feed: &FeedId) -> Option<&FeedState> {
        self.states.get(feed)
    }

    /// Seed a feed's chain state, e.g. when reloading from storage
    pub fn restore(&mut self, feed: FeedId, state: FeedState) {
        self.states.insert(feed, state);
    }

    /// Drop a feed's chain state so its next strict message re-baselines
    pub fn remove(&mut self, feed: &FeedId) {
        self.states.remove(feed);
    }

    /// Snapshot of all known feed states
    pub fn states(&self) -> Vec<(FeedId, FeedState)> {
        self.states
            .iter()
            .map(|(feed, state)| (feed.clone(), *state))
            .collect()
    }

    /// Ids of recently appended out-of-order messages, oldest first
    pub fn recent_out_of_order(&self) -> impl Iterator<Item = &MessageId> {
        self.recent_out_of_order.iter()
    }

    /// Clear the out-of-order queue
    pub fn clear_recent(&mut self) {
        self.recent_out_of_order.clear();
    }

    /// The first strict violation seen by this context, if any
    pub fn failure(&self) -> Option<&str> {
        self.poisoned.as_deref()
    }

    /// Whether a strict violation has poisoned this context
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    fn note_out_of_order(&mut self, id: MessageId) {
        if self.recent_out_of_order.len() == RECENT_QUEUE_LIMIT {
            self.recent_out_of_order.pop_front();
        }
        self.recent_out_of_order.push_back(id);
    }
}

/// Append a message under the strict hash-chain rule.
///
/// On success the author's [`FeedState`] advances to this message. Any
/// violation poisons the context and returns
/// [`SyncError::ChainValidation`]; the caller must treat it as fatal for
/// the current stream.
pub fn append_strict(
    context: &mut ValidationContext,
    hmac_key: Option<&[u8; 32]>,
    message: &Message,
) -> SyncResult<()> {
    if let Some(reason) = &context.poisoned {
        return Err(SyncError::ChainValidation(format!(
            "Context already failed: {}",
            reason
        )));
    }

    if let Err(err) = check_strict(context, hmac_key, message) {
        context.poisoned = Some(err.to_string());
        return Err(err);
    }

    let state = FeedState {
        last_sequence: message.sequence,
        last_hash: message.id(),
    };
    context.states.insert(message.author.clone(), state);

    debug!(
        author = %message.author,
        sequence = message.sequence,
        "accepted message into chain"
    );
    Ok(())
}

/// Append a message under the relaxed out-of-order rule.
///
/// Checks shape and signature only; chain state is left untouched, so the
/// validated sequence never advances past a value it can prove. The
/// message id is recorded in the context's transient queue.
pub fn append_out_of_order(
    context: &mut ValidationContext,
    hmac_key: Option<&[u8; 32]>,
    message: &Message,
) -> SyncResult<()> {
    message.check_well_formed()?;
    message.verify(hmac_key)?;

    context.note_out_of_order(message.id());
    Ok(())
}

fn check_strict(
    context: &ValidationContext,
    hmac_key: Option<&[u8; 32]>,
    message: &Message,
) -> SyncResult<()> {
    message
        .check_well_formed()
        .map_err(|e| SyncError::ChainValidation(e.to_string()))?;

    if let Some(state) = context.states.get(&message.author) {
        let expected = state.last_sequence + 1;
        if message.sequence != expected {
            return Err(SyncError::ChainValidation(format!(
                "Feed {} expected sequence {}, got {}",
                message.author, expected, message.sequence
            )));
        }

        if message.previous != Some(state.last_hash) {
            return Err(SyncError::ChainValidation(format!(
                "Feed {} broke its chain at sequence {}: predecessor link does not match",
                message.author, message.sequence
            )));
        }
    }
    // No state: this message becomes the chain baseline. Its own
    // predecessor cannot be checked when the stream starts mid-feed.

    message
        .verify(hmac_key)
        .map_err(|e| SyncError::ChainValidation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;
    use crate::message::MessageContent;

    fn post(text: &str) -> MessageContent {
        MessageContent::Post {
            text: text.to_string(),
            root: None,
            branch: None,
        }
    }

    fn chain(keypair: &Keypair, n: u64) -> Vec<Message> {
        let mut messages = Vec::new();
        let mut previous = None;
        for seq in 1..=n {
            let message = Message::create(keypair, seq, previous, post(&format!("m{}", seq)), None)
                .expect("Should create");
            previous = Some(message.id());
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_strict_accepts_contiguous_chain() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();

        for message in chain(&keypair, 5) {
            append_strict(&mut context, None, &message).expect("Should accept");
        }

        let state = context.state(&keypair.feed_id()).expect("Should have state");
        assert_eq!(state.last_sequence, 5);
    }

    #[test]
    fn test_strict_accepts_mid_chain_baseline() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let messages = chain(&keypair, 10);

        // A windowed fetch starts at sequence 7 with no prior state.
        for message in &messages[6..] {
            append_strict(&mut context, None, message).expect("Should accept");
        }

        let state = context.state(&keypair.feed_id()).expect("Should have state");
        assert_eq!(state.last_sequence, 10);
    }

    #[test]
    fn test_strict_rejects_sequence_gap() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let messages = chain(&keypair, 4);

        append_strict(&mut context, None, &messages[0]).expect("Should accept");
        append_strict(&mut context, None, &messages[1]).expect("Should accept");

        let err = append_strict(&mut context, None, &messages[3]).expect_err("Gap must fail");
        assert!(matches!(err, SyncError::ChainValidation(_)));
        assert!(context.is_poisoned());
    }

    #[test]
    fn test_strict_rejects_regression() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let messages = chain(&keypair, 3);

        for message in &messages {
            append_strict(&mut context, None, message).expect("Should accept");
        }

        let err = append_strict(&mut context, None, &messages[0]).expect_err("Replay must fail");
        assert!(matches!(err, SyncError::ChainValidation(_)));
    }

    #[test]
    fn test_strict_rejects_broken_predecessor_link() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let messages = chain(&keypair, 2);

        append_strict(&mut context, None, &messages[0]).expect("Should accept");

        // Right sequence, wrong predecessor.
        let fork = Message::create(
            &keypair,
            2,
            Some(messages[0].id()),
            post("fork"),
            None,
        )
        .expect("Should create");
        let mut bad = fork;
        bad.previous = Some(MessageId::from_bytes([0xAB; 32]));

        let err = append_strict(&mut context, None, &bad).expect_err("Bad link must fail");
        assert!(matches!(err, SyncError::ChainValidation(_)));
    }

    #[test]
    fn test_strict_rejects_bad_signature() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let mut message = chain(&keypair, 1).remove(0);
        message.content = post("rewritten");

        let err = append_strict(&mut context, None, &message).expect_err("Must fail");
        assert!(matches!(err, SyncError::ChainValidation(_)));
    }

    #[test]
    fn test_poisoned_context_refuses_further_appends() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let messages = chain(&keypair, 3);

        append_strict(&mut context, None, &messages[0]).expect("Should accept");
        append_strict(&mut context, None, &messages[2]).expect_err("Gap must fail");

        // Even the message that would have been valid is now refused.
        let err = append_strict(&mut context, None, &messages[1]).expect_err("Poisoned");
        assert!(matches!(err, SyncError::ChainValidation(_)));
        assert!(context.failure().is_some());
    }

    #[test]
    fn test_out_of_order_accepts_any_order() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let messages = chain(&keypair, 5);

        for message in messages.iter().rev() {
            append_out_of_order(&mut context, None, message).expect("Should accept");
        }

        // Chain state is never advanced by the relaxed rule.
        assert!(context.state(&keypair.feed_id()).is_none());
        assert_eq!(context.recent_out_of_order().count(), 5);
    }

    #[test]
    fn test_out_of_order_rejects_tampered_message() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let mut message = chain(&keypair, 1).remove(0);
        message.timestamp += 1;

        let err = append_out_of_order(&mut context, None, &message).expect_err("Must fail");
        assert!(matches!(err, SyncError::MessageValidation(_)));
        assert_eq!(context.recent_out_of_order().count(), 0);
    }

    #[test]
    fn test_out_of_order_queue_is_bounded() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();

        for message in chain(&keypair, RECENT_QUEUE_LIMIT as u64 + 10) {
            append_out_of_order(&mut context, None, &message).expect("Should accept");
        }

        assert_eq!(context.recent_out_of_order().count(), RECENT_QUEUE_LIMIT);

        context.clear_recent();
        assert_eq!(context.recent_out_of_order().count(), 0);
    }

    #[test]
    fn test_restore_and_remove_state() {
        let keypair = Keypair::generate();
        let mut context = ValidationContext::new();
        let messages = chain(&keypair, 3);

        context.restore(
            keypair.feed_id(),
            FeedState {
                last_sequence: 2,
                last_hash: messages[1].id(),
            },
        );

        // Continues the restored chain.
        append_strict(&mut context, None, &messages[2]).expect("Should accept");

        context.remove(&keypair.feed_id());
        assert!(context.state(&keypair.feed_id()).is_none());
    }
}
