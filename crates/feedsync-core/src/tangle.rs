//! Thread assembly from causally linked message sets
//!
//! A tangle is the set of messages referencing a root message, gathered
//! across feeds and independent of any feed's sequence order. The fold
//! keeps the order the source presented, validates each post under the
//! relaxed rule, and stops at the first error, which is surfaced to the
//! caller.
//!
//! The fold honors a cancellation token: once cancelled, no further
//! message is validated or stored.

use crate::error::{SyncError, SyncResult};
use crate::message::{Message, MessageId};
use crate::peer::PeerSession;
use crate::store::MessageStore;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fold an already-fetched message set into the store, keeping posts only
/// and preserving input order. Returns the accepted messages.
pub async fn sync_thread<S: MessageStore>(
    store: &S,
    messages: Vec<Message>,
    cancel: &CancellationToken,
) -> SyncResult<Vec<Message>> {
    let mut accepted = Vec::with_capacity(messages.len());

    for message in messages {
        if cancel.is_cancelled() {
            debug!(accepted = accepted.len(), "thread fold aborted");
            return Err(SyncError::Aborted);
        }

        if !message.content.is_post() {
            continue;
        }

        store.validate_and_add(&message).await?;
        accepted.push(message);
    }

    Ok(accepted)
}

/// Fetch the tangle around `root` from the peer and fold it into the
/// store.
pub async fn fetch_thread<P: PeerSession, S: MessageStore>(
    session: &P,
    store: &S,
    root: &MessageId,
    cancel: &CancellationToken,
) -> SyncResult<Vec<Message>> {
    let messages = session.tangle(root).await?;
    debug!(%root, fetched = messages.len(), "fetched tangle");
    sync_thread(store, messages, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;
    use crate::message::MessageContent;
    use crate::store::MemoryStore;

    fn thread_post(keypair: &Keypair, sequence: u64, root: MessageId, text: &str) -> Message {
        Message::create(
            keypair,
            sequence,
            Some(root),
            MessageContent::Post {
                text: text.to_string(),
                root: Some(root),
                branch: None,
            },
            None,
        )
        .expect("Should create")
    }

    fn root_post(keypair: &Keypair) -> Message {
        Message::create(
            keypair,
            1,
            None,
            MessageContent::Post {
                text: "root".to_string(),
                root: None,
                branch: None,
            },
            None,
        )
        .expect("Should create")
    }

    #[tokio::test]
    async fn test_fold_keeps_posts_only() {
        let store = MemoryStore::new();
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        let root = root_post(&alice);
        let root_id = root.id();

        let reply = thread_post(&bob, 5, root_id, "reply");
        let vote = Message::create(
            &bob,
            6,
            Some(reply.id()),
            MessageContent::Vote {
                link: root_id,
                value: 1,
            },
            None,
        )
        .expect("Should create");

        let cancel = CancellationToken::new();
        let accepted = sync_thread(&store, vec![root.clone(), reply.clone(), vote], &cancel)
            .await
            .expect("Should fold");

        assert_eq!(accepted, vec![root, reply]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_first_error_is_surfaced() {
        let store = MemoryStore::new();
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        let root = root_post(&alice);
        let mut tampered = thread_post(&bob, 5, root.id(), "reply");
        tampered.timestamp += 1;
        let later = thread_post(&bob, 6, root.id(), "later reply");

        let cancel = CancellationToken::new();
        let err = sync_thread(&store, vec![root, tampered, later], &cancel)
            .await
            .expect_err("Tampered message must abort the fold");

        assert!(matches!(err, SyncError::MessageValidation(_)));
        // The root was folded before the error; the later reply was not.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_fold_stores_nothing_further() {
        let store = MemoryStore::new();
        let alice = Keypair::generate();

        let root = root_post(&alice);
        let messages = vec![root.clone()];

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = sync_thread(&store, messages, &cancel)
            .await
            .expect_err("Cancelled fold must abort");
        assert!(matches!(err, SyncError::Aborted));
        assert!(store.is_empty());
    }
}
