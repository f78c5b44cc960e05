//! Session management for the single remote peer
//!
//! One live session per node. [`SessionManager::connected`] memoizes the
//! dialed session and only dials again once the previous one reports
//! closed. A dial failure is fatal and propagates; there is no retry.
//!
//! The manager also owns the "initial sync in progress" flag. Full-sync
//! entry points raise it through an RAII guard, which guarantees the flag
//! is lowered on every exit path, success or fatal error alike.

use crate::error::{SyncError, SyncResult};
use crate::peer::{Connector, PeerSession};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Lazily established, memoized connection to the configured remote peer.
pub struct SessionManager<C: Connector> {
    connector: C,
    remote_address: String,
    session: Option<Arc<C::Session>>,
    initial_sync: Arc<AtomicBool>,
}

impl<C: Connector> SessionManager<C> {
    /// Create a manager dialing `remote_address` on demand
    pub fn new(connector: C, remote_address: impl Into<String>) -> Self {
        Self {
            connector,
            remote_address: remote_address.into(),
            session: None,
            initial_sync: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The configured remote address
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Return the live session, dialing if none exists or the previous one
    /// was marked closed.
    pub async fn connected(&mut self) -> SyncResult<Arc<C::Session>> {
        if let Some(session) = &self.session {
            if !session.is_closed() {
                return Ok(session.clone());
            }
        }

        // A fresh dial outside a full-sync entry point means any previous
        // initial sync is over.
        self.initial_sync.store(false, Ordering::SeqCst);

        debug!(address = %self.remote_address, "dialing remote peer");
        let session = self
            .connector
            .connect(&self.remote_address)
            .await
            .map_err(|e| match e {
                SyncError::Connection(_) => e,
                other => SyncError::Connection(other.to_string()),
            })?;

        let session = Arc::new(session);
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Whether a full sync pass is currently in progress
    pub fn is_initial_sync(&self) -> bool {
        self.initial_sync.load(Ordering::SeqCst)
    }

    /// Raise the initial-sync flag for the lifetime of the returned guard.
    pub fn begin_initial_sync(&self) -> InitialSyncGuard {
        self.initial_sync.store(true, Ordering::SeqCst);
        InitialSyncGuard {
            flag: self.initial_sync.clone(),
        }
    }
}

/// Clears the initial-sync flag when dropped, whichever way the sync pass
/// ended.
pub struct InitialSyncGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for InitialSyncGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
