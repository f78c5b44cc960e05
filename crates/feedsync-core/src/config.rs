//! Configuration for a sync node

/// Tunables for replication, backfill and profile scanning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address of the gossip peer to replicate against
    pub remote_address: String,
    /// Trailing window for the regular sync pass
    pub sync_window: u64,
    /// Window for backfilling a feed after following it
    pub backfill_window: u64,
    /// Window per step of a backward profile scan
    pub profile_window: u64,
    /// Feeds quieter than this are skipped during sync (own feed excepted)
    pub recency_cutoff: chrono::Duration,
    /// Network key mixed into signing digests; messages signed under a
    /// different key never verify here
    pub hmac_key: Option<[u8; 32]>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_address: String::new(),
            sync_window: 25,
            backfill_window: 100,
            profile_window: 200,
            recency_cutoff: chrono::Duration::days(30),
            hmac_key: None,
        }
    }
}

impl SyncConfig {
    /// Configuration pointed at a remote peer, defaults otherwise
    pub fn with_remote(remote_address: impl Into<String>) -> Self {
        Self {
            remote_address: remote_address.into(),
            ..Default::default()
        }
    }
}
