//! Identity layer: feed ids, keypairs, signatures
//!
//! A feed is owned by exactly one ed25519 keypair. The [`FeedId`] encodes
//! the public key, so any message can be verified knowing only its author
//! field.

pub mod feed_id;
pub mod keypair;
pub mod signature;

pub use feed_id::FeedId;
pub use keypair::Keypair;
pub use signature::FeedSignature;
