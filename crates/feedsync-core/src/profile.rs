//! Profile reconstruction from a feed's history
//!
//! A feed describes itself through about-messages scattered over its log.
//! [`sync_latest_profile`] walks the log backward in windows, newest
//! window first, folding those messages into a [`Profile`] until the
//! profile is complete or history runs out.
//!
//! Within one window messages are folded in chronological order, so the
//! earliest value inside the scanned prefix wins; fields are set-once and
//! never overwritten by anything found later in the scan.

use crate::error::SyncResult;
use crate::identity::FeedId;
use crate::message::{ImageRef, MessageContent};
use crate::peer::{FetchDirection, PeerSession};
use crate::validate::{self, ValidationContext};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Reconstructed self-description of one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name
    pub name: Option<String>,
    /// Blob reference of the avatar image
    pub image: Option<String>,
    /// Free-form description
    pub description: Option<String>,
}

impl Profile {
    /// Complete means name and image are both known; description is
    /// best-effort and never blocks termination.
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.image.is_some()
    }

    /// Fold one about-message's fields in. Fields already set are left
    /// alone.
    pub fn merge_about(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        image: Option<&ImageRef>,
    ) {
        if self.name.is_none() {
            if let Some(name) = name {
                self.name = Some(name.to_string());
            }
        }

        if self.image.is_none() {
            if let Some(image) = image {
                self.image = Some(image.link().to_string());
            }
        }

        if self.description.is_none() {
            if let Some(description) = description {
                self.description = Some(description.to_string());
            }
        }
    }

    /// Overlay locally authored edits; a local value replaces the derived
    /// one for the same field.
    pub fn overlay(&mut self, local: &Profile) {
        if local.name.is_some() {
            self.name = local.name.clone();
        }
        if local.image.is_some() {
            self.image = local.image.clone();
        }
        if local.description.is_some() {
            self.description = local.description.clone();
        }
    }
}

/// Scan a feed's history backward for about-messages, merging them into
/// `profile` until it is complete or history is exhausted.
///
/// Each step fetches up to `window` messages ending at `latest_sequence`,
/// newest first, reverses the batch so it folds chronologically, and
/// validates each candidate under the relaxed rule with a context fresh
/// for the window. A message failing validation is logged and skipped; it
/// is never folded.
///
/// A `latest_sequence` of 0 returns the profile as passed in, possibly
/// incomplete. That is the normal terminal state, not an error.
pub async fn sync_latest_profile<P: PeerSession>(
    session: &P,
    feed: &FeedId,
    mut profile: Profile,
    mut latest_sequence: u64,
    window: u64,
    hmac_key: Option<&[u8; 32]>,
) -> SyncResult<Profile> {
    loop {
        if latest_sequence == 0 || profile.is_complete() {
            return Ok(profile);
        }

        let mut batch = session
            .windowed_feed(
                feed,
                latest_sequence,
                window as usize,
                FetchDirection::Reverse,
                false,
            )
            .await?;
        batch.reverse();

        debug!(
            %feed,
            ending_at = latest_sequence,
            fetched = batch.len(),
            "scanning window for about-messages"
        );

        let mut context = ValidationContext::new();
        for message in &batch {
            if !message.content.is_about(feed) {
                continue;
            }

            if let Err(err) = validate::append_out_of_order(&mut context, hmac_key, message) {
                warn!(%feed, sequence = message.sequence, error = %err, "dropping invalid about-message");
                continue;
            }

            if let MessageContent::About {
                name,
                description,
                image,
                ..
            } = &message.content
            {
                profile.merge_about(name.as_deref(), description.as_deref(), image.as_ref());
            }

            if profile.is_complete() {
                break;
            }
        }

        latest_sequence = latest_sequence.saturating_sub(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(link: &str) -> ImageRef {
        ImageRef::Link {
            link: link.to_string(),
        }
    }

    #[test]
    fn test_merge_first_set_wins() {
        let mut profile = Profile::default();

        profile.merge_about(Some("Ada"), None, None);
        profile.merge_about(Some("Someone Else"), Some("bio"), Some(&image("blob:a")));

        assert_eq!(profile.name.as_deref(), Some("Ada"));
        assert_eq!(profile.description.as_deref(), Some("bio"));
        assert_eq!(profile.image.as_deref(), Some("blob:a"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut profile = Profile::default();
        profile.merge_about(Some("Ada"), Some("bio"), Some(&image("blob:a")));
        let snapshot = profile.clone();

        profile.merge_about(Some("Ada"), Some("bio"), Some(&image("blob:a")));
        assert_eq!(profile, snapshot);
    }

    #[test]
    fn test_completeness_needs_name_and_image() {
        let mut profile = Profile::default();
        assert!(!profile.is_complete());

        profile.merge_about(Some("Ada"), Some("bio"), None);
        assert!(!profile.is_complete());

        profile.merge_about(None, None, Some(&image("blob:a")));
        assert!(profile.is_complete());
        assert!(profile.description.is_some());
    }

    #[test]
    fn test_bare_string_image_form() {
        let mut profile = Profile::default();
        profile.merge_about(None, None, Some(&ImageRef::Blob("blob:b".to_string())));
        assert_eq!(profile.image.as_deref(), Some("blob:b"));
    }

    #[test]
    fn test_overlay_local_edits_win() {
        let mut derived = Profile {
            name: Some("Derived".to_string()),
            image: Some("blob:derived".to_string()),
            description: Some("derived bio".to_string()),
        };
        let local = Profile {
            name: Some("Local".to_string()),
            image: None,
            description: None,
        };

        derived.overlay(&local);
        assert_eq!(derived.name.as_deref(), Some("Local"));
        assert_eq!(derived.image.as_deref(), Some("blob:derived"));
        assert_eq!(derived.description.as_deref(), Some("derived bio"));
    }
}
