use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, ErrorCategory},
    retry::RetryPolicy,
};

/// User role; every profile is exactly one of the two sides of the market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Performing act looking for venues to play.
    Performer,
    /// Venue looking for acts to book.
    Venue,
}

impl Role {
    /// The role a viewer is shown while swiping.
    pub fn opposite(self) -> Role {
        match self {
            Role::Performer => Role::Venue,
            Role::Venue => Role::Performer,
        }
    }
}

/// User profile as read from the directory. Owned by the identity service;
/// read-only to this core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Stable user id.
    pub id: String,
    /// Which side of the market this profile is on.
    pub role: Role,
    /// Display name.
    pub name: String,
    /// Free-text bio.
    pub bio: Option<String>,
    /// Musical genre (performer profiles).
    pub genre: Option<String>,
    /// Venue kind, for example "club" or "festival" (venue profiles).
    pub venue_type: Option<String>,
    /// Avatar URL.
    pub profile_image: Option<String>,
    /// Header/gallery image URLs.
    pub header_images: Vec<String>,
    /// Demo audio URL (performer profiles).
    pub audio_url: Option<String>,
}

/// Canonical match identifier: the two member ids sorted lexicographically
/// and joined with `_`.
///
/// Both sides of a pair compute the same id, which is what makes concurrent
/// match creation converge on one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    /// Compute the canonical id for an unordered pair of distinct users.
    pub fn for_pair(a: &str, b: &str) -> Result<Self, EngineError> {
        if a == b {
            return Err(EngineError::new(
                ErrorCategory::Invalid,
                "self_pair",
                format!("cannot pair user '{a}' with itself"),
            ));
        }

        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        Ok(Self(format!("{lo}_{hi}")))
    }

    /// Wrap an id string already produced by [`MatchId::for_pair`], for
    /// example a store document key.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The id as a store document key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One formed match. Immutable once created; never deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRecord {
    /// Canonical match id.
    pub id: MatchId,
    /// The two member ids, in canonical (sorted) order.
    pub users: [String; 2],
    /// Server-assigned creation time in epoch millis. `None` only for
    /// malformed stored documents; such matches still surface, sorted last.
    pub matched_at: Option<u64>,
}

impl MatchRecord {
    /// Whether `user_id` is one of the two members.
    pub fn contains(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }

    /// The other member, from `viewer_id`'s perspective.
    pub fn counterpart_of(&self, viewer_id: &str) -> Option<&str> {
        if !self.contains(viewer_id) {
            return None;
        }
        self.users.iter().map(String::as_str).find(|u| *u != viewer_id)
    }
}

/// Message kind stored alongside the body.
///
/// `DateRequest` orders and stores exactly like text; it is a one-way
/// annotation the presentation layer renders distinctly. There is no
/// accept/decline transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain chat text.
    Text,
    /// Calendar-date proposal; the body is a date string.
    DateRequest,
}

/// One chat message. Append-only; timestamps are store-assigned, never taken
/// from the client clock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned message id.
    pub id: String,
    /// Sending member's user id.
    pub sender_id: String,
    /// Store-assigned timestamp in epoch millis.
    pub timestamp_ms: u64,
    /// Store-assigned insertion order, the tiebreak for equal timestamps.
    pub seq: u64,
    /// Message kind.
    pub kind: MessageKind,
    /// Text body (a calendar-date string for `DateRequest`).
    pub body: String,
}

impl Message {
    /// Position of this message in the per-match total order.
    pub fn order_key(&self) -> (u64, u64) {
        (self.timestamp_ms, self.seq)
    }
}

/// One card in the current swipe session. Ephemeral and derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckEntry {
    /// Position in the deck.
    pub index: usize,
    /// The candidate profile.
    pub profile: Profile,
}

/// One row of the viewer-facing match list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEntry {
    /// Canonical match id, used to open the chat.
    pub match_id: MatchId,
    /// The counterpart's profile.
    pub counterpart: Profile,
    /// Match creation time, when the stored record carried one.
    pub matched_at: Option<u64>,
}

/// Engine tuning values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backoff policy for store retries and chat resubscription.
    pub retry: RetryPolicy,
    /// Buffer size of the per-subscription chat event channel.
    pub chat_event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            chat_event_buffer: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn canonical_id_sorts_members() {
        let id = MatchId::for_pair("venue-9", "artist-1").expect("distinct pair");
        assert_eq!(id.as_str(), "artist-1_venue-9");
    }

    #[test]
    fn rejects_pairing_a_user_with_itself() {
        let err = MatchId::for_pair("u1", "u1").expect_err("self pair must fail");
        assert_eq!(err.code, "self_pair");
    }

    #[test]
    fn counterpart_is_the_other_member() {
        let record = MatchRecord {
            id: MatchId::for_pair("a", "b").expect("distinct pair"),
            users: ["a".to_owned(), "b".to_owned()],
            matched_at: Some(1_700_000_000_000),
        };

        assert_eq!(record.counterpart_of("a"), Some("b"));
        assert_eq!(record.counterpart_of("b"), Some("a"));
        assert_eq!(record.counterpart_of("c"), None);
    }

    proptest! {
        #[test]
        fn canonical_id_is_order_independent(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
            prop_assume!(a != b);
            let forward = MatchId::for_pair(&a, &b).expect("distinct pair");
            let reverse = MatchId::for_pair(&b, &a).expect("distinct pair");
            prop_assert_eq!(forward, reverse);
        }
    }
}
