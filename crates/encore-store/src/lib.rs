//! Store seam between the matchmaking engine and the external document store.
//!
//! The engine only ever talks to the [`MatchStore`] trait. Documents coming
//! back from the store are loosely typed; [`doc`] validates them into the
//! core types at this boundary so no undefined fields propagate upward.
//! [`memory`] provides the in-memory implementation used by tests and the
//! smoke app.

/// Typed store documents and boundary validation.
pub mod doc;
/// In-memory store implementation.
pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use encore_core::{MatchId, MatchRecord, Message, MessageKind, Profile};

pub use memory::MemoryStore;

/// Errors surfaced by store implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient transport/availability failure; the operation may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The addressed document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),
    /// A stored document failed boundary validation.
    #[error("malformed document at '{path}': {reason}")]
    Malformed {
        /// Store path of the offending document.
        path: String,
        /// What failed to validate.
        reason: String,
    },
}

/// Document-store operations the matchmaking core depends on.
///
/// `create_match_if_absent` is the concurrency primitive of the whole core:
/// it must behave as a conditional write keyed by the canonical match id so
/// that two clients resolving the same pair converge on one record.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Read one profile document; `None` when absent.
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError>;

    /// Read all valid profile documents. Malformed profiles are skipped.
    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    /// Record that `owner` likes `target`. Merge-style upsert; recording an
    /// existing favorite is not an error.
    async fn set_favorite(&self, owner: &str, target: &str) -> Result<(), StoreError>;

    /// Clear `owner`'s favorite of `target`. Idempotent.
    async fn clear_favorite(&self, owner: &str, target: &str) -> Result<(), StoreError>;

    /// Ids currently favorited by `owner`; empty when no document exists.
    async fn favorites_of(&self, owner: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Create the match record under its canonical id unless it already
    /// exists. The first writer gets a server-assigned `matched_at`; later
    /// writers receive the existing record unchanged.
    async fn create_match_if_absent(
        &self,
        id: &MatchId,
        users: [String; 2],
    ) -> Result<MatchRecord, StoreError>;

    /// Read one match record; `None` when absent.
    async fn get_match(&self, id: &MatchId) -> Result<Option<MatchRecord>, StoreError>;

    /// All matches whose member set contains `user_id`.
    async fn matches_containing(&self, user_id: &str) -> Result<Vec<MatchRecord>, StoreError>;

    /// Append one message with store-assigned id, timestamp, and sequence
    /// number. Fails `NotFound` for an unknown match.
    async fn append_message(
        &self,
        match_id: &MatchId,
        sender_id: &str,
        kind: MessageKind,
        body: &str,
    ) -> Result<Message, StoreError>;

    /// Full message history for a match, ordered by `(timestamp_ms, seq)`.
    async fn message_history(&self, match_id: &MatchId) -> Result<Vec<Message>, StoreError>;

    /// Live feed of messages appended after the point of subscription.
    async fn watch_messages(
        &self,
        match_id: &MatchId,
    ) -> Result<broadcast::Receiver<Message>, StoreError>;
}
