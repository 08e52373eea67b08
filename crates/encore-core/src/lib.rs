//! Core matchmaking contract shared between the engine and its consumers.
//!
//! This crate defines the domain types (profiles, matches, messages), the
//! candidate filter, the ordered/deduplicated chat log, the match-list
//! projection, and the common error/retry abstractions. Everything here is
//! pure: store access and task scheduling live in `encore-engine`.

/// Ordered, deduplicated per-match message buffer.
pub mod chat_log;
/// Candidate filter producing the swipe deck.
pub mod deck;
/// Stable engine-facing error types.
pub mod error;
/// Read-side match list projection.
pub mod projector;
/// Backoff policy used by retry loops.
pub mod retry;
/// Domain types (profiles, matches, messages) and engine configuration.
pub mod types;

pub use chat_log::ChatLog;
pub use deck::build_deck;
pub use error::{EngineError, ErrorCategory};
pub use projector::project_match_list;
pub use retry::RetryPolicy;
pub use types::{
    DeckEntry, EngineConfig, MatchEntry, MatchId, MatchRecord, Message, MessageKind, Profile, Role,
};
