//! Matchmaking engine: the async services UI screens call into.
//!
//! Wires the pure core (`encore-core`) to a [`MatchStore`] implementation.
//! Every operation takes the acting user explicitly; there is no ambient
//! session state, so behavior is a function of arguments plus the store.

/// Live chat subscription task and its event types.
pub mod chat;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use encore_core::{
    DeckEntry, EngineConfig, EngineError, ErrorCategory, MatchEntry, MatchId, MatchRecord,
    Message, MessageKind, Profile, Role, build_deck, project_match_list,
};
use encore_store::{MatchStore, StoreError};

pub use chat::{ChatStreamEvent, ChatSubscription};

/// Result of a swipe-right resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwipeOutcome {
    /// The reciprocal favorite existed; the match record is live.
    Matched(MatchRecord),
    /// The favorite is recorded but the other side has not favorited back.
    NotYetMatched,
}

/// Matchmaking engine handle. Cheap to clone via the shared store.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn MatchStore>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with default tuning.
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Create an engine with explicit tuning.
    pub fn with_config(store: Arc<dyn MatchStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Current engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the viewer's swipe deck: every profile of the opposite role,
    /// minus the viewer and anyone already matched.
    pub async fn swipe_deck(
        &self,
        viewer_id: &str,
        viewer_role: Role,
    ) -> Result<Vec<DeckEntry>, EngineError> {
        let pool = self
            .with_retry("list_profiles", || self.store.list_profiles())
            .await
            .map_err(map_store_error)?;
        let matched: HashSet<String> = self
            .with_retry("matches_containing", || {
                self.store.matches_containing(viewer_id)
            })
            .await
            .map_err(map_store_error)?
            .iter()
            .filter_map(|record| record.counterpart_of(viewer_id).map(ToOwned::to_owned))
            .collect();

        Ok(build_deck(viewer_id, viewer_role, &pool, &matched))
    }

    /// Record that `owner` likes `target`. Idempotent; a persistence failure
    /// surfaces as `favorite_failed` and must not be read as "not favorited".
    pub async fn add_favorite(&self, owner: &str, target: &str) -> Result<(), EngineError> {
        MatchId::for_pair(owner, target)?;
        self.with_retry("set_favorite", || self.store.set_favorite(owner, target))
            .await
            .map_err(favorite_failed)
    }

    /// Clear `owner`'s favorite of `target`. Never deletes an existing match.
    pub async fn remove_favorite(&self, owner: &str, target: &str) -> Result<(), EngineError> {
        self.with_retry("clear_favorite", || {
            self.store.clear_favorite(owner, target)
        })
        .await
        .map_err(unfavorite_failed)
    }

    /// Whether `owner` currently likes `target`.
    pub async fn is_favorited(&self, owner: &str, target: &str) -> Result<bool, EngineError> {
        let favorites = self
            .with_retry("favorites_of", || self.store.favorites_of(owner))
            .await
            .map_err(map_store_error)?;
        Ok(favorites.contains(target))
    }

    /// The owner's favorites with target profiles joined in, in ledger
    /// order. A target whose profile cannot be fetched omits that entry
    /// instead of failing the list, same as [`Self::match_list`].
    pub async fn favorite_list(&self, owner: &str) -> Result<Vec<Profile>, EngineError> {
        let targets = self
            .with_retry("favorites_of", || self.store.favorites_of(owner))
            .await
            .map_err(map_store_error)?;

        let mut list = Vec::with_capacity(targets.len());
        for target in &targets {
            match self.store.get_profile(target).await {
                Ok(Some(profile)) => list.push(profile),
                Ok(None) => {
                    debug!(target_id = %target, "favorite target profile missing; omitting entry");
                }
                Err(err) => {
                    warn!(target_id = %target, error = %err, "favorite target profile fetch failed; omitting entry");
                }
            }
        }
        Ok(list)
    }

    /// Resolve a swipe-right: record the favorite, check reciprocity, and on
    /// a mutual favorite create the match exactly once.
    ///
    /// Both sides of a pair may run this concurrently; the conditional write
    /// under the canonical id makes them converge on one record. Once the
    /// favorite write succeeds the sequence runs to completion within this
    /// call rather than observing cancellation.
    pub async fn swipe_right(
        &self,
        owner: &str,
        target: &str,
    ) -> Result<SwipeOutcome, EngineError> {
        let match_id = MatchId::for_pair(owner, target)?;

        // Step 1: the favorite must be durable before reciprocity is read.
        self.with_retry("set_favorite", || self.store.set_favorite(owner, target))
            .await
            .map_err(favorite_failed)?;

        // Step 2: reciprocity.
        let reciprocal = self
            .with_retry("favorites_of", || self.store.favorites_of(target))
            .await
            .map_err(map_store_error)?;
        if !reciprocal.contains(owner) {
            return Ok(SwipeOutcome::NotYetMatched);
        }

        // Step 3: conditional create. Both sides submit identical canonical
        // content, so a retry or a concurrent resolution cannot duplicate.
        let users = canonical_users(owner, target);
        let record = self
            .with_retry("create_match_if_absent", || {
                self.store.create_match_if_absent(&match_id, users.clone())
            })
            .await
            .map_err(match_create_failed)?;

        debug!(match_id = %record.id, "mutual favorite resolved into match");
        Ok(SwipeOutcome::Matched(record))
    }

    /// Append one message to a match's log.
    ///
    /// The sender must be a member of an existing match; authorization is a
    /// precondition checked before any write.
    pub async fn send_message(
        &self,
        match_id: &MatchId,
        sender_id: &str,
        kind: MessageKind,
        body: &str,
    ) -> Result<Message, EngineError> {
        let record = self.require_match(match_id).await?;
        if !record.contains(sender_id) {
            return Err(EngineError::not_a_participant(match_id.as_str(), sender_id));
        }

        self.with_retry("append_message", || {
            self.store.append_message(match_id, sender_id, kind, body)
        })
        .await
        .map_err(map_store_error)
    }

    /// Append a plain text message.
    pub async fn send_text(
        &self,
        match_id: &MatchId,
        sender_id: &str,
        body: &str,
    ) -> Result<Message, EngineError> {
        self.send_message(match_id, sender_id, MessageKind::Text, body)
            .await
    }

    /// Append a date-request message; `date` is a calendar-date string.
    pub async fn send_date_request(
        &self,
        match_id: &MatchId,
        sender_id: &str,
        date: &str,
    ) -> Result<Message, EngineError> {
        self.send_message(match_id, sender_id, MessageKind::DateRequest, date)
            .await
    }

    /// Open a live, cancelable subscription to a match's message log: full
    /// history replay in order, then new messages as they arrive, deduped by
    /// message id across reconnects.
    pub async fn subscribe_chat(
        &self,
        match_id: &MatchId,
        viewer_id: &str,
    ) -> Result<ChatSubscription, EngineError> {
        let record = self.require_match(match_id).await?;
        if !record.contains(viewer_id) {
            return Err(EngineError::not_a_participant(match_id.as_str(), viewer_id));
        }

        Ok(chat::spawn_subscription(
            Arc::clone(&self.store),
            match_id.clone(),
            self.config.retry,
            self.config.chat_event_buffer,
        ))
    }

    /// The viewer's match list, counterpart profiles joined in, most recent
    /// first. A counterpart whose profile cannot be fetched omits that entry
    /// instead of failing the list.
    pub async fn match_list(&self, viewer_id: &str) -> Result<Vec<MatchEntry>, EngineError> {
        let matches = self
            .with_retry("matches_containing", || {
                self.store.matches_containing(viewer_id)
            })
            .await
            .map_err(map_store_error)?;

        let mut profiles: HashMap<String, Profile> = HashMap::new();
        for record in &matches {
            let Some(counterpart) = record.counterpart_of(viewer_id) else {
                continue;
            };
            if profiles.contains_key(counterpart) {
                continue;
            }
            match self.store.get_profile(counterpart).await {
                Ok(Some(profile)) => {
                    profiles.insert(counterpart.to_owned(), profile);
                }
                Ok(None) => {
                    debug!(counterpart, "counterpart profile missing; omitting entry");
                }
                Err(err) => {
                    warn!(counterpart, error = %err, "counterpart profile fetch failed; omitting entry");
                }
            }
        }

        Ok(project_match_list(viewer_id, &matches, &profiles))
    }

    async fn require_match(&self, match_id: &MatchId) -> Result<MatchRecord, EngineError> {
        self.with_retry("get_match", || self.store.get_match(match_id))
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| EngineError::match_not_found(match_id.as_str()))
    }

    /// Run one store call under the configured retry policy. Only transient
    /// unavailability is retried; everything else fails immediately.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let policy = self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    let retryable = matches!(err, StoreError::Unavailable(_));
                    if !retryable || attempt >= policy.max_attempts() {
                        return Err(err);
                    }

                    let delay = policy.delay_for_attempt(attempt - 1, None);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "store operation failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn canonical_users(a: &str, b: &str) -> [String; 2] {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    [lo.to_owned(), hi.to_owned()]
}

fn map_store_error(err: StoreError) -> EngineError {
    match err {
        StoreError::Unavailable(message) => {
            EngineError::new(ErrorCategory::Transient, "store_unavailable", message)
        }
        StoreError::NotFound(path) => EngineError::new(
            ErrorCategory::NotFound,
            "not_found",
            format!("no document at {path}"),
        ),
        StoreError::Malformed { path, reason } => EngineError::new(
            ErrorCategory::Invalid,
            "invalid_document",
            format!("malformed document at {path}: {reason}"),
        ),
    }
}

fn favorite_failed(err: StoreError) -> EngineError {
    let mapped = map_store_error(err);
    EngineError::new(
        mapped.category,
        "favorite_failed",
        format!("favorite write failed: {}", mapped.message),
    )
}

fn unfavorite_failed(err: StoreError) -> EngineError {
    let mapped = map_store_error(err);
    EngineError::new(
        mapped.category,
        "unfavorite_failed",
        format!("favorite removal failed: {}", mapped.message),
    )
}

fn match_create_failed(err: StoreError) -> EngineError {
    let mapped = map_store_error(err);
    EngineError::new(
        mapped.category,
        "match_create_failed",
        format!("match creation failed: {}", mapped.message),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use encore_core::{Profile, RetryPolicy};
    use encore_store::MemoryStore;

    use super::*;

    fn profile(id: &str, role: Role) -> Profile {
        Profile {
            id: id.to_owned(),
            role,
            name: format!("name-{id}"),
            bio: None,
            genre: None,
            venue_type: None,
            profile_image: None,
            header_images: Vec::new(),
            audio_url: None,
        }
    }

    fn engine_over(store: &MemoryStore) -> Engine {
        // Tight retry delays keep failure-path tests fast.
        let config = EngineConfig {
            retry: RetryPolicy::new(1, 10, 3),
            ..EngineConfig::default()
        };
        Engine::with_config(Arc::new(store.clone()), config)
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        for p in [
            profile("artist-1", Role::Performer),
            profile("artist-2", Role::Performer),
            profile("venue-1", Role::Venue),
            profile("venue-2", Role::Venue),
        ] {
            store.seed_profile(&p).expect("seed");
        }
        store
    }

    #[tokio::test]
    async fn deck_excludes_viewer_same_role_and_matched() {
        let store = seeded_store();
        let engine = engine_over(&store);

        engine
            .swipe_right("artist-1", "venue-1")
            .await
            .expect("swipe");
        engine
            .swipe_right("venue-1", "artist-1")
            .await
            .expect("reciprocal swipe");

        let deck = engine
            .swipe_deck("artist-1", Role::Performer)
            .await
            .expect("deck");
        let ids: Vec<&str> = deck.iter().map(|e| e.profile.id.as_str()).collect();
        assert_eq!(ids, vec!["venue-2"]);
    }

    #[tokio::test]
    async fn swipe_without_reciprocity_records_favorite_only() {
        let store = seeded_store();
        let engine = engine_over(&store);

        let outcome = engine
            .swipe_right("artist-1", "venue-1")
            .await
            .expect("swipe");
        assert_eq!(outcome, SwipeOutcome::NotYetMatched);

        assert!(engine
            .is_favorited("artist-1", "venue-1")
            .await
            .expect("read"));
        let id = MatchId::for_pair("artist-1", "venue-1").expect("pair");
        assert_eq!(store.get_match(&id).await.expect("read"), None);
    }

    #[tokio::test]
    async fn favorite_list_joins_profiles_and_omits_missing_targets() {
        let store = seeded_store();
        let engine = engine_over(&store);

        for target in ["venue-2", "venue-1", "ghost-venue"] {
            engine
                .add_favorite("artist-1", target)
                .await
                .expect("favorite");
        }

        let list = engine.favorite_list("artist-1").await.expect("list");
        let ids: Vec<&str> = list.iter().map(|p| p.id.as_str()).collect();
        // Ledger order; the target without a profile document is omitted.
        assert_eq!(ids, vec!["venue-1", "venue-2"]);

        engine
            .remove_favorite("artist-1", "venue-2")
            .await
            .expect("unfavorite");
        let list = engine.favorite_list("artist-1").await.expect("list");
        let ids: Vec<&str> = list.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["venue-1"]);
    }

    #[tokio::test]
    async fn swipe_with_reciprocity_creates_the_match() {
        let store = seeded_store();
        let engine = engine_over(&store);

        engine
            .add_favorite("venue-1", "artist-1")
            .await
            .expect("venue favorites first");

        let outcome = engine
            .swipe_right("artist-1", "venue-1")
            .await
            .expect("swipe");
        let SwipeOutcome::Matched(record) = outcome else {
            panic!("expected a match");
        };

        assert_eq!(record.id.as_str(), "artist-1_venue-1");
        assert_eq!(record.users, ["artist-1".to_owned(), "venue-1".to_owned()]);
        assert!(record.matched_at.is_some());

        let stored = store
            .get_match(&record.id)
            .await
            .expect("read")
            .expect("record exists");
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn concurrent_mutual_swipes_converge_on_one_record() {
        let store = seeded_store();
        let engine_a = engine_over(&store);
        let engine_b = engine_over(&store);

        let (a, b) = tokio::join!(
            engine_a.swipe_right("artist-1", "venue-1"),
            engine_b.swipe_right("venue-1", "artist-1"),
        );
        let a = a.expect("side a");
        let b = b.expect("side b");

        // At least one side must observe the reciprocal favorite; whichever
        // sides matched must agree on the single canonical record.
        let id = MatchId::for_pair("artist-1", "venue-1").expect("pair");
        let stored = store.get_match(&id).await.expect("read");
        let mut matched = Vec::new();
        for outcome in [a, b] {
            if let SwipeOutcome::Matched(record) = outcome {
                matched.push(record);
            }
        }
        assert!(!matched.is_empty(), "no side observed the match");
        for record in &matched {
            assert_eq!(Some(record), stored.as_ref());
        }
    }

    #[tokio::test]
    async fn unfavoriting_never_deletes_a_match() {
        let store = seeded_store();
        let engine = engine_over(&store);

        engine
            .add_favorite("venue-1", "artist-1")
            .await
            .expect("favorite");
        engine
            .swipe_right("artist-1", "venue-1")
            .await
            .expect("swipe");

        engine
            .remove_favorite("artist-1", "venue-1")
            .await
            .expect("unfavorite");

        let id = MatchId::for_pair("artist-1", "venue-1").expect("pair");
        assert!(store.get_match(&id).await.expect("read").is_some());
        assert!(!engine
            .is_favorited("artist-1", "venue-1")
            .await
            .expect("read"));
    }

    #[tokio::test]
    async fn failed_favorite_write_aborts_resolution() {
        let store = seeded_store();
        let engine = engine_over(&store);

        engine
            .add_favorite("venue-1", "artist-1")
            .await
            .expect("favorite");

        // Outlast the retry attempts so the ledger write finally fails.
        store.fail_next_writes(10).expect("arm failures");
        let err = engine
            .swipe_right("artist-1", "venue-1")
            .await
            .expect_err("swipe must fail");
        assert_eq!(err.code, "favorite_failed");
        assert_eq!(err.category, ErrorCategory::Transient);

        // Reciprocity was never evaluated: no match exists.
        let id = MatchId::for_pair("artist-1", "venue-1").expect("pair");
        assert_eq!(store.get_match(&id).await.expect("read"), None);
    }

    #[tokio::test]
    async fn transient_write_failures_are_retried_to_success() {
        let store = seeded_store();
        let engine = engine_over(&store);

        store.fail_next_writes(2).expect("arm failures");
        engine
            .add_favorite("artist-1", "venue-1")
            .await
            .expect("third attempt succeeds");
        assert!(engine
            .is_favorited("artist-1", "venue-1")
            .await
            .expect("read"));
    }

    #[tokio::test]
    async fn self_swipe_is_rejected() {
        let store = seeded_store();
        let engine = engine_over(&store);

        let err = engine
            .swipe_right("artist-1", "artist-1")
            .await
            .expect_err("self swipe must fail");
        assert_eq!(err.code, "self_pair");
    }

    #[tokio::test]
    async fn send_from_non_member_is_rejected_and_appends_nothing() {
        let store = seeded_store();
        let engine = engine_over(&store);

        engine
            .add_favorite("venue-1", "artist-1")
            .await
            .expect("favorite");
        let SwipeOutcome::Matched(record) = engine
            .swipe_right("artist-1", "venue-1")
            .await
            .expect("swipe")
        else {
            panic!("expected a match");
        };

        let err = engine
            .send_text(&record.id, "artist-2", "let me in")
            .await
            .expect_err("non-member must be rejected");
        assert_eq!(err.code, "not_a_participant");
        assert_eq!(err.category, ErrorCategory::Auth);

        let history = store.message_history(&record.id).await.expect("history");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn send_to_unknown_match_reports_match_not_found() {
        let store = seeded_store();
        let engine = engine_over(&store);

        let id = MatchId::for_pair("artist-1", "venue-1").expect("pair");
        let err = engine
            .send_text(&id, "artist-1", "hello?")
            .await
            .expect_err("unknown match must fail");
        assert_eq!(err.code, "match_not_found");
        assert_eq!(err.category, ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn match_list_orders_recent_first_and_omits_missing_profiles() {
        let store = seeded_store();
        let engine = engine_over(&store);

        store
            .put_match_doc(
                "artist-1_venue-1",
                json!({ "users": ["artist-1", "venue-1"], "matchedAt": 1_000 }),
            )
            .expect("raw write");
        store
            .put_match_doc(
                "artist-1_venue-2",
                json!({ "users": ["artist-1", "venue-2"], "matchedAt": 2_000 }),
            )
            .expect("raw write");
        // A third match whose counterpart has no profile document.
        store
            .put_match_doc(
                "artist-1_ghost",
                json!({ "users": ["artist-1", "ghost"], "matchedAt": 3_000 }),
            )
            .expect("raw write");

        let list = engine.match_list("artist-1").await.expect("list");
        let ids: Vec<&str> = list.iter().map(|e| e.counterpart.id.as_str()).collect();
        // venue-2 matched later than venue-1; ghost is omitted.
        assert_eq!(ids, vec!["venue-2", "venue-1"]);
        assert_eq!(list[0].matched_at, Some(2_000));
    }

    #[tokio::test]
    async fn match_without_timestamp_sorts_last_in_list() {
        let store = seeded_store();
        let engine = engine_over(&store);

        engine
            .add_favorite("venue-1", "artist-1")
            .await
            .expect("favorite");
        engine
            .swipe_right("artist-1", "venue-1")
            .await
            .expect("swipe");
        store
            .put_match_doc(
                "artist-1_venue-2",
                json!({ "users": ["artist-1", "venue-2"] }),
            )
            .expect("raw write");

        let list = engine.match_list("artist-1").await.expect("list");
        let ids: Vec<&str> = list.iter().map(|e| e.counterpart.id.as_str()).collect();
        assert_eq!(ids, vec!["venue-1", "venue-2"]);
        assert_eq!(list[1].matched_at, None);
    }
}
