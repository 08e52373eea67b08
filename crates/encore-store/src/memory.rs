//! In-memory document store.
//!
//! Documents are held as raw JSON in the exact external-store schema and are
//! decoded through [`crate::doc`] on every read, so boundary validation is
//! exercised the same way it would be against the real store. Used by engine
//! tests and the smoke app.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use encore_core::{MatchId, MatchRecord, Message, MessageKind, Profile};

use crate::{MatchStore, StoreError, doc};

const FEED_BUFFER: usize = 256;

/// Shared in-memory store. Cloning yields handles to the same documents,
/// which is how two "clients" of a pair share state in tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<String, Value>,
    favorites: BTreeMap<String, Value>,
    matches: BTreeMap<String, Value>,
    messages: BTreeMap<String, Vec<(String, Value)>>,
    feeds: HashMap<String, broadcast::Sender<Message>>,
    last_ms: u64,
    seq: u64,
    fail_writes: u32,
    fail_reads: u32,
}

impl Inner {
    /// Server clock: wall millis clamped monotone, plus a global sequence
    /// number so appends within one millisecond stay totally ordered.
    fn tick(&mut self) -> (u64, u64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_ms = self.last_ms.max(now);
        self.seq += 1;
        (self.last_ms, self.seq)
    }

    fn take_write_failure(&mut self) -> Result<(), StoreError> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".to_owned()));
        }
        Ok(())
    }

    fn take_read_failure(&mut self) -> Result<(), StoreError> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(StoreError::Unavailable("injected read failure".to_owned()));
        }
        Ok(())
    }

    fn feed(&mut self, key: &str) -> broadcast::Sender<Message> {
        self.feeds
            .entry(key.to_owned())
            .or_insert_with(|| broadcast::channel(FEED_BUFFER).0)
            .clone()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned store lock".to_owned()))
    }

    /// Seed one profile document.
    pub fn seed_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .users
            .insert(profile.id.clone(), doc::profile_value(profile));
        Ok(())
    }

    /// Write a raw `users/{id}` document, bypassing encoding. Lets tests
    /// exercise boundary validation against malformed documents.
    pub fn put_user_doc(&self, id: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.users.insert(id.to_owned(), value);
        Ok(())
    }

    /// Write a raw `matches/{id}` document, bypassing encoding.
    pub fn put_match_doc(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.matches.insert(key.to_owned(), value);
        Ok(())
    }

    /// Make the next `count` writes fail with `StoreError::Unavailable`.
    /// Test hook for transient-failure paths.
    pub fn fail_next_writes(&self, count: u32) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.fail_writes = count;
        Ok(())
    }

    /// Make the next `count` history or feed reads fail with
    /// `StoreError::Unavailable`. Test hook for degraded-stream paths.
    pub fn fail_next_reads(&self, count: u32) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.fail_reads = count;
        Ok(())
    }

    /// Drop a match's live feed sender, closing every subscribed receiver.
    /// Test hook for mid-stream feed-loss recovery.
    pub fn drop_feed(&self, match_id: &MatchId) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.feeds.remove(match_id.as_str());
        Ok(())
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let inner = self.lock()?;
        inner
            .users
            .get(id)
            .map(|value| doc::decode_profile(id, value))
            .transpose()
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .users
            .iter()
            .filter_map(|(id, value)| doc::decode_profile(id, value).ok())
            .collect())
    }

    async fn set_favorite(&self, owner: &str, target: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.take_write_failure()?;

        let fields = inner
            .favorites
            .entry(owner.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = fields {
            map.insert(target.to_owned(), Value::Bool(true));
            Ok(())
        } else {
            Err(StoreError::Malformed {
                path: format!("favorites/{owner}"),
                reason: "expected an object".to_owned(),
            })
        }
    }

    async fn clear_favorite(&self, owner: &str, target: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.take_write_failure()?;

        // Merge-style deletion leaves a null field behind, the way the
        // external store's `update({target: null})` does.
        if let Some(Value::Object(map)) = inner.favorites.get_mut(owner) {
            map.insert(target.to_owned(), Value::Null);
        }
        Ok(())
    }

    async fn favorites_of(&self, owner: &str) -> Result<BTreeSet<String>, StoreError> {
        let inner = self.lock()?;
        match inner.favorites.get(owner) {
            Some(value) => doc::decode_favorites(owner, value),
            None => Ok(BTreeSet::new()),
        }
    }

    async fn create_match_if_absent(
        &self,
        id: &MatchId,
        users: [String; 2],
    ) -> Result<MatchRecord, StoreError> {
        let mut inner = self.lock()?;
        inner.take_write_failure()?;

        if let Some(existing) = inner.matches.get(id.as_str()) {
            return doc::decode_match(id.as_str(), existing);
        }

        let (matched_at, _) = inner.tick();
        inner.matches.insert(
            id.as_str().to_owned(),
            doc::match_value(&users, Some(matched_at)),
        );

        Ok(MatchRecord {
            id: id.clone(),
            users,
            matched_at: Some(matched_at),
        })
    }

    async fn get_match(&self, id: &MatchId) -> Result<Option<MatchRecord>, StoreError> {
        let inner = self.lock()?;
        inner
            .matches
            .get(id.as_str())
            .map(|value| doc::decode_match(id.as_str(), value))
            .transpose()
    }

    async fn matches_containing(&self, user_id: &str) -> Result<Vec<MatchRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .matches
            .iter()
            .filter_map(|(key, value)| doc::decode_match(key, value).ok())
            .filter(|record| record.contains(user_id))
            .collect())
    }

    async fn append_message(
        &self,
        match_id: &MatchId,
        sender_id: &str,
        kind: MessageKind,
        body: &str,
    ) -> Result<Message, StoreError> {
        let mut inner = self.lock()?;
        inner.take_write_failure()?;

        if !inner.matches.contains_key(match_id.as_str()) {
            return Err(StoreError::NotFound(format!("matches/{match_id}")));
        }

        let (timestamp_ms, seq) = inner.tick();
        let message = Message {
            id: Uuid::now_v7().to_string(),
            sender_id: sender_id.to_owned(),
            timestamp_ms,
            seq,
            kind,
            body: body.to_owned(),
        };

        inner
            .messages
            .entry(match_id.as_str().to_owned())
            .or_default()
            .push((message.id.clone(), doc::message_value(&message)));

        let feed = inner.feed(match_id.as_str());
        let _ = feed.send(message.clone());

        Ok(message)
    }

    async fn message_history(&self, match_id: &MatchId) -> Result<Vec<Message>, StoreError> {
        let mut inner = self.lock()?;
        inner.take_read_failure()?;

        if !inner.matches.contains_key(match_id.as_str()) {
            return Err(StoreError::NotFound(format!("matches/{match_id}")));
        }

        let mut history: Vec<Message> = inner
            .messages
            .get(match_id.as_str())
            .map(|docs| {
                docs.iter()
                    .filter_map(|(id, value)| {
                        doc::decode_message(match_id.as_str(), id, value).ok()
                    })
                    .collect()
            })
            .unwrap_or_default();

        history.sort_by_key(Message::order_key);
        Ok(history)
    }

    async fn watch_messages(
        &self,
        match_id: &MatchId,
    ) -> Result<broadcast::Receiver<Message>, StoreError> {
        let mut inner = self.lock()?;
        inner.take_read_failure()?;

        if !inner.matches.contains_key(match_id.as_str()) {
            return Err(StoreError::NotFound(format!("matches/{match_id}")));
        }
        Ok(inner.feed(match_id.as_str()).subscribe())
    }
}
