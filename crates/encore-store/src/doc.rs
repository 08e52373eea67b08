//! Boundary validation for loosely-typed store documents.
//!
//! The external document store has no schema enforcement of its own; this
//! module is where its raw JSON becomes the typed core records. Display-only
//! fields default when missing, identity-bearing fields reject the document.

use std::collections::BTreeSet;

use serde_json::{Map, Value, json};

use encore_core::{MatchId, MatchRecord, Message, MessageKind, Profile, Role};

use crate::StoreError;

fn malformed(path: impl Into<String>, reason: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        path: path.into(),
        reason: reason.into(),
    }
}

fn opt_str(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Decode a `users/{id}` document.
///
/// A missing or invalid `role` rejects the document; display fields default.
pub fn decode_profile(id: &str, value: &Value) -> Result<Profile, StoreError> {
    let path = format!("users/{id}");

    let role = match value.get("role").and_then(Value::as_str) {
        Some("performer") => Role::Performer,
        Some("venue") => Role::Venue,
        Some(other) => return Err(malformed(path, format!("unknown role '{other}'"))),
        None => return Err(malformed(path, "missing role")),
    };

    let header_images = value
        .get("headerImages")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Ok(Profile {
        id: id.to_owned(),
        role,
        name: opt_str(value, "name").unwrap_or_else(|| "Unknown".to_owned()),
        bio: opt_str(value, "bio"),
        genre: opt_str(value, "genre"),
        venue_type: opt_str(value, "venueType"),
        profile_image: opt_str(value, "profileImage"),
        header_images,
        audio_url: opt_str(value, "audioUrl"),
    })
}

/// Encode a profile back into its `users/{id}` document shape.
pub fn profile_value(profile: &Profile) -> Value {
    json!({
        "role": match profile.role {
            Role::Performer => "performer",
            Role::Venue => "venue",
        },
        "name": profile.name,
        "bio": profile.bio,
        "genre": profile.genre,
        "venueType": profile.venue_type,
        "profileImage": profile.profile_image,
        "headerImages": profile.header_images,
        "audioUrl": profile.audio_url,
    })
}

/// Decode a `favorites/{ownerId}` document into the set of liked ids.
///
/// Only fields holding literal `true` count: merge-style deletions leave
/// `null` behind, and anything else is treated as "not favorited".
pub fn decode_favorites(owner: &str, value: &Value) -> Result<BTreeSet<String>, StoreError> {
    let fields = value
        .as_object()
        .ok_or_else(|| malformed(format!("favorites/{owner}"), "expected an object"))?;

    Ok(fields
        .iter()
        .filter(|(_, liked)| liked.as_bool() == Some(true))
        .map(|(target, _)| target.clone())
        .collect())
}

/// Decode a `matches/{id}` document.
///
/// The member array must hold exactly two distinct ids reproducing the
/// canonical document key; a missing or non-numeric `matchedAt` decays to
/// `None` (the record still surfaces, sorted last).
pub fn decode_match(key: &str, value: &Value) -> Result<MatchRecord, StoreError> {
    let path = format!("matches/{key}");

    let users: Vec<String> = value
        .get("users")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .ok_or_else(|| malformed(path.clone(), "missing users array"))?;

    let [a, b]: [String; 2] = users
        .try_into()
        .map_err(|_| malformed(path.clone(), "expected exactly two members"))?;

    let id = MatchId::for_pair(&a, &b)
        .map_err(|err| malformed(path.clone(), err.message))?;
    if id.as_str() != key {
        return Err(malformed(
            path,
            format!("members do not reproduce document key (computed '{id}')"),
        ));
    }

    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    Ok(MatchRecord {
        id,
        users: [lo, hi],
        matched_at: value.get("matchedAt").and_then(Value::as_u64),
    })
}

/// Encode a match record into its `matches/{id}` document shape.
pub fn match_value(users: &[String; 2], matched_at: Option<u64>) -> Value {
    let mut fields = Map::new();
    fields.insert("users".to_owned(), json!(users));
    if let Some(ts) = matched_at {
        fields.insert("matchedAt".to_owned(), json!(ts));
    }
    Value::Object(fields)
}

/// Decode a `matches/{matchId}/messages/{messageId}` document.
///
/// An unknown or missing `kind` decays to `Text` rather than dropping the
/// message; a missing sender rejects it.
pub fn decode_message(match_id: &str, id: &str, value: &Value) -> Result<Message, StoreError> {
    let path = format!("matches/{match_id}/messages/{id}");

    let sender_id =
        opt_str(value, "senderId").ok_or_else(|| malformed(path.clone(), "missing senderId"))?;
    let timestamp_ms = value
        .get("timestamp")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed(path, "missing timestamp"))?;

    let kind = match value.get("kind").and_then(Value::as_str) {
        Some("date_request") => MessageKind::DateRequest,
        _ => MessageKind::Text,
    };

    Ok(Message {
        id: id.to_owned(),
        sender_id,
        timestamp_ms,
        seq: value.get("seq").and_then(Value::as_u64).unwrap_or(0),
        kind,
        body: opt_str(value, "text").unwrap_or_default(),
    })
}

/// Encode a message into its document shape.
pub fn message_value(message: &Message) -> Value {
    json!({
        "senderId": message.sender_id,
        "timestamp": message.timestamp_ms,
        "seq": message.seq,
        "kind": match message.kind {
            MessageKind::Text => "text",
            MessageKind::DateRequest => "date_request",
        },
        "text": message.body,
    })
}
