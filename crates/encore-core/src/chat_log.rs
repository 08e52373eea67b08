use std::collections::HashSet;

use crate::types::Message;

/// In-memory view of one match's message log.
///
/// Keeps messages totally ordered by their store-assigned
/// `(timestamp_ms, seq)` key and drops duplicate deliveries by message id, so
/// replay-after-reconnect never duplicates or reorders the visible list.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<Message>,
    seen: HashSet<String>,
}

impl ChatLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current messages in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of distinct messages held.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Insert one message, keeping order. Returns `false` when the message id
    /// was already delivered and the log is unchanged.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }

        let key = message.order_key();
        let pos = self.messages.partition_point(|m| m.order_key() <= key);
        self.messages.insert(pos, message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;

    fn message(id: &str, timestamp_ms: u64, seq: u64, body: &str) -> Message {
        Message {
            id: id.to_owned(),
            sender_id: "alice".to_owned(),
            timestamp_ms,
            seq,
            kind: MessageKind::Text,
            body: body.to_owned(),
        }
    }

    #[test]
    fn orders_by_timestamp_then_seq() {
        let mut log = ChatLog::new();
        assert!(log.insert(message("m3", 30, 2, "late")));
        assert!(log.insert(message("m1", 10, 0, "first")));
        assert!(log.insert(message("m2", 30, 1, "tied-earlier")));

        let bodies: Vec<&str> = log.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "tied-earlier", "late"]);
    }

    #[test]
    fn ignores_duplicate_message_ids() {
        let mut log = ChatLog::new();
        assert!(log.insert(message("m1", 10, 0, "hi")));
        assert!(!log.insert(message("m1", 10, 0, "hi")));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn replaying_history_after_live_delivery_changes_nothing() {
        let history = vec![
            message("m1", 10, 0, "hi"),
            message("m2", 20, 1, "2024-05-01"),
            message("m3", 30, 2, "ok"),
        ];

        let mut log = ChatLog::new();
        for m in &history {
            log.insert(m.clone());
        }
        let before = log.messages().to_vec();

        // Reconnect replays the same history.
        for m in &history {
            assert!(!log.insert(m.clone()));
        }
        assert_eq!(log.messages(), before.as_slice());
    }
}
