//! Live chat subscription task.
//!
//! A subscription replays a match's full history in order, then forwards new
//! messages as they arrive. Both paths funnel through the core [`ChatLog`] so
//! a reconnect's replay can never duplicate or reorder the visible list. On
//! feed loss the task emits a degraded signal and resubscribes with backoff
//! instead of silently going quiet.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use encore_core::{ChatLog, MatchId, Message, RetryPolicy};
use encore_store::MatchStore;

/// Events delivered to a chat subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// One message, delivered exactly once per id, in log order.
    Message(Message),
    /// The live feed dropped; history will be replayed after the delay.
    /// Delivery continues, but the visible list may briefly lag.
    Degraded {
        /// Backoff before the next resubscription attempt.
        retry_in_ms: u64,
    },
}

/// Handle to one match's live subscription.
///
/// Dropping the handle cancels the task; in-flight store operations complete
/// on their own and their results go nowhere. Subscriptions are independent:
/// closing one match's feed does not affect another's.
#[derive(Debug)]
pub struct ChatSubscription {
    events: mpsc::Receiver<ChatStreamEvent>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ChatSubscription {
    /// Receive the next event; `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<ChatStreamEvent> {
        self.events.recv().await
    }

    /// Cancel the subscription and wait for its task to finish.
    pub async fn close(mut self) {
        self.stop.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for ChatSubscription {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

pub(crate) fn spawn_subscription(
    store: Arc<dyn MatchStore>,
    match_id: MatchId,
    retry: RetryPolicy,
    event_buffer: usize,
) -> ChatSubscription {
    let (tx, events) = mpsc::channel(event_buffer.max(1));
    let stop = CancellationToken::new();
    let stop_child = stop.child_token();

    let task = tokio::spawn(async move {
        run_stream(store, match_id, tx, stop_child, retry).await;
    });

    ChatSubscription { events, stop, task }
}

async fn run_stream(
    store: Arc<dyn MatchStore>,
    match_id: MatchId,
    tx: mpsc::Sender<ChatStreamEvent>,
    stop: CancellationToken,
    retry: RetryPolicy,
) {
    let mut log = ChatLog::new();
    let mut attempt: u32 = 0;

    loop {
        // Subscribe before reading history so no append can fall into the
        // gap; the overlap is absorbed by the log's dedup.
        let connect = async {
            let feed = store.watch_messages(&match_id).await?;
            let history = store.message_history(&match_id).await?;
            Ok::<_, encore_store::StoreError>((feed, history))
        };
        let connected = tokio::select! {
            _ = stop.cancelled() => return,
            result = connect => result,
        };

        let (mut feed, history) = match connected {
            Ok(connected) => connected,
            Err(err) => {
                warn!(match_id = %match_id, error = %err, "chat feed connect failed");
                if !degrade_and_wait(&tx, &stop, retry, &mut attempt).await {
                    return;
                }
                continue;
            }
        };
        attempt = 0;

        for message in history {
            if !deliver(&tx, &mut log, message).await {
                return;
            }
        }

        loop {
            let received = tokio::select! {
                _ = stop.cancelled() => return,
                received = feed.recv() => received,
            };

            match received {
                Ok(message) => {
                    if !deliver(&tx, &mut log, message).await {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(match_id = %match_id, skipped, "chat feed lagged; resubscribing");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!(match_id = %match_id, "chat feed closed; resubscribing");
                    break;
                }
            }
        }

        if !degrade_and_wait(&tx, &stop, retry, &mut attempt).await {
            return;
        }
    }
}

/// Forward one message unless it was already delivered. Returns `false` when
/// the subscriber is gone.
async fn deliver(
    tx: &mpsc::Sender<ChatStreamEvent>,
    log: &mut ChatLog,
    message: Message,
) -> bool {
    if !log.insert(message.clone()) {
        return true;
    }
    tx.send(ChatStreamEvent::Message(message)).await.is_ok()
}

/// Surface a degraded signal and back off before the next reconnect.
/// Returns `false` when the subscription should end instead.
async fn degrade_and_wait(
    tx: &mpsc::Sender<ChatStreamEvent>,
    stop: &CancellationToken,
    retry: RetryPolicy,
    attempt: &mut u32,
) -> bool {
    let delay = retry.delay_for_attempt(*attempt, None);
    *attempt = attempt.saturating_add(1);

    if tx
        .send(ChatStreamEvent::Degraded {
            retry_in_ms: delay.as_millis() as u64,
        })
        .await
        .is_err()
    {
        return false;
    }

    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
