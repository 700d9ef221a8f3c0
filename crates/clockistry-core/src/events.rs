//! Live feed of timer changes

use clockistry_api::{EventPayload, TimeEntry};
use clockistry_util::{EntryId, UserId};
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_FEED_CAPACITY: usize = 256;

/// Events emitted by the timer lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    /// A new running entry was created
    Started(TimeEntry),

    /// Editable fields of an entry changed
    Updated { entry_id: EntryId, user_id: UserId },

    /// An entry was stopped; carries the final record
    Stopped(TimeEntry),
}

impl TimerEvent {
    pub fn user_id(&self) -> &UserId {
        match self {
            TimerEvent::Started(entry) | TimerEvent::Stopped(entry) => &entry.user_id,
            TimerEvent::Updated { user_id, .. } => user_id,
        }
    }

    pub fn into_payload(self) -> EventPayload {
        match self {
            TimerEvent::Started(entry) => EventPayload::TimerStarted { entry },
            TimerEvent::Updated { entry_id, user_id } => {
                EventPayload::TimerUpdated { entry_id, user_id }
            }
            TimerEvent::Stopped(entry) => EventPayload::TimerStopped { entry },
        }
    }
}

/// Fan-out of [`TimerEvent`]s to any number of subscribers.
///
/// Publishing never blocks; a subscriber that falls behind skips the oldest
/// events.
#[derive(Debug, Clone)]
pub struct TimerFeed {
    tx: broadcast::Sender<TimerEvent>,
}

impl TimerFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: TimerEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events, or only those for `user_id`
    pub fn subscribe(&self, user_id: Option<UserId>) -> TimerSubscription {
        TimerSubscription {
            rx: self.tx.subscribe(),
            user_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for TimerFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

/// One subscriber's view of a [`TimerFeed`]
#[derive(Debug)]
pub struct TimerSubscription {
    rx: broadcast::Receiver<TimerEvent>,
    user_id: Option<UserId>,
}

impl TimerSubscription {
    /// Next matching event, `None` once the feed is gone
    pub async fn recv(&mut self) -> Option<TimerEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Timer feed subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already queued
    pub fn try_recv(&mut self) -> Option<TimerEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Timer feed subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    fn wants(&self, event: &TimerEvent) -> bool {
        self.user_id
            .as_ref()
            .is_none_or(|user_id| event.user_id() == user_id)
    }
}
