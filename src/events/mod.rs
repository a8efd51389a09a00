//! # Event System
//!
//! Workers never touch UI code directly: they push [`ProcessingEvent`] values
//! onto a channel, and a single [`EventDispatcher`] loop drains the channel
//! and fans each event out to registered subscribers. A host GUI subscribes
//! once and forwards events onto its own thread-safe queue; the core stays
//! toolkit-agnostic.
//!
//! Events are always emitted *after* internal queue locks are released, so a
//! subscriber is free to call back into queue APIs without deadlocking.

use crate::queue::states::BatchStatus;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Progress and lifecycle notifications emitted by the processing queue
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessingEvent {
    TaskStarted {
        task_id: Uuid,
        recording_id: i64,
    },
    TaskCompleted {
        task_id: Uuid,
        recording_id: i64,
        batch_id: Option<Uuid>,
    },
    TaskFailed {
        task_id: Uuid,
        recording_id: i64,
        batch_id: Option<Uuid>,
        /// User-facing `[Error: <title>] <message>` string
        error: String,
    },
    TaskCancelled {
        task_id: Uuid,
        batch_id: Option<Uuid>,
    },
    BatchProgress {
        batch_id: Uuid,
        total: usize,
        completed: usize,
        failed: usize,
        pending: usize,
    },
    BatchCompleted {
        batch_id: Uuid,
        status: BatchStatus,
        completed: usize,
        failed: usize,
    },
}

impl ProcessingEvent {
    /// One-line human summary, used for batch completion notifications.
    pub fn summary(&self) -> String {
        match self {
            Self::TaskStarted { task_id, .. } => format!("Task {task_id} started"),
            Self::TaskCompleted { task_id, .. } => format!("Task {task_id} completed"),
            Self::TaskFailed { task_id, error, .. } => format!("Task {task_id} failed: {error}"),
            Self::TaskCancelled { task_id, .. } => format!("Task {task_id} cancelled"),
            Self::BatchProgress {
                completed,
                failed,
                total,
                ..
            } => format!("Batch progress: {}/{total} done, {failed} failed", completed + failed),
            Self::BatchCompleted {
                completed, failed, ..
            } => format!("{completed} successful, {failed} failed"),
        }
    }
}

/// Sending half handed to the queue and workers
pub type EventSender = mpsc::UnboundedSender<ProcessingEvent>;

/// Subscriber callback invoked for every event
pub type EventSubscriber = Box<dyn Fn(&ProcessingEvent) + Send + Sync>;

/// Single-consumer dispatch loop fanning events out to subscribers
pub struct EventDispatcher {
    receiver: mpsc::UnboundedReceiver<ProcessingEvent>,
    subscribers: Vec<EventSubscriber>,
}

impl EventDispatcher {
    /// Create a dispatcher and the sender side of its channel
    pub fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                receiver: rx,
                subscribers: Vec::new(),
            },
        )
    }

    /// Register a subscriber. Must be called before [`run`](Self::run).
    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: Fn(&ProcessingEvent) + Send + Sync + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Drain the channel until every sender is dropped.
    ///
    /// A panicking subscriber is logged and skipped; it never takes the
    /// dispatch loop down with it.
    pub async fn run(mut self) {
        info!(
            subscribers = self.subscribers.len(),
            "Event dispatcher started"
        );

        while let Some(event) = self.receiver.recv().await {
            debug!(event = ?event, "Dispatching event");

            for subscriber in &self.subscribers {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    subscriber(&event);
                }));
                if outcome.is_err() {
                    error!(event = ?event, "Event subscriber panicked");
                }
            }
        }

        info!("Event dispatcher stopped (all senders closed)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_events_reach_all_subscribers() {
        let (tx, mut dispatcher) = EventDispatcher::channel();

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let first_clone = Arc::clone(&first);
        dispatcher.subscribe(move |_| {
            first_clone.fetch_add(1, Ordering::SeqCst);
        });
        let second_clone = Arc::clone(&second);
        dispatcher.subscribe(move |_| {
            second_clone.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(ProcessingEvent::TaskStarted {
            task_id: Uuid::new_v4(),
            recording_id: 1,
        })
        .unwrap();
        tx.send(ProcessingEvent::TaskCompleted {
            task_id: Uuid::new_v4(),
            recording_id: 1,
            batch_id: None,
        })
        .unwrap();
        drop(tx);

        dispatcher.run().await;

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_does_not_stop_dispatch() {
        let (tx, mut dispatcher) = EventDispatcher::channel();

        let delivered = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe(|_| panic!("subscriber bug"));
        let delivered_clone = Arc::clone(&delivered);
        dispatcher.subscribe(move |_| {
            delivered_clone.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(ProcessingEvent::TaskCancelled {
            task_id: Uuid::new_v4(),
            batch_id: None,
        })
        .unwrap();
        drop(tx);

        dispatcher.run().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_batch_summary_format() {
        let event = ProcessingEvent::BatchCompleted {
            batch_id: Uuid::new_v4(),
            status: BatchStatus::CompletedWithErrors,
            completed: 4,
            failed: 2,
        };
        assert_eq!(event.summary(), "4 successful, 2 failed");
    }
}
