//! Typed observers for the tracker's change feeds, plus a broadcast-channel
//! publisher that async protocol layers can subscribe to.

use crate::constants::TaskStatus;
use crate::state_machine::{MachineSymbol, StateObserver};
use crate::types::CommandResult;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Receives the tracker's change feeds.
///
/// Called while the tracker lock is held, so a given command's updates arrive
/// in the order they were applied. Implementations may read the tracker.
pub trait TrackerObserver: Send + Sync {
    /// `(id, name)` of every tracked command, oldest first
    fn on_queue_changed(&self, _commands: &[(String, String)]) {}

    /// `(id, status)` of the most recently active commands, most recent last
    fn on_status_changed(&self, _statuses: &[(String, TaskStatus)]) {}

    /// `(id, progress)` of the most recently active commands that report progress
    fn on_progress_changed(&self, _progresses: &[(String, u8)]) {}

    fn on_result(&self, _command_id: &str, _result: &CommandResult) {}

    fn on_exception(&self, _command_id: &str, _exception: &str) {}
}

/// One published feed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "feed", rename_all = "snake_case")]
pub enum FeedEvent {
    CommandsInQueue {
        commands: Vec<(String, String)>,
    },
    CommandStatus {
        statuses: Vec<(String, TaskStatus)>,
    },
    CommandProgress {
        progresses: Vec<(String, u8)>,
    },
    CommandResult {
        command_id: String,
        result: CommandResult,
    },
    CommandException {
        command_id: String,
        exception: String,
    },
    StateChanged {
        model: String,
        value: String,
    },
}

/// Feed event that has been published
#[derive(Debug, Clone, Serialize)]
pub struct PublishedFeed {
    pub event: FeedEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Broadcasts tracker and state feeds on a `tokio::sync::broadcast` channel
#[derive(Debug, Clone)]
pub struct FeedPublisher {
    sender: broadcast::Sender<PublishedFeed>,
}

impl FeedPublisher {
    /// Create a new publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: FeedEvent) {
        let feed = PublishedFeed {
            event,
            published_at: chrono::Utc::now(),
        };
        // No subscribers is fine; feeds are fire-and-forget
        let _ = self.sender.send(feed);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedFeed> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// State-model observer publishing `StateChanged` for `model`
    pub fn state_observer<P: MachineSymbol>(
        &self,
        model: &'static str,
    ) -> Arc<dyn StateObserver<P>> {
        let publisher = self.clone();
        Arc::new(move |value: P| {
            publisher.publish(FeedEvent::StateChanged {
                model: model.to_string(),
                value: value.to_string(),
            })
        })
    }
}

impl Default for FeedPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl TrackerObserver for FeedPublisher {
    fn on_queue_changed(&self, commands: &[(String, String)]) {
        self.publish(FeedEvent::CommandsInQueue {
            commands: commands.to_vec(),
        });
    }

    fn on_status_changed(&self, statuses: &[(String, TaskStatus)]) {
        self.publish(FeedEvent::CommandStatus {
            statuses: statuses.to_vec(),
        });
    }

    fn on_progress_changed(&self, progresses: &[(String, u8)]) {
        self.publish(FeedEvent::CommandProgress {
            progresses: progresses.to_vec(),
        });
    }

    fn on_result(&self, command_id: &str, result: &CommandResult) {
        self.publish(FeedEvent::CommandResult {
            command_id: command_id.to_string(),
            result: result.clone(),
        });
    }

    fn on_exception(&self, command_id: &str, exception: &str) {
        self.publish(FeedEvent::CommandException {
            command_id: command_id.to_string(),
            exception: exception.to_string(),
        });
    }
}
