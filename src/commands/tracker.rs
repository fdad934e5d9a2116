//! # Command Tracker
//!
//! Registry of in-flight and recently finished commands.
//!
//! Every mutation and every read happens under one reentrant lock per
//! tracker. Observers run while that lock is still held (with the registry
//! borrow released), so they may read the tracker, or update another command,
//! from the same thread. Completion callbacks run after the lock is released:
//! they drive state models, whose observers may in turn read the tracker from
//! another thread. Terminal commands stay queryable for the configured grace
//! period and are then evicted by the removal thread under the same lock.

use super::observer::TrackerObserver;
use super::removal::RemovalScheduler;
use crate::config::TrackerConfig;
use crate::constants::TaskStatus;
use crate::execution::{TaskCallback, TaskUpdate};
use crate::logging::log_command_operation;
use crate::types::CommandResult;
use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// Called once when a command reaches `COMPLETED`, after the tracker lock is
/// released
pub type CompletedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Snapshot of one tracked command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub progress: Option<u8>,
    pub created_at: DateTime<Utc>,
}

struct TrackedCommand {
    record: CommandRecord,
    completed_callback: Option<CompletedCallback>,
}

#[derive(Default)]
struct TrackerState {
    commands: HashMap<String, TrackedCommand>,
    /// Creation order
    order: VecDeque<String>,
    /// Feed order, most recently active last, at most `status_feed_size` long
    recent: VecDeque<String>,
    result: Option<(String, CommandResult)>,
    exception: Option<(String, String)>,
}

impl TrackerState {
    fn commands_in_queue(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|id| self.commands.get(id))
            .map(|command| (command.record.id.clone(), command.record.name.clone()))
            .collect()
    }

    fn command_statuses(&self) -> Vec<(String, TaskStatus)> {
        self.order
            .iter()
            .filter_map(|id| self.commands.get(id))
            .map(|command| (command.record.id.clone(), command.record.status))
            .collect()
    }

    fn command_progresses(&self) -> Vec<(String, u8)> {
        self.order
            .iter()
            .filter_map(|id| self.commands.get(id))
            .filter_map(|command| {
                command
                    .record
                    .progress
                    .map(|progress| (command.record.id.clone(), progress))
            })
            .collect()
    }

    fn status_feed(&self) -> Vec<(String, TaskStatus)> {
        self.recent
            .iter()
            .filter_map(|id| self.commands.get(id))
            .map(|command| (command.record.id.clone(), command.record.status))
            .collect()
    }

    fn progress_feed(&self) -> Vec<(String, u8)> {
        self.recent
            .iter()
            .filter_map(|id| self.commands.get(id))
            .filter_map(|command| {
                command
                    .record
                    .progress
                    .map(|progress| (command.record.id.clone(), progress))
            })
            .collect()
    }

    /// Move `id` to the most-recent end of the feed, dropping the oldest entries
    /// beyond `limit`
    fn touch(&mut self, id: &str, limit: usize) {
        if let Some(position) = self.recent.iter().position(|entry| entry == id) {
            self.recent.remove(position);
        }
        self.recent.push_back(id.to_string());
        while self.recent.len() > limit {
            if let Some(dropped) = self.recent.pop_front() {
                warn!(
                    command_id = %dropped,
                    limit,
                    "Command dropped from status feed; still tracked"
                );
            }
        }
    }
}

/// Feed values to deliver after a mutation, in delivery order. `completed`
/// runs last, outside the lock.
#[derive(Default)]
struct Notifications {
    exception: Option<(String, String)>,
    result: Option<(String, CommandResult)>,
    statuses: Option<Vec<(String, TaskStatus)>>,
    progresses: Option<Vec<(String, u8)>>,
    queue: Option<Vec<(String, String)>>,
    completed: Option<CompletedCallback>,
}

struct TrackerCore {
    state: ReentrantMutex<RefCell<TrackerState>>,
    observers: Vec<Arc<dyn TrackerObserver>>,
    status_feed_size: usize,
    removal: RemovalScheduler,
}

impl TrackerCore {
    fn with_state<R>(&self, f: impl FnOnce(&TrackerState) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    /// Apply `mutate` and deliver its feeds under the lock, then run any
    /// completion callback with the lock released
    fn mutate<R>(&self, mutate: impl FnOnce(&mut TrackerState) -> (R, Notifications)) -> R {
        let guard = self.state.lock();
        let (value, mut notifications) = {
            let mut state = guard.borrow_mut();
            mutate(&mut state)
        };
        let completed = notifications.completed.take();
        self.deliver(notifications);
        drop(guard);

        if let Some(completed) = completed {
            completed();
        }
        value
    }

    fn deliver(&self, notifications: Notifications) {
        let Notifications {
            exception,
            result,
            statuses,
            progresses,
            queue,
            ..
        } = notifications;

        for observer in &self.observers {
            if let Some((id, exception)) = &exception {
                observer.on_exception(id, exception);
            }
            if let Some((id, result)) = &result {
                observer.on_result(id, result);
            }
            if let Some(statuses) = &statuses {
                observer.on_status_changed(statuses);
            }
            if let Some(progresses) = &progresses {
                observer.on_progress_changed(progresses);
            }
            if let Some(queue) = &queue {
                observer.on_queue_changed(queue);
            }
        }
    }

    fn update(&self, command_id: &str, update: TaskUpdate) {
        let TaskUpdate {
            status,
            progress,
            result,
            exception,
        } = update;
        let limit = self.status_feed_size;

        let outcome = self.mutate(|state| {
            let mut notifications = Notifications::default();
            let Some(command) = state.commands.get_mut(command_id) else {
                warn!(command_id, "Update for unknown command ignored");
                return (None, notifications);
            };

            let mut status_changed = false;
            let mut progress_changed = false;
            let mut became_terminal = false;

            if let Some(status) = status {
                let current = command.record.status;
                if status != current {
                    if current.is_terminal()
                        || status == TaskStatus::NotFound
                        || status.lifecycle_rank() < current.lifecycle_rank()
                    {
                        warn!(
                            command_id,
                            from = %current,
                            to = %status,
                            "Ignoring out-of-order command status"
                        );
                    } else {
                        command.record.status = status;
                        status_changed = true;
                        if status.is_terminal() {
                            became_terminal = true;
                            progress_changed = command.record.progress.take().is_some();
                            if status == TaskStatus::Completed {
                                notifications.completed = command.completed_callback.take();
                            }
                        }
                    }
                }
            }

            if let Some(progress) = progress {
                let progress = progress.min(100);
                if command.record.status.is_terminal() {
                    debug!(command_id, progress, "Ignoring progress after terminal status");
                } else if command.record.progress != Some(progress) {
                    command.record.progress = Some(progress);
                    progress_changed = true;
                }
            }

            let new_status = command.record.status;
            let name = command.record.name.clone();

            let result = match (result, &exception) {
                (Some(result), _) => Some(result),
                (None, Some(exception)) => Some(CommandResult::failed(exception.clone())),
                (None, None) => None,
            };
            if let Some(exception) = exception {
                state.exception = Some((command_id.to_string(), exception.clone()));
                notifications.exception = Some((command_id.to_string(), exception));
            }
            if let Some(result) = result {
                state.result = Some((command_id.to_string(), result.clone()));
                notifications.result = Some((command_id.to_string(), result));
            }

            if status_changed || progress_changed {
                state.touch(command_id, limit);
            }
            if status_changed {
                notifications.statuses = Some(state.status_feed());
            }
            if progress_changed {
                notifications.progresses = Some(state.progress_feed());
            }
            if became_terminal {
                notifications.queue = Some(state.commands_in_queue());
            }

            let outcome = status_changed.then_some((name, new_status, became_terminal));
            (outcome, notifications)
        });

        if let Some((name, status, became_terminal)) = outcome {
            log_command_operation(
                "update_command_info",
                command_id,
                Some(&name),
                status.as_str(),
                None,
            );
            if became_terminal {
                self.removal.schedule(command_id);
            }
        }
    }

    fn evict(&self, command_id: &str) {
        self.mutate(|state| {
            if state.commands.remove(command_id).is_none() {
                return ((), Notifications::default());
            }
            state.order.retain(|id| id != command_id);
            let in_feed = state.recent.iter().any(|id| id == command_id);
            state.recent.retain(|id| id != command_id);
            debug!(command_id, "Evicted command");

            let notifications = Notifications {
                queue: Some(state.commands_in_queue()),
                statuses: in_feed.then(|| state.status_feed()),
                progresses: in_feed.then(|| state.progress_feed()),
                ..Notifications::default()
            };
            ((), notifications)
        })
    }
}

/// Thread-safe registry of commands and their lifecycle
pub struct CommandTracker {
    core: Arc<TrackerCore>,
}

impl CommandTracker {
    /// Create a tracker delivering its feeds to `observers`.
    ///
    /// Fails only if the removal thread cannot be spawned.
    pub fn new(
        config: &TrackerConfig,
        observers: Vec<Arc<dyn TrackerObserver>>,
    ) -> std::io::Result<Self> {
        let target: Arc<OnceLock<Weak<TrackerCore>>> = Arc::new(OnceLock::new());
        let evict_target = Arc::clone(&target);
        let removal = RemovalScheduler::spawn(
            config.removal_delay(),
            Box::new(move |command_id| {
                match evict_target.get().and_then(Weak::upgrade) {
                    Some(core) => {
                        core.evict(command_id);
                        true
                    }
                    None => false,
                }
            }),
        )?;

        let core = Arc::new(TrackerCore {
            state: ReentrantMutex::new(RefCell::new(TrackerState::default())),
            observers,
            status_feed_size: config.status_feed_size.max(1),
            removal,
        });
        let _ = target.set(Arc::downgrade(&core));

        Ok(Self { core })
    }

    /// Register a command in `STAGING` and return its new id
    pub fn new_command(&self, name: &str, completed_callback: Option<CompletedCallback>) -> String {
        let id = generate_command_id(name);
        let limit = self.core.status_feed_size;

        self.core.mutate(|state| {
            let record = CommandRecord {
                id: id.clone(),
                name: name.to_string(),
                status: TaskStatus::Staging,
                progress: None,
                created_at: Utc::now(),
            };
            state.commands.insert(
                id.clone(),
                TrackedCommand {
                    record,
                    completed_callback,
                },
            );
            state.order.push_back(id.clone());
            state.touch(&id, limit);

            let notifications = Notifications {
                queue: Some(state.commands_in_queue()),
                statuses: Some(state.status_feed()),
                ..Notifications::default()
            };
            ((), notifications)
        });

        log_command_operation("new_command", &id, Some(name), TaskStatus::Staging.as_str(), None);
        id
    }

    /// Apply a partial update to `command_id`.
    ///
    /// An exception without a result records `(FAILED, exception)` as the
    /// result. Status only moves forward; a regression, or any change after a
    /// terminal status, is ignored and logged. Entering a terminal status clears
    /// progress and schedules eviction; entering `COMPLETED` also runs the
    /// command's completion callback once.
    pub fn update_command_info(&self, command_id: &str, update: TaskUpdate) {
        self.core.update(command_id, update);
    }

    /// Task callback that forwards every update to `command_id`.
    ///
    /// Updates arriving after the tracker is dropped are discarded.
    pub fn task_callback(&self, command_id: &str) -> Arc<dyn TaskCallback> {
        let core = Arc::downgrade(&self.core);
        let command_id = command_id.to_string();
        Arc::new(move |update: TaskUpdate| {
            if let Some(core) = core.upgrade() {
                core.update(&command_id, update);
            }
        })
    }

    /// `(id, name)` of every tracked command, oldest first
    pub fn commands_in_queue(&self) -> Vec<(String, String)> {
        self.core.with_state(TrackerState::commands_in_queue)
    }

    /// `(id, status)` of every tracked command, oldest first
    pub fn command_statuses(&self) -> Vec<(String, TaskStatus)> {
        self.core.with_state(TrackerState::command_statuses)
    }

    /// `(id, progress)` of every tracked command reporting progress
    pub fn command_progresses(&self) -> Vec<(String, u8)> {
        self.core.with_state(TrackerState::command_progresses)
    }

    /// The bounded status feed, most recently active last
    pub fn status_feed(&self) -> Vec<(String, TaskStatus)> {
        self.core.with_state(TrackerState::status_feed)
    }

    /// The bounded progress feed, most recently active last
    pub fn progress_feed(&self) -> Vec<(String, u8)> {
        self.core.with_state(TrackerState::progress_feed)
    }

    /// Most recent result and the command that produced it
    pub fn command_result(&self) -> Option<(String, CommandResult)> {
        self.core.with_state(|state| state.result.clone())
    }

    /// Most recent exception and the command that raised it
    pub fn command_exception(&self) -> Option<(String, String)> {
        self.core.with_state(|state| state.exception.clone())
    }

    /// Status of `command_id`, or `NOT_FOUND` if unknown or evicted
    pub fn get_command_status(&self, command_id: &str) -> TaskStatus {
        self.core.with_state(|state| {
            state
                .commands
                .get(command_id)
                .map(|command| command.record.status)
                .unwrap_or(TaskStatus::NotFound)
        })
    }

    pub fn get_command(&self, command_id: &str) -> Option<CommandRecord> {
        self.core.with_state(|state| {
            state
                .commands
                .get(command_id)
                .map(|command| command.record.clone())
        })
    }

    pub fn len(&self) -> usize {
        self.core.with_state(|state| state.commands.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CommandTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTracker")
            .field("commands", &self.len())
            .field("observers", &self.core.observers.len())
            .field("removal_delay", &self.core.removal.delay())
            .finish()
    }
}

/// Generate `"<unix seconds with micros>_<random suffix>_<name>"`
fn generate_command_id(name: &str) -> String {
    let timestamp = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
    let suffix = Uuid::new_v4().as_u128() & 0xffff_ffff_ffff;
    format!("{timestamp:.6}_{suffix}_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker() -> CommandTracker {
        CommandTracker::new(&TrackerConfig::default(), Vec::new()).unwrap()
    }

    #[derive(Default)]
    struct StatusLog {
        feeds: Mutex<Vec<Vec<(String, TaskStatus)>>>,
    }

    impl TrackerObserver for StatusLog {
        fn on_status_changed(&self, statuses: &[(String, TaskStatus)]) {
            self.feeds.lock().push(statuses.to_vec());
        }
    }

    #[test]
    fn test_new_command_is_staging() {
        let tracker = tracker();
        let id = tracker.new_command("Scan", None);

        assert!(id.ends_with("_Scan"));
        assert_eq!(tracker.get_command_status(&id), TaskStatus::Staging);
        assert_eq!(tracker.commands_in_queue(), vec![(id, "Scan".to_string())]);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let tracker = tracker();
        assert_eq!(tracker.get_command_status("nope"), TaskStatus::NotFound);
        tracker.update_command_info("nope", TaskUpdate::status(TaskStatus::Queued));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_exception_synthesises_failed_result() {
        let tracker = tracker();
        let id = tracker.new_command("Configure", None);

        tracker.update_command_info(&id, TaskUpdate::failed("bad config"));

        assert_eq!(tracker.get_command_status(&id), TaskStatus::Failed);
        assert_eq!(
            tracker.command_result(),
            Some((id.clone(), CommandResult::failed("bad config")))
        );
        assert_eq!(
            tracker.command_exception(),
            Some((id, "bad config".to_string()))
        );
    }

    #[test]
    fn test_status_never_regresses() {
        let tracker = tracker();
        let id = tracker.new_command("On", None);

        tracker.update_command_info(&id, TaskUpdate::status(TaskStatus::InProgress));
        tracker.update_command_info(&id, TaskUpdate::status(TaskStatus::Queued));
        assert_eq!(tracker.get_command_status(&id), TaskStatus::InProgress);

        tracker.update_command_info(&id, TaskUpdate::status(TaskStatus::Aborted));
        tracker.update_command_info(&id, TaskUpdate::status(TaskStatus::Completed));
        assert_eq!(tracker.get_command_status(&id), TaskStatus::Aborted);
    }

    #[test]
    fn test_terminal_status_clears_progress() {
        let tracker = tracker();
        let id = tracker.new_command("Scan", None);

        tracker.update_command_info(
            &id,
            TaskUpdate::status(TaskStatus::InProgress).with_progress(40),
        );
        assert_eq!(tracker.command_progresses(), vec![(id.clone(), 40)]);

        tracker.update_command_info(&id, TaskUpdate::completed(CommandResult::ok("done")));
        assert!(tracker.command_progresses().is_empty());
    }

    #[test]
    fn test_completed_callback_may_read_tracker() {
        let tracker = Arc::new(tracker());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));

        let reader = Arc::downgrade(&tracker);
        let counter = calls.clone();
        let sink = seen.clone();
        let id = tracker.new_command(
            "Scan",
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(tracker) = reader.upgrade() {
                    *sink.lock() = tracker.command_result();
                }
            })),
        );

        tracker.update_command_info(&id, TaskUpdate::completed(CommandResult::ok("done")));
        tracker.update_command_info(&id, TaskUpdate::completed(CommandResult::ok("again")));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), Some((id, CommandResult::ok("done"))));
    }

    #[test]
    fn test_status_feed_is_bounded() {
        let log = Arc::new(StatusLog::default());
        let config = TrackerConfig {
            removal_delay_ms: 10_000,
            status_feed_size: 2,
        };
        let tracker =
            CommandTracker::new(&config, vec![log.clone() as Arc<dyn TrackerObserver>]).unwrap();

        let first = tracker.new_command("A", None);
        let second = tracker.new_command("B", None);
        let third = tracker.new_command("C", None);

        let feed: Vec<_> = tracker.status_feed().into_iter().map(|(id, _)| id).collect();
        assert_eq!(feed, vec![second.clone(), third.clone()]);
        assert_eq!(tracker.get_command_status(&first), TaskStatus::Staging);
        assert_eq!(tracker.command_statuses().len(), 3);

        tracker.update_command_info(&first, TaskUpdate::status(TaskStatus::Queued));
        let feed: Vec<_> = tracker.status_feed().into_iter().map(|(id, _)| id).collect();
        assert_eq!(feed, vec![third, first]);
        assert_eq!(log.feeds.lock().len(), 4);
    }
}
