#![allow(dead_code)]

pub mod strategies;

use device_core::commands::TrackerObserver;
use device_core::device::ComponentManager;
use device_core::execution::{TaskCallback, TaskUpdate};
use device_core::state_machine::StateObserver;
use device_core::{CommandResult, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Records every value a state model publishes
pub struct Recorder<T> {
    values: Mutex<Vec<T>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            values: Mutex::new(Vec::new()),
        })
    }

    pub fn values(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    pub fn clear(&self) {
        self.values.lock().clear();
    }
}

impl<T: Clone + Send + 'static> StateObserver<T> for Recorder<T> {
    fn on_state_changed(&self, state: T) {
        self.values.lock().push(state);
    }
}

/// Records task updates sent to a callback, in order
#[derive(Default)]
pub struct UpdateLog {
    updates: Mutex<Vec<TaskUpdate>>,
}

impl UpdateLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn callback(self: &Arc<Self>) -> Arc<dyn TaskCallback> {
        let log = Arc::clone(self);
        Arc::new(move |update: TaskUpdate| log.updates.lock().push(update))
    }

    pub fn updates(&self) -> Vec<TaskUpdate> {
        self.updates.lock().clone()
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.updates
            .lock()
            .iter()
            .filter_map(|update| update.status)
            .collect()
    }

    pub fn last_status(&self) -> Option<TaskStatus> {
        self.statuses().last().copied()
    }
}

/// Records the tracker's change feeds
#[derive(Default)]
pub struct FeedLog {
    status_feeds: Mutex<Vec<Vec<(String, TaskStatus)>>>,
    progress_feeds: Mutex<Vec<Vec<(String, u8)>>>,
    queue_feeds: Mutex<Vec<Vec<(String, String)>>>,
    results: Mutex<Vec<(String, CommandResult)>>,
    exceptions: Mutex<Vec<(String, String)>>,
}

impl FeedLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn observer(self: &Arc<Self>) -> Arc<dyn TrackerObserver> {
        Arc::clone(self) as Arc<dyn TrackerObserver>
    }

    /// Distinct statuses of `command_id` in the order the status feed showed them
    pub fn statuses_for(&self, command_id: &str) -> Vec<TaskStatus> {
        let mut seen: Vec<TaskStatus> = Vec::new();
        for feed in self.status_feeds.lock().iter() {
            if let Some((_, status)) = feed.iter().find(|(id, _)| id == command_id) {
                if seen.last() != Some(status) {
                    seen.push(*status);
                }
            }
        }
        seen
    }

    pub fn last_status_feed(&self) -> Vec<(String, TaskStatus)> {
        self.status_feeds.lock().last().cloned().unwrap_or_default()
    }

    pub fn last_progress_feed(&self) -> Vec<(String, u8)> {
        self.progress_feeds.lock().last().cloned().unwrap_or_default()
    }

    pub fn last_queue(&self) -> Vec<(String, String)> {
        self.queue_feeds.lock().last().cloned().unwrap_or_default()
    }

    pub fn queue_feed_count(&self) -> usize {
        self.queue_feeds.lock().len()
    }

    pub fn results(&self) -> Vec<(String, CommandResult)> {
        self.results.lock().clone()
    }

    pub fn exceptions(&self) -> Vec<(String, String)> {
        self.exceptions.lock().clone()
    }
}

impl TrackerObserver for FeedLog {
    fn on_queue_changed(&self, commands: &[(String, String)]) {
        self.queue_feeds.lock().push(commands.to_vec());
    }

    fn on_status_changed(&self, statuses: &[(String, TaskStatus)]) {
        self.status_feeds.lock().push(statuses.to_vec());
    }

    fn on_progress_changed(&self, progresses: &[(String, u8)]) {
        self.progress_feeds.lock().push(progresses.to_vec());
    }

    fn on_result(&self, command_id: &str, result: &CommandResult) {
        self.results
            .lock()
            .push((command_id.to_string(), result.clone()));
    }

    fn on_exception(&self, command_id: &str, exception: &str) {
        self.exceptions
            .lock()
            .push((command_id.to_string(), exception.to_string()));
    }
}

/// Component manager counting start/stop calls
#[derive(Default)]
pub struct MockComponentManager {
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: Mutex<Option<String>>,
    on_start: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl MockComponentManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn fail_start_with(&self, reason: &str) {
        *self.fail_start.lock() = Some(reason.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_start.lock() = None;
    }

    /// Run `hook` each time communication starts, e.g. to report component state
    pub fn on_start(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_start.lock() = Some(Box::new(hook));
    }
}

impl ComponentManager for MockComponentManager {
    fn start_communicating(&self) -> anyhow::Result<()> {
        if let Some(reason) = self.fail_start.lock().clone() {
            anyhow::bail!(reason);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_start.lock().as_ref() {
            hook();
        }
        Ok(())
    }

    fn stop_communicating(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Count of each key, for asserting "exactly once" style properties
pub fn tally<K: std::hash::Hash + Eq + Clone>(items: &[K]) -> HashMap<K, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item.clone()).or_insert(0) += 1;
    }
    counts
}
