//! Deferred eviction of terminal commands.
//!
//! A single background thread keeps a deadline heap and calls the eviction
//! closure once each deadline passes. The closure reports whether its target
//! still exists; the thread exits when it does not, or when the scheduler is
//! dropped.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Evicts one command id; returns `false` once the tracker is gone
pub(crate) type EvictFn = Box<dyn Fn(&str) -> bool + Send + 'static>;

struct Removal {
    deadline: Instant,
    command_id: String,
}

pub(crate) struct RemovalScheduler {
    delay: Duration,
    sender: Option<Sender<Removal>>,
    handle: Option<JoinHandle<()>>,
}

impl RemovalScheduler {
    pub(crate) fn spawn(delay: Duration, evict: EvictFn) -> std::io::Result<Self> {
        let (sender, receiver) = channel::unbounded::<Removal>();

        let handle = thread::Builder::new()
            .name("command-removal".to_string())
            .spawn(move || {
                let mut heap: BinaryHeap<Reverse<(Instant, u64, String)>> = BinaryHeap::new();
                let mut sequence = 0u64;

                loop {
                    let next_deadline = heap.peek().map(|Reverse((deadline, _, _))| *deadline);
                    let received = match next_deadline {
                        Some(deadline) => receiver.recv_deadline(deadline),
                        None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match received {
                        Ok(removal) => {
                            sequence += 1;
                            heap.push(Reverse((removal.deadline, sequence, removal.command_id)));
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let now = Instant::now();
                    while heap
                        .peek()
                        .is_some_and(|Reverse((deadline, _, _))| *deadline <= now)
                    {
                        let Some(Reverse((_, _, command_id))) = heap.pop() else {
                            break;
                        };
                        if !evict(&command_id) {
                            debug!("Tracker dropped; removal thread exiting");
                            return;
                        }
                    }
                }
            })?;

        Ok(Self {
            delay,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    /// Evict `command_id` once the grace period has elapsed
    pub(crate) fn schedule(&self, command_id: &str) {
        let removal = Removal {
            deadline: Instant::now() + self.delay,
            command_id: command_id.to_string(),
        };
        let sent = self
            .sender
            .as_ref()
            .map(|sender| sender.send(removal).is_ok())
            .unwrap_or(false);
        if !sent {
            warn!(command_id, "Removal thread unavailable; command will not be evicted");
        }
    }
}

impl Drop for RemovalScheduler {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Removal thread terminated abnormally");
            }
        }
    }
}
