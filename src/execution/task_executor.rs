//! Bounded pool of worker threads with a global cooperative abort.
//!
//! Submissions go through a crossbeam channel to `max_workers` named threads.
//! [`TaskExecutor::abort`] raises the shared [`AbortEvent`], hands the current
//! pool to a background thread that drains it, then installs a fresh pool and a
//! fresh event. Submissions made while an abort is in flight are rejected.

use super::abort::AbortEvent;
use super::task::{Task, TaskCallback, TaskFn, TaskReporter, TaskUpdate};
use crate::config::ExecutorConfig;
use crate::constants::TaskStatus;
use crate::types::CommandResult;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Task executor is aborting; submission rejected")]
    Aborting,

    #[error("Task queue full: maximum {max_queue_size} queued tasks")]
    QueueFull { max_queue_size: usize },

    #[error("Task executor has no worker pool")]
    PoolUnavailable,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// One generation of worker threads sharing a task channel
struct WorkerPool {
    generation: usize,
    sender: Sender<Task>,
    workers: Vec<JoinHandle<()>>,
    exits: Receiver<usize>,
    pending: Arc<AtomicUsize>,
}

impl WorkerPool {
    fn spawn(max_workers: usize, generation: usize) -> ExecutorResult<Self> {
        let (sender, receiver) = channel::unbounded::<Task>();
        let (exit_sender, exits) = channel::unbounded::<usize>();
        let pending = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(max_workers);
        for index in 0..max_workers {
            let receiver = receiver.clone();
            let exit_sender = exit_sender.clone();
            let pending = Arc::clone(&pending);
            let handle = thread::Builder::new()
                .name(format!("task-executor-{generation}-{index}"))
                .spawn(move || {
                    for task in receiver.iter() {
                        task.run();
                        pending.fetch_sub(1, Ordering::AcqRel);
                    }
                    let _ = exit_sender.send(index);
                })?;
            workers.push(handle);
        }

        debug!(generation, workers = max_workers, "Worker pool started");
        Ok(Self {
            generation,
            sender,
            workers,
            exits,
            pending,
        })
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Close the channel and wait for every worker to finish what is already
    /// queued. With a timeout, workers still busy at the deadline are disowned.
    fn drain(self, timeout: Option<Duration>) {
        let WorkerPool {
            generation,
            sender,
            workers,
            exits,
            ..
        } = self;
        drop(sender);

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut exited = 0;
        while exited < workers.len() {
            let outcome = match deadline {
                Some(deadline) => exits.recv_deadline(deadline),
                None => exits.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match outcome {
                Ok(_) => exited += 1,
                Err(RecvTimeoutError::Disconnected) => {
                    exited = workers.len();
                }
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        if exited < workers.len() {
            warn!(
                generation,
                disowned = workers.len() - exited,
                "Disowning worker threads still running at abort deadline"
            );
            return;
        }

        for handle in workers {
            if handle.join().is_err() {
                warn!(generation, "Worker thread terminated abnormally");
            }
        }
        debug!(generation, "Worker pool drained");
    }
}

struct ExecutorState {
    pool: Option<WorkerPool>,
    abort_event: AbortEvent,
    aborting: bool,
    shut_down: bool,
    generation: usize,
}

/// Runs submitted task bodies on a fixed-size thread pool.
///
/// `submit` and `abort` never block on task execution. Every status change is
/// reported through the per-task [`TaskCallback`].
pub struct TaskExecutor {
    config: ExecutorConfig,
    state: Arc<Mutex<ExecutorState>>,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig) -> ExecutorResult<Self> {
        let pool = WorkerPool::spawn(config.max_workers.max(1), 0)?;
        info!(
            max_workers = config.max_workers,
            max_queue_size = config.max_queue_size,
            "Task executor started"
        );
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(ExecutorState {
                pool: Some(pool),
                abort_event: AbortEvent::new(),
                aborting: false,
                shut_down: false,
                generation: 0,
            })),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Queue `function` for execution.
    ///
    /// Returns `QUEUED` once accepted, after reporting `QUEUED` to `callback`.
    /// Returns `REJECTED` without queueing while aborting, when the queue is
    /// full, or when no pool is running; the rejection is reported to
    /// `callback` as well.
    pub fn submit(
        &self,
        function: TaskFn,
        callback: Option<Arc<dyn TaskCallback>>,
    ) -> (TaskStatus, String) {
        let reporter = TaskReporter::from(callback);
        match self.enqueue(function, &reporter) {
            Ok(()) => (TaskStatus::Queued, "Task queued".to_string()),
            Err(err) => {
                warn!(error = %err, "Task submission rejected");
                let message = err.to_string();
                reporter.report(
                    TaskUpdate::status(TaskStatus::Rejected)
                        .with_result(CommandResult::rejected(message.clone())),
                );
                (TaskStatus::Rejected, message)
            }
        }
    }

    fn enqueue(&self, function: TaskFn, reporter: &TaskReporter) -> ExecutorResult<()> {
        let (sender, abort_event, pending) = {
            let state = self.state.lock();
            if state.aborting {
                return Err(ExecutorError::Aborting);
            }
            let pool = state.pool.as_ref().ok_or(ExecutorError::PoolUnavailable)?;
            let max_queue_size = self.config.max_queue_size;
            if max_queue_size > 0 && pool.pending() >= max_queue_size {
                return Err(ExecutorError::QueueFull { max_queue_size });
            }
            pool.pending.fetch_add(1, Ordering::AcqRel);
            (
                pool.sender.clone(),
                state.abort_event.clone(),
                Arc::clone(&pool.pending),
            )
        };

        // Reported outside the executor lock: the callback may re-enter the
        // tracker, which may in turn submit.
        reporter.status(TaskStatus::Queued);

        let task = Task::new(function, reporter.clone(), abort_event);
        if sender.send(task).is_err() {
            pending.fetch_sub(1, Ordering::AcqRel);
            return Err(ExecutorError::PoolUnavailable);
        }
        Ok(())
    }

    /// Abort everything queued.
    ///
    /// Tasks not yet started report `ABORTED`; running tasks see their abort
    /// event set and finish on their own. Returns `IN_PROGRESS` immediately and
    /// reports `COMPLETED` to `callback` once a fresh pool is accepting work.
    /// A second abort while one is in flight is rejected.
    pub fn abort(&self, callback: Option<Arc<dyn TaskCallback>>) -> (TaskStatus, String) {
        let reporter = TaskReporter::from(callback);

        let old_pool = {
            let mut state = self.state.lock();
            if state.aborting {
                drop(state);
                let message = "Abort already in progress".to_string();
                reporter.report(
                    TaskUpdate::status(TaskStatus::Rejected)
                        .with_result(CommandResult::rejected(message.clone())),
                );
                return (TaskStatus::Rejected, message);
            }
            state.aborting = true;
            state.abort_event.set();
            state.pool.take()
        };

        info!(
            generation = old_pool.as_ref().map(|pool| pool.generation),
            "Aborting tasks"
        );
        reporter.in_progress();

        let relaunch = Relaunch {
            state: Arc::clone(&self.state),
            max_workers: self.config.max_workers.max(1),
            timeout: self.config.abort_timeout(),
            old_pool,
            reporter,
        };
        let slot = Arc::new(Mutex::new(Some(relaunch)));
        let thread_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name("task-executor-abort".to_string())
            .spawn(move || {
                let relaunch = thread_slot.lock().take();
                if let Some(relaunch) = relaunch {
                    relaunch.run();
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, "Could not spawn abort thread; relaunching inline");
            let relaunch = slot.lock().take();
            if let Some(relaunch) = relaunch {
                relaunch.run();
            }
        }

        (TaskStatus::InProgress, "Aborting tasks".to_string())
    }

    pub fn is_aborting(&self) -> bool {
        self.state.lock().aborting
    }

    /// Tasks queued or running on the current pool
    pub fn pending_tasks(&self) -> usize {
        self.state
            .lock()
            .pool
            .as_ref()
            .map(WorkerPool::pending)
            .unwrap_or(0)
    }

    /// Stop accepting work and wait for the pool to finish its queue.
    ///
    /// Must not be called from a task body.
    pub fn shutdown(&self) {
        let pool = {
            let mut state = self.state.lock();
            state.shut_down = true;
            state.pool.take()
        };
        if let Some(pool) = pool {
            info!(generation = pool.generation, "Shutting down task executor");
            pool.drain(None);
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        // Dropping the pool closes its channel; workers exit once idle.
        state.pool.take();
    }
}

/// Background half of an abort: drain the old pool, install a new one
struct Relaunch {
    state: Arc<Mutex<ExecutorState>>,
    max_workers: usize,
    timeout: Option<Duration>,
    old_pool: Option<WorkerPool>,
    reporter: TaskReporter,
}

impl Relaunch {
    fn run(self) {
        let Relaunch {
            state,
            max_workers,
            timeout,
            old_pool,
            reporter,
        } = self;

        if let Some(pool) = old_pool {
            pool.drain(timeout);
        }

        let mut guard = state.lock();
        guard.abort_event = AbortEvent::new();
        guard.aborting = false;

        if guard.shut_down {
            drop(guard);
            debug!("Executor shut down during abort; not relaunching");
            reporter.completed(CommandResult::ok("Abort completed"));
            return;
        }

        guard.generation += 1;
        let generation = guard.generation;
        match WorkerPool::spawn(max_workers, generation) {
            Ok(pool) => {
                guard.pool = Some(pool);
                drop(guard);
                info!(generation, "Abort completed; worker pool relaunched");
                reporter.completed(CommandResult::ok("Abort completed"));
            }
            Err(err) => {
                drop(guard);
                error!(error = %err, "Failed to relaunch worker pool after abort");
                reporter.failed(err.to_string());
            }
        }
    }
}
