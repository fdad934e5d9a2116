//! Units of work run by the [`TaskExecutor`](super::TaskExecutor) and the
//! callback through which they report their lifecycle.

use super::abort::AbortEvent;
use crate::constants::TaskStatus;
use crate::types::CommandResult;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Partial update of a task's lifecycle. Every field is optional and
/// independent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub result: Option<CommandResult>,
    pub exception: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress.min(100)),
            ..Self::default()
        }
    }

    /// `COMPLETED` together with the final result
    pub fn completed(result: CommandResult) -> Self {
        Self::status(TaskStatus::Completed).with_result(result)
    }

    /// `FAILED` together with the exception text
    pub fn failed(exception: impl Into<String>) -> Self {
        Self::status(TaskStatus::Failed).with_exception(exception)
    }

    pub fn with_result(mut self, result: CommandResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }
}

/// Observer of task updates, typically bound to one command id
pub trait TaskCallback: Send + Sync {
    fn update(&self, update: TaskUpdate);
}

impl<F> TaskCallback for F
where
    F: Fn(TaskUpdate) + Send + Sync,
{
    fn update(&self, update: TaskUpdate) {
        self(update)
    }
}

/// Handle a task body uses to report status, progress and results.
///
/// Reporting through a handle without a callback is a no-op.
#[derive(Clone, Default)]
pub struct TaskReporter {
    callback: Option<Arc<dyn TaskCallback>>,
}

impl TaskReporter {
    pub fn new(callback: Arc<dyn TaskCallback>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn report(&self, update: TaskUpdate) {
        if let Some(callback) = &self.callback {
            callback.update(update);
        }
    }

    pub fn status(&self, status: TaskStatus) {
        self.report(TaskUpdate::status(status));
    }

    pub fn in_progress(&self) {
        self.status(TaskStatus::InProgress);
    }

    pub fn progress(&self, progress: u8) {
        self.report(TaskUpdate::progress(progress));
    }

    pub fn completed(&self, result: CommandResult) {
        self.report(TaskUpdate::completed(result));
    }

    pub fn failed(&self, exception: impl Into<String>) {
        self.report(TaskUpdate::failed(exception));
    }

    pub fn aborted(&self) {
        self.report(
            TaskUpdate::status(TaskStatus::Aborted)
                .with_result(CommandResult::aborted("Command has been aborted")),
        );
    }
}

impl From<Option<Arc<dyn TaskCallback>>> for TaskReporter {
    fn from(callback: Option<Arc<dyn TaskCallback>>) -> Self {
        Self { callback }
    }
}

impl fmt::Debug for TaskReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskReporter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Body of a task. Arguments are captured by the closure; the reporter and the
/// abort signal are supplied by the executor.
///
/// The body reports its own `IN_PROGRESS`, progress and terminal status. An
/// `Err` return (or a panic) is reported as `FAILED` by the executor.
pub type TaskFn = Box<dyn FnOnce(TaskReporter, AbortEvent) -> anyhow::Result<()> + Send + 'static>;

/// A submitted unit of work, alive only while a worker executes it
pub struct Task {
    function: TaskFn,
    reporter: TaskReporter,
    abort_event: AbortEvent,
}

impl Task {
    pub fn new(function: TaskFn, reporter: TaskReporter, abort_event: AbortEvent) -> Self {
        Self {
            function,
            reporter,
            abort_event,
        }
    }

    /// Execute on the current thread. Never unwinds.
    pub fn run(self) {
        let Task {
            function,
            reporter,
            abort_event,
        } = self;

        if abort_event.is_set() {
            debug!("Abort requested before task started; not running it");
            reporter.aborted();
            return;
        }

        let body_reporter = reporter.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
            function(body_reporter, abort_event)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(error = %format!("{err:#}"), "Task failed");
                reporter.failed(format!("{err:#}"));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(error = %message, "Task panicked");
                reporter.failed(message);
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("reporter", &self.reporter)
            .field("abort_event", &self.abort_event)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
