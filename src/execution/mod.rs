//! Execution of long-running command bodies on a bounded worker pool.

pub mod abort;
pub mod task;
pub mod task_executor;

pub use abort::AbortEvent;
pub use task::{Task, TaskCallback, TaskFn, TaskReporter, TaskUpdate};
pub use task_executor::{ExecutorError, ExecutorResult, TaskExecutor};
