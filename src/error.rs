//! Crate-wide error type aggregating the per-layer errors.

use crate::commands::CommandError;
use crate::config::ConfigurationError;
use crate::execution::ExecutorError;
use crate::state_machine::{StateMachineError, StateModelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    StateModel(#[from] StateModelError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Component communication failed: {0}")]
    Component(String),

    #[error("Failed to spawn background thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
