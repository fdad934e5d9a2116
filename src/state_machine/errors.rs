use thiserror::Error;

/// Errors raised by the transition engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid transition in {machine}: no '{trigger}' from state {from}")]
    InvalidTransition {
        machine: String,
        from: String,
        trigger: String,
    },

    #[error("State {state} is not declared by {machine}")]
    UndeclaredState { machine: String, state: String },
}

/// Errors raised by the domain state models.
///
/// Expected to be caught at the command invocation boundary and reported as a
/// rejected command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateModelError {
    #[error("Action {action} is not allowed in {model} state {state}")]
    ActionNotAllowed {
        model: String,
        action: String,
        state: String,
    },

    #[error("Unknown {model} action: {action}")]
    UnknownAction { model: String, action: String },

    #[error("State machine error: {0}")]
    Machine(String),
}

impl From<StateMachineError> for StateModelError {
    fn from(err: StateMachineError) -> Self {
        match err {
            StateMachineError::InvalidTransition {
                machine,
                from,
                trigger,
            } => Self::ActionNotAllowed {
                model: machine,
                action: trigger,
                state: from,
            },
            other => Self::Machine(other.to_string()),
        }
    }
}

/// Result type alias for engine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
/// Result type alias for state model operations
pub type StateModelResult<T> = Result<T, StateModelError>;
