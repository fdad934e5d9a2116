//! # Command Invocation
//!
//! A [`DeviceCommand`] binds a name, an argument validator, a body and an
//! optional pair of state-model hooks. Invoking it validates the argument,
//! checks the hooked action is allowed, then either runs the body on the
//! calling thread ([`ExecutionPolicy::Inline`]) or registers a tracked command,
//! performs the `*_invoked` action and submits the body to the executor
//! ([`ExecutionPolicy::Submitted`]). It never blocks on a submitted body.

use super::tracker::{CommandTracker, CompletedCallback};
use crate::constants::{ResultCode, TaskStatus};
use crate::execution::{AbortEvent, TaskExecutor, TaskFn, TaskReporter, TaskUpdate};
use crate::state_machine::{StateModel, StateModelError, StateModelResult};
use crate::types::CommandResult;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid argument for {command}: {reason}")]
    Validation { command: String, reason: String },

    #[error("Command {command} not allowed: {source}")]
    NotAllowed {
        command: String,
        #[source]
        source: StateModelError,
    },

    #[error("Command {command} rejected: {reason}")]
    Rejected { command: String, reason: String },

    #[error("Command {command} failed: {reason}")]
    Execution { command: String, reason: String },
}

impl CommandError {
    /// Result code reported to the caller for this error
    pub fn result_code(&self) -> ResultCode {
        match self {
            CommandError::Validation { .. }
            | CommandError::NotAllowed { .. }
            | CommandError::Rejected { .. } => ResultCode::Rejected,
            CommandError::Execution { .. } => ResultCode::Failed,
        }
    }
}

impl From<CommandError> for CommandResult {
    fn from(error: CommandError) -> Self {
        CommandResult::new(error.result_code(), error.to_string())
    }
}

/// Validates and optionally transforms a command argument before anything runs
pub trait ArgumentValidator: Send + Sync {
    fn validate(&self, command: &str, argument: Value) -> Result<Value, CommandError>;
}

/// Accepts every argument unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityValidator;

impl ArgumentValidator for IdentityValidator {
    fn validate(&self, _command: &str, argument: Value) -> Result<Value, CommandError> {
        Ok(argument)
    }
}

/// Requires a JSON object carrying the named keys
#[derive(Debug, Clone, Default)]
pub struct RequiredKeysValidator {
    keys: Vec<String>,
}

impl RequiredKeysValidator {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl ArgumentValidator for RequiredKeysValidator {
    fn validate(&self, command: &str, argument: Value) -> Result<Value, CommandError> {
        let Some(object) = argument.as_object() else {
            return Err(CommandError::Validation {
                command: command.to_string(),
                reason: "argument must be a JSON object".to_string(),
            });
        };
        let missing: Vec<&str> = self
            .keys
            .iter()
            .filter(|key| !object.contains_key(key.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CommandError::Validation {
                command: command.to_string(),
                reason: format!("missing required keys: {}", missing.join(", ")),
            });
        }
        Ok(argument)
    }
}

impl<F> ArgumentValidator for F
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync,
{
    fn validate(&self, command: &str, argument: Value) -> Result<Value, CommandError> {
        self(argument).map_err(|reason| CommandError::Validation {
            command: command.to_string(),
            reason,
        })
    }
}

/// Whether a command body runs on the caller thread or on the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    Inline,
    Submitted,
}

type Hook = Arc<dyn Fn() -> StateModelResult<()> + Send + Sync>;

/// State-model actions bracketing a command
#[derive(Clone)]
pub struct StateHooks {
    allowed: Hook,
    invoked: Hook,
    completed: Hook,
}

impl StateHooks {
    pub fn new<A, I, C>(allowed: A, invoked: I, completed: C) -> Self
    where
        A: Fn() -> StateModelResult<()> + Send + Sync + 'static,
        I: Fn() -> StateModelResult<()> + Send + Sync + 'static,
        C: Fn() -> StateModelResult<()> + Send + Sync + 'static,
    {
        Self {
            allowed: Arc::new(allowed),
            invoked: Arc::new(invoked),
            completed: Arc::new(completed),
        }
    }

    /// Bracket a command with `invoked` and `completed` actions on `model`
    pub fn for_model<M>(model: Arc<M>, invoked: M::Action, completed: M::Action) -> Self
    where
        M: StateModel + 'static,
    {
        let check = Arc::clone(&model);
        let invoke = Arc::clone(&model);
        Self::new(
            move || check.is_action_allowed(invoked, true).map(|_| ()),
            move || invoke.perform_action(invoked),
            move || model.perform_action(completed),
        )
    }

    fn run_completed(&self, command: &str) {
        if let Err(err) = (self.completed)() {
            warn!(command, error = %err, "Completion action failed");
        }
    }
}

impl fmt::Debug for StateHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHooks").finish_non_exhaustive()
    }
}

pub type InlineBody = Arc<dyn Fn(Value) -> anyhow::Result<CommandResult> + Send + Sync>;
pub type SubmittedBody =
    Arc<dyn Fn(Value, TaskReporter, AbortEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
enum CommandBody {
    Inline(InlineBody),
    Submitted(SubmittedBody),
}

/// A named command exposed by a device
#[derive(Clone)]
pub struct DeviceCommand {
    name: String,
    validator: Arc<dyn ArgumentValidator>,
    body: CommandBody,
    hooks: Option<StateHooks>,
}

impl DeviceCommand {
    /// Command whose body runs to completion on the caller thread
    pub fn inline<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<CommandResult> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            validator: Arc::new(IdentityValidator),
            body: CommandBody::Inline(Arc::new(body)),
            hooks: None,
        }
    }

    /// Command whose body is tracked and submitted to the executor
    pub fn submitted<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Value, TaskReporter, AbortEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            validator: Arc::new(IdentityValidator),
            body: CommandBody::Submitted(Arc::new(body)),
            hooks: None,
        }
    }

    pub fn with_validator(mut self, validator: impl ArgumentValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_state_hooks(mut self, hooks: StateHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> ExecutionPolicy {
        match self.body {
            CommandBody::Inline(_) => ExecutionPolicy::Inline,
            CommandBody::Submitted(_) => ExecutionPolicy::Submitted,
        }
    }

    /// Invoke with `argument`, returning `(code, message_or_id)`.
    ///
    /// A submitted command returns `QUEUED` with its command id. Inline
    /// commands return the body's own result, or `FAILED`. Validation
    /// failures, disallowed actions and executor rejections return `REJECTED`.
    pub fn invoke(
        &self,
        tracker: &CommandTracker,
        executor: &TaskExecutor,
        argument: Value,
    ) -> CommandResult {
        match self.try_invoke(tracker, executor, argument) {
            Ok(result) => result,
            Err(err) => {
                info!(command = %self.name, error = %err, "Command not accepted");
                err.into()
            }
        }
    }

    /// As [`invoke`](Self::invoke), with failures as [`CommandError`]
    pub fn try_invoke(
        &self,
        tracker: &CommandTracker,
        executor: &TaskExecutor,
        argument: Value,
    ) -> Result<CommandResult, CommandError> {
        let argument = self.validator.validate(&self.name, argument)?;

        if let Some(hooks) = &self.hooks {
            (hooks.allowed)().map_err(|source| CommandError::NotAllowed {
                command: self.name.clone(),
                source,
            })?;
        }

        match &self.body {
            CommandBody::Inline(body) => self.run_inline(body, argument),
            CommandBody::Submitted(body) => self.submit(body, tracker, executor, argument),
        }
    }

    fn run_inline(
        &self,
        body: &InlineBody,
        argument: Value,
    ) -> Result<CommandResult, CommandError> {
        if let Some(hooks) = &self.hooks {
            (hooks.invoked)().map_err(|source| CommandError::NotAllowed {
                command: self.name.clone(),
                source,
            })?;
        }

        let outcome = body(argument);
        if let Some(hooks) = &self.hooks {
            hooks.run_completed(&self.name);
        }

        outcome.map_err(|err| CommandError::Execution {
            command: self.name.clone(),
            reason: format!("{err:#}"),
        })
    }

    fn submit(
        &self,
        body: &SubmittedBody,
        tracker: &CommandTracker,
        executor: &TaskExecutor,
        argument: Value,
    ) -> Result<CommandResult, CommandError> {
        let completed_callback = self.hooks.as_ref().map(|hooks| {
            let hooks = hooks.clone();
            let name = self.name.clone();
            Box::new(move || hooks.run_completed(&name)) as CompletedCallback
        });
        let command_id = tracker.new_command(&self.name, completed_callback);

        if let Some(hooks) = &self.hooks {
            if let Err(source) = (hooks.invoked)() {
                tracker.update_command_info(
                    &command_id,
                    TaskUpdate::status(TaskStatus::Rejected)
                        .with_result(CommandResult::rejected(source.to_string())),
                );
                return Err(CommandError::NotAllowed {
                    command: self.name.clone(),
                    source,
                });
            }
        }

        let body = Arc::clone(body);
        let task: TaskFn =
            Box::new(move |reporter, abort_event| body(argument, reporter, abort_event));
        let (status, message) = executor.submit(task, Some(tracker.task_callback(&command_id)));

        if status != TaskStatus::Queued {
            // The executor already recorded REJECTED; close the bracket so the
            // model does not stay in its transitional state.
            if let Some(hooks) = &self.hooks {
                hooks.run_completed(&self.name);
            }
            return Err(CommandError::Rejected {
                command: self.name.clone(),
                reason: message,
            });
        }

        debug!(command = %self.name, command_id = %command_id, "Command queued");
        Ok(CommandResult::new(ResultCode::Queued, command_id))
    }
}

impl fmt::Debug for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCommand")
            .field("name", &self.name)
            .field("policy", &self.policy())
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}
