//! # Device Core
//!
//! Owns a device's state models, command tracker, task executor and command
//! registry, and couples them: admin mode drives communication with the
//! component, component signals drive the models, and registered commands are
//! invoked through the tracker and executor.

use super::component::{ComponentManager, ComponentSignal, NoComponent};
use crate::commands::{
    CommandTracker, DeviceCommand, FeedPublisher, StateHooks, TrackerObserver,
};
use crate::config::DeviceConfig;
use crate::constants::{ResultCode, TaskStatus};
use crate::error::{DeviceError, Result};
use crate::execution::TaskExecutor;
use crate::state_machine::{
    AdminMode, AdminModeModel, AdminTrigger, ObsModelKind, ObsState, ObsStateModel, ObsTrigger,
    OpState, OpStateModel, OpTrigger, StateModel, StateObserver,
};
use crate::types::CommandResult;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the tracked command created by [`DeviceCore::abort_commands`]
pub const ABORT_COMMANDS: &str = "AbortCommands";

/// Builder for [`DeviceCore`]
pub struct DeviceCoreBuilder {
    name: String,
    config: DeviceConfig,
    component_manager: Arc<dyn ComponentManager>,
    obs_kind: Option<ObsModelKind>,
    op_observers: Vec<Arc<dyn StateObserver<OpState>>>,
    admin_observers: Vec<Arc<dyn StateObserver<AdminMode>>>,
    obs_observers: Vec<Arc<dyn StateObserver<ObsState>>>,
    tracker_observers: Vec<Arc<dyn TrackerObserver>>,
}

impl DeviceCoreBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: DeviceConfig::default(),
            component_manager: Arc::new(NoComponent),
            obs_kind: None,
            op_observers: Vec::new(),
            admin_observers: Vec::new(),
            obs_observers: Vec::new(),
            tracker_observers: Vec::new(),
        }
    }

    pub fn config(mut self, config: DeviceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn component_manager(mut self, component_manager: Arc<dyn ComponentManager>) -> Self {
        self.component_manager = component_manager;
        self
    }

    /// Give the device an observation state model of `kind`
    pub fn observation(mut self, kind: ObsModelKind) -> Self {
        self.obs_kind = Some(kind);
        self
    }

    pub fn on_op_state(mut self, observer: Arc<dyn StateObserver<OpState>>) -> Self {
        self.op_observers.push(observer);
        self
    }

    pub fn on_admin_mode(mut self, observer: Arc<dyn StateObserver<AdminMode>>) -> Self {
        self.admin_observers.push(observer);
        self
    }

    pub fn on_obs_state(mut self, observer: Arc<dyn StateObserver<ObsState>>) -> Self {
        self.obs_observers.push(observer);
        self
    }

    pub fn tracker_observer(mut self, observer: Arc<dyn TrackerObserver>) -> Self {
        self.tracker_observers.push(observer);
        self
    }

    /// Publish every tracker and state feed on `publisher`
    pub fn feed_publisher(self, publisher: &FeedPublisher) -> Self {
        self.tracker_observer(Arc::new(publisher.clone()))
            .on_op_state(publisher.state_observer("op_state"))
            .on_admin_mode(publisher.state_observer("admin_mode"))
            .on_obs_state(publisher.state_observer("obs_state"))
    }

    pub fn build(self) -> Result<DeviceCore> {
        self.config.validate()?;

        let op_state = Arc::new(OpStateModel::new(fan_out(self.op_observers))?);
        let admin_mode = Arc::new(AdminModeModel::new(fan_out(self.admin_observers))?);
        let obs_state = match self.obs_kind {
            Some(kind) => Some(Arc::new(ObsStateModel::new(
                kind,
                fan_out(self.obs_observers),
            )?)),
            None => None,
        };

        let tracker = Arc::new(CommandTracker::new(
            &self.config.tracker,
            self.tracker_observers,
        )?);
        let executor = Arc::new(TaskExecutor::new(self.config.executor.clone())?);

        info!(
            device = %self.name,
            observation = ?self.obs_kind,
            "Device core built"
        );

        Ok(DeviceCore {
            name: self.name,
            config: self.config,
            op_state,
            admin_mode,
            obs_state,
            tracker,
            executor,
            commands: DashMap::new(),
            component_manager: self.component_manager,
        })
    }
}

/// Combine several observers into the single callback a model accepts
fn fan_out<P: Copy + Send + Sync + 'static>(
    observers: Vec<Arc<dyn StateObserver<P>>>,
) -> Option<Arc<dyn StateObserver<P>>> {
    match observers.len() {
        0 => None,
        1 => observers.into_iter().next(),
        _ => Some(Arc::new(move |value: P| {
            for observer in &observers {
                observer.on_state_changed(value);
            }
        })),
    }
}

/// Runtime core of one device
pub struct DeviceCore {
    name: String,
    config: DeviceConfig,
    op_state: Arc<OpStateModel>,
    admin_mode: Arc<AdminModeModel>,
    obs_state: Option<Arc<ObsStateModel>>,
    tracker: Arc<CommandTracker>,
    executor: Arc<TaskExecutor>,
    commands: DashMap<String, Arc<DeviceCommand>>,
    component_manager: Arc<dyn ComponentManager>,
}

impl DeviceCore {
    pub fn builder(name: impl Into<String>) -> DeviceCoreBuilder {
        DeviceCoreBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Run device initialisation: `init_invoked`, start communicating if the
    /// admin mode asks for it, then `init_completed`.
    ///
    /// If communication cannot be started, initialisation still completes, in
    /// `FAULT`, and the component error is returned. The device recovers
    /// through component signals or by cycling the admin mode.
    pub fn init(&self) -> Result<()> {
        self.op_state.perform_action(OpTrigger::InitInvoked)?;
        if self.admin_mode().wants_communication() {
            if let Err(err) = self.start_communicating() {
                warn!(device = %self.name, error = %err, "Initialisation ended in fault");
                self.op_state.perform_action(OpTrigger::ComponentFault)?;
                self.op_state.perform_action(OpTrigger::InitCompleted)?;
                return Err(err);
            }
        }
        self.op_state.perform_action(OpTrigger::InitCompleted)?;
        info!(device = %self.name, op_state = ?self.op_state(), "Device initialised");
        Ok(())
    }

    /// Change admin mode and start or stop communicating to match.
    ///
    /// The mode change is kept even if starting or stopping communication
    /// fails. The error is returned and the caller may retry by cycling
    /// through `OFFLINE`.
    pub fn set_admin_mode(&self, mode: AdminMode) -> Result<()> {
        let previous = self.admin_mode();
        self.admin_mode.perform_action(AdminTrigger::for_mode(mode))?;

        if mode.wants_communication() == previous.wants_communication() {
            debug!(device = %self.name, from = %previous, to = %mode, "Communication unchanged");
            return Ok(());
        }
        let outcome = if mode.wants_communication() {
            self.start_communicating()
        } else {
            self.stop_communicating()
        };
        if let Err(err) = &outcome {
            warn!(
                device = %self.name,
                admin_mode = %mode,
                error = %err,
                "Admin mode changed but component communication did not follow"
            );
        }
        outcome
    }

    fn start_communicating(&self) -> Result<()> {
        self.component_manager
            .start_communicating()
            .map_err(|err| DeviceError::Component(format!("{err:#}")))
    }

    fn stop_communicating(&self) -> Result<()> {
        self.component_manager
            .stop_communicating()
            .map_err(|err| DeviceError::Component(format!("{err:#}")))?;
        self.component_state_changed(ComponentSignal::Disconnected);
        Ok(())
    }

    /// Apply a component signal to the model it concerns.
    ///
    /// Signals the model cannot accept in its current state are logged and
    /// dropped. Returns whether a transition happened.
    pub fn component_state_changed(&self, signal: ComponentSignal) -> bool {
        if let Some(trigger) = signal.op_trigger() {
            return apply_signal(self.op_state.as_ref(), trigger, signal);
        }
        match (signal.obs_trigger(), &self.obs_state) {
            (Some(trigger), Some(obs_state)) => apply_signal(obs_state.as_ref(), trigger, signal),
            _ => {
                debug!(device = %self.name, ?signal, "No model for component signal");
                false
            }
        }
    }

    pub fn op_state(&self) -> Option<OpState> {
        self.op_state.op_state()
    }

    pub fn admin_mode(&self) -> AdminMode {
        self.admin_mode.admin_mode()
    }

    pub fn obs_state(&self) -> Option<ObsState> {
        self.obs_state.as_ref().map(|model| model.obs_state())
    }

    pub fn op_state_model(&self) -> &Arc<OpStateModel> {
        &self.op_state
    }

    pub fn admin_mode_model(&self) -> &Arc<AdminModeModel> {
        &self.admin_mode
    }

    pub fn obs_state_model(&self) -> Option<&Arc<ObsStateModel>> {
        self.obs_state.as_ref()
    }

    pub fn tracker(&self) -> &Arc<CommandTracker> {
        &self.tracker
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    /// Hooks bracketing a command with observation-state actions
    pub fn obs_hooks(&self, invoked: ObsTrigger, completed: ObsTrigger) -> Option<StateHooks> {
        self.obs_state
            .as_ref()
            .map(|model| StateHooks::for_model(Arc::clone(model), invoked, completed))
    }

    /// Register `command`, replacing any command of the same name
    pub fn register_command(&self, command: DeviceCommand) {
        let name = command.name().to_string();
        if self
            .commands
            .insert(name.clone(), Arc::new(command))
            .is_some()
        {
            warn!(device = %self.name, command = %name, "Replaced registered command");
        }
    }

    pub fn command(&self, name: &str) -> Option<Arc<DeviceCommand>> {
        self.commands.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Invoke the command registered as `name`
    pub fn invoke(&self, name: &str, argument: serde_json::Value) -> CommandResult {
        match self.command(name) {
            Some(command) => command.invoke(&self.tracker, &self.executor, argument),
            None => {
                let err = DeviceError::UnknownCommand(name.to_string());
                warn!(device = %self.name, error = %err, "Command rejected");
                CommandResult::rejected(err.to_string())
            }
        }
    }

    /// Status name of `command_id`, `"NOT_FOUND"` if unknown or evicted
    pub fn check_status(&self, command_id: &str) -> &'static str {
        self.tracker.get_command_status(command_id).as_str()
    }

    /// Abort every queued and running command.
    ///
    /// Returns `STARTED` with the id of a tracked `AbortCommands` command that
    /// completes once the executor accepts work again.
    pub fn abort_commands(&self) -> CommandResult {
        let command_id = self.tracker.new_command(ABORT_COMMANDS, None);
        let (status, message) = self.executor.abort(Some(self.tracker.task_callback(&command_id)));
        if status == TaskStatus::Rejected {
            return CommandResult::rejected(message);
        }
        info!(device = %self.name, command_id = %command_id, "Aborting commands");
        CommandResult::new(ResultCode::Started, command_id)
    }

    /// Names of tracked commands, oldest first
    pub fn commands_in_queue(&self) -> Vec<String> {
        self.tracker
            .commands_in_queue()
            .into_iter()
            .map(|(_, name)| name)
            .collect()
    }

    /// Ids of tracked commands, oldest first
    pub fn command_ids_in_queue(&self) -> Vec<String> {
        self.tracker
            .commands_in_queue()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// `[id, STATUS, id, STATUS, ...]` for the most recently active commands
    pub fn command_status_feed(&self) -> Vec<String> {
        self.tracker
            .status_feed()
            .into_iter()
            .flat_map(|(id, status)| [id, status.as_str().to_string()])
            .collect()
    }

    /// `[id, progress, ...]` for the most recently active commands reporting progress
    pub fn command_progress_feed(&self) -> Vec<String> {
        self.tracker
            .progress_feed()
            .into_iter()
            .flat_map(|(id, progress)| [id, progress.to_string()])
            .collect()
    }

    /// `[id, "[code, \"message\"]"]` for the most recent result, empty if none
    pub fn command_result_feed(&self) -> Vec<String> {
        self.tracker
            .command_result()
            .map(|(id, result)| vec![id, result.to_json()])
            .unwrap_or_default()
    }

    /// Stop communicating and wait for the executor to finish its queue.
    ///
    /// Must not be called from a task body.
    pub fn shutdown(&self) -> Result<()> {
        info!(device = %self.name, "Shutting down device");
        self.executor.shutdown();
        self.component_manager
            .stop_communicating()
            .map_err(|err| DeviceError::Component(format!("{err:#}")))
    }
}

fn apply_signal<M: StateModel>(model: &M, trigger: M::Action, signal: ComponentSignal) -> bool {
    match model.is_action_allowed(trigger, false) {
        Ok(true) => match model.perform_action(trigger) {
            Ok(()) => true,
            Err(err) => {
                debug!(
                    model = model.model_name(),
                    ?signal,
                    error = %err,
                    "Component signal lost a race"
                );
                false
            }
        },
        _ => {
            debug!(
                model = model.model_name(),
                ?signal,
                state = %model.machine().state(),
                "Component signal not applicable in current state; dropped"
            );
            false
        }
    }
}

impl std::fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCore")
            .field("name", &self.name)
            .field("op_state", &self.op_state())
            .field("admin_mode", &self.admin_mode())
            .field("obs_state", &self.obs_state())
            .field("commands", &self.command_names())
            .finish()
    }
}
