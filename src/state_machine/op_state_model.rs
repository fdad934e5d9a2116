//! # Operational State Model
//!
//! Tracks the operational state of a device. Component signals
//! (`component_*`) may arrive at any time; while the device is initialising
//! they move the machine between `INIT_*` substates, and `init_completed`
//! resolves the substate to the matching operational state. Observers only
//! ever see the collapsed [`OpState`] (every `INIT_*` reads as `INIT`).

use super::engine::{StateMachine, StateObserver, TransitionTable};
use super::errors::StateModelResult;
use super::events::OpTrigger;
use super::model::{Projection, StateModel};
use super::states::{OpMachineState, OpState};
use std::sync::{Arc, OnceLock};

static OP_STATE_TABLE: OnceLock<Arc<TransitionTable<OpMachineState, OpTrigger>>> =
    OnceLock::new();

const INIT_STATES: &[OpMachineState] = &[
    OpMachineState::InitDisable,
    OpMachineState::InitUnknown,
    OpMachineState::InitOff,
    OpMachineState::InitStandby,
    OpMachineState::InitOn,
    OpMachineState::InitFault,
];

const RUNNING_STATES: &[OpMachineState] = &[
    OpMachineState::Disable,
    OpMachineState::Unknown,
    OpMachineState::Off,
    OpMachineState::Standby,
    OpMachineState::On,
    OpMachineState::Fault,
];

/// Component signals with their `INIT_*` and resolved destinations
const COMPONENT_SIGNALS: &[(OpTrigger, OpMachineState, OpMachineState)] = &[
    (
        OpTrigger::ComponentDisconnected,
        OpMachineState::InitDisable,
        OpMachineState::Disable,
    ),
    (
        OpTrigger::ComponentUnknown,
        OpMachineState::InitUnknown,
        OpMachineState::Unknown,
    ),
    (
        OpTrigger::ComponentOff,
        OpMachineState::InitOff,
        OpMachineState::Off,
    ),
    (
        OpTrigger::ComponentStandby,
        OpMachineState::InitStandby,
        OpMachineState::Standby,
    ),
    (
        OpTrigger::ComponentOn,
        OpMachineState::InitOn,
        OpMachineState::On,
    ),
    (
        OpTrigger::ComponentFault,
        OpMachineState::InitFault,
        OpMachineState::Fault,
    ),
];

fn build_table() -> TransitionTable<OpMachineState, OpTrigger> {
    let mut table = TransitionTable::new("op_state", OpMachineState::ALL).transition(
        OpMachineState::Uninitialised,
        OpTrigger::InitInvoked,
        OpMachineState::InitDisable,
    );

    for (trigger, init_state, resolved) in COMPONENT_SIGNALS {
        table = table
            .transitions(INIT_STATES, *trigger, *init_state)
            .transition(*init_state, OpTrigger::InitCompleted, *resolved)
            .transitions(RUNNING_STATES, *trigger, *resolved);
    }

    table
}

/// Operational state model
#[derive(Debug)]
pub struct OpStateModel {
    machine: StateMachine<OpMachineState, OpTrigger>,
    op_state: Arc<Projection<OpState>>,
}

impl OpStateModel {
    /// Shared transition table for every operational state model
    pub fn transition_table() -> Arc<TransitionTable<OpMachineState, OpTrigger>> {
        OP_STATE_TABLE
            .get_or_init(|| Arc::new(build_table()))
            .clone()
    }

    /// Create a model in `_UNINITIALISED`; `callback` receives each new [`OpState`]
    pub fn new(callback: Option<Arc<dyn StateObserver<OpState>>>) -> StateModelResult<Self> {
        let op_state = Arc::new(Projection::new("op_state", callback));
        let projection = op_state.clone();
        let observer: Arc<dyn StateObserver<OpMachineState>> =
            Arc::new(move |state: OpMachineState| {
                if let Some(value) = state.op_state() {
                    projection.update(value);
                }
            });

        let machine = StateMachine::new(
            Self::transition_table(),
            OpMachineState::Uninitialised,
            Some(observer),
        )?;

        Ok(Self { machine, op_state })
    }

    /// Externally reported operational state; `None` before initialisation starts
    pub fn op_state(&self) -> Option<OpState> {
        self.op_state.get()
    }

    /// Internal machine state, including `INIT_*` granularity
    pub fn machine_state(&self) -> OpMachineState {
        self.machine.state()
    }
}

impl StateModel for OpStateModel {
    type State = OpMachineState;
    type Action = OpTrigger;

    fn model_name(&self) -> &'static str {
        "op_state"
    }

    fn machine(&self) -> &StateMachine<OpMachineState, OpTrigger> {
        &self.machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::errors::StateModelError;
    use parking_lot::Mutex;

    fn recording_model() -> (OpStateModel, Arc<Mutex<Vec<OpState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: Arc<dyn StateObserver<OpState>> =
            Arc::new(move |state: OpState| sink.lock().push(state));
        (OpStateModel::new(Some(callback)).unwrap(), seen)
    }

    #[test]
    fn test_initialisation_resolves_component_state() {
        let (model, seen) = recording_model();
        assert_eq!(model.op_state(), None);

        model.perform_action(OpTrigger::InitInvoked).unwrap();
        assert_eq!(model.machine_state(), OpMachineState::InitDisable);
        assert_eq!(model.op_state(), Some(OpState::Init));

        model.perform_action(OpTrigger::ComponentStandby).unwrap();
        assert_eq!(model.machine_state(), OpMachineState::InitStandby);
        assert_eq!(model.op_state(), Some(OpState::Init));

        model.perform_action(OpTrigger::InitCompleted).unwrap();
        assert_eq!(model.machine_state(), OpMachineState::Standby);

        // INIT_DISABLE -> INIT_STANDBY is not externally visible
        assert_eq!(*seen.lock(), vec![OpState::Init, OpState::Standby]);
    }

    #[test]
    fn test_component_signals_after_init() {
        let (model, _) = recording_model();
        model.perform_action(OpTrigger::InitInvoked).unwrap();
        model.perform_action(OpTrigger::InitCompleted).unwrap();
        assert_eq!(model.op_state(), Some(OpState::Disable));

        model.perform_action(OpTrigger::ComponentOn).unwrap();
        assert_eq!(model.op_state(), Some(OpState::On));

        model.perform_action(OpTrigger::ComponentFault).unwrap();
        assert_eq!(model.op_state(), Some(OpState::Fault));

        // Fault recovery happens through a component signal
        model.perform_action(OpTrigger::ComponentOff).unwrap();
        assert_eq!(model.op_state(), Some(OpState::Off));
    }

    #[test]
    fn test_disallowed_actions() {
        let (model, seen) = recording_model();

        assert!(!model
            .is_action_allowed(OpTrigger::ComponentOn, false)
            .unwrap());
        let err = model.perform_action(OpTrigger::InitCompleted).unwrap_err();
        assert!(matches!(err, StateModelError::ActionNotAllowed { .. }));
        assert_eq!(model.machine_state(), OpMachineState::Uninitialised);
        assert!(seen.lock().is_empty());

        model.perform_action(OpTrigger::InitInvoked).unwrap();
        model.perform_action(OpTrigger::InitCompleted).unwrap();
        assert!(model.perform_action(OpTrigger::InitCompleted).is_err());
    }

    #[test]
    fn test_named_actions() {
        let (model, _) = recording_model();
        model.perform_action_named("init_invoked").unwrap();
        assert!(model
            .is_action_allowed_named("component_on", false)
            .unwrap());

        let err = model.perform_action_named("explode").unwrap_err();
        assert_eq!(
            err,
            StateModelError::UnknownAction {
                model: "op_state".to_string(),
                action: "explode".to_string(),
            }
        );
    }
}
