//! # Observation State Models
//!
//! Command-bracketing triggers (`configure_invoked` / `configure_completed`,
//! `abort_invoked` / `abort_completed`, ...) combined with component signals
//! (`component_configured`, `component_scanning`, `component_obsfault`, ...).
//!
//! Component signals can arrive while a bracketed command is still running,
//! e.g. the component reporting itself unconfigured while an abort is in
//! progress. Such signals are accepted as reflexive transitions that keep the
//! machine in its transitional state.
//!
//! Two variants share the vocabulary:
//! - [`ObsModelKind::Basic`]: starts in IDLE, no resource management.
//! - [`ObsModelKind::Subarray`]: starts in EMPTY, adds resource assignment
//!   (`RESOURCING_*`) and `restart`.

use super::engine::{StateMachine, StateObserver, TransitionTable};
use super::errors::StateModelResult;
use super::events::ObsTrigger;
use super::model::{Projection, StateModel};
use super::states::{ObsMachineState, ObsState};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use ObsMachineState as S;
use ObsTrigger as T;

/// Which observation machine a model runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObsModelKind {
    Basic,
    Subarray,
}

impl ObsModelKind {
    pub fn initial_state(&self) -> ObsMachineState {
        match self {
            Self::Basic => S::Idle,
            Self::Subarray => S::Empty,
        }
    }
}

static BASIC_TABLE: OnceLock<Arc<TransitionTable<ObsMachineState, ObsTrigger>>> =
    OnceLock::new();
static SUBARRAY_TABLE: OnceLock<Arc<TransitionTable<ObsMachineState, ObsTrigger>>> =
    OnceLock::new();

const BASIC_STATES: &[ObsMachineState] = &[
    S::Idle,
    S::ConfiguringIdle,
    S::ConfiguringReady,
    S::Ready,
    S::Scanning,
    S::Aborting,
    S::Aborted,
    S::Resetting,
    S::Fault,
];

const ABORTABLE: &[ObsMachineState] = &[
    S::Idle,
    S::ConfiguringIdle,
    S::ConfiguringReady,
    S::Ready,
    S::Scanning,
    S::Resetting,
];

/// Configure / scan / abort / reset behaviour common to both variants
fn with_observation_transitions(
    table: TransitionTable<ObsMachineState, ObsTrigger>,
) -> TransitionTable<ObsMachineState, ObsTrigger> {
    table
        .from_any(T::ComponentObsFault, S::Fault)
        .transition(S::Idle, T::ConfigureInvoked, S::ConfiguringIdle)
        .transition(S::ConfiguringIdle, T::ConfigureCompleted, S::Idle)
        .transition(S::Ready, T::ConfigureInvoked, S::ConfiguringReady)
        .transition(S::ConfiguringIdle, T::ComponentConfigured, S::ConfiguringReady)
        .transition(S::ConfiguringReady, T::ComponentUnconfigured, S::ConfiguringIdle)
        .transition(S::ConfiguringReady, T::ConfigureCompleted, S::Ready)
        .transition(S::Ready, T::EndInvoked, S::Ready)
        .transition(S::Ready, T::ComponentUnconfigured, S::Idle)
        .transition(S::Ready, T::ScanInvoked, S::Ready)
        .transition(S::Ready, T::ComponentScanning, S::Scanning)
        .transition(S::Scanning, T::EndScanInvoked, S::Scanning)
        .transition(S::Scanning, T::ComponentNotScanning, S::Ready)
        .transitions(ABORTABLE, T::AbortInvoked, S::Aborting)
        .reflexive(
            S::Aborting,
            &[
                T::ComponentConfigured,
                T::ComponentUnconfigured,
                T::ComponentScanning,
                T::ComponentNotScanning,
            ],
        )
        .transition(S::Aborting, T::AbortCompleted, S::Aborted)
        .transitions(&[S::Aborted, S::Fault], T::ObsResetInvoked, S::Resetting)
        .reflexive(S::Resetting, &[T::ComponentUnconfigured])
        .transition(S::Resetting, T::ObsResetCompleted, S::Idle)
}

fn build_basic_table() -> TransitionTable<ObsMachineState, ObsTrigger> {
    with_observation_transitions(TransitionTable::new("obs_state", BASIC_STATES))
}

fn build_subarray_table() -> TransitionTable<ObsMachineState, ObsTrigger> {
    with_observation_transitions(TransitionTable::new(
        "subarray_obs_state",
        ObsMachineState::ALL,
    ))
    .transitions(&[S::Empty], T::AssignInvoked, S::ResourcingEmpty)
    .transitions(&[S::Empty], T::ReleaseInvoked, S::ResourcingEmpty)
    .transitions(&[S::Idle], T::AssignInvoked, S::ResourcingIdle)
    .transitions(&[S::Idle], T::ReleaseInvoked, S::ResourcingIdle)
    .transition(S::ResourcingEmpty, T::ComponentResourced, S::ResourcingIdle)
    .transition(S::ResourcingIdle, T::ComponentUnresourced, S::ResourcingEmpty)
    .transition(S::ResourcingEmpty, T::AssignCompleted, S::Empty)
    .transition(S::ResourcingEmpty, T::ReleaseCompleted, S::Empty)
    .transition(S::ResourcingIdle, T::AssignCompleted, S::Idle)
    .transition(S::ResourcingIdle, T::ReleaseCompleted, S::Idle)
    .transitions(&[S::Aborted, S::Fault], T::RestartInvoked, S::Restarting)
    .reflexive(
        S::Restarting,
        &[T::ComponentUnconfigured, T::ComponentUnresourced],
    )
    .transition(S::Restarting, T::RestartCompleted, S::Empty)
}

/// Observation state model
#[derive(Debug)]
pub struct ObsStateModel {
    kind: ObsModelKind,
    machine: StateMachine<ObsMachineState, ObsTrigger>,
    obs_state: Arc<Projection<ObsState>>,
}

impl ObsStateModel {
    pub fn transition_table(
        kind: ObsModelKind,
    ) -> Arc<TransitionTable<ObsMachineState, ObsTrigger>> {
        match kind {
            ObsModelKind::Basic => BASIC_TABLE.get_or_init(|| Arc::new(build_basic_table())),
            ObsModelKind::Subarray => {
                SUBARRAY_TABLE.get_or_init(|| Arc::new(build_subarray_table()))
            }
        }
        .clone()
    }

    pub fn new(
        kind: ObsModelKind,
        callback: Option<Arc<dyn StateObserver<ObsState>>>,
    ) -> StateModelResult<Self> {
        let initial = kind.initial_state();
        let obs_state = Arc::new(Projection::new("obs_state", callback));
        let projection = obs_state.clone();
        let observer: Arc<dyn StateObserver<ObsMachineState>> =
            Arc::new(move |state: ObsMachineState| projection.update(state.obs_state()));

        let machine = StateMachine::new(Self::transition_table(kind), initial, Some(observer))?;
        obs_state.update(initial.obs_state());

        Ok(Self {
            kind,
            machine,
            obs_state,
        })
    }

    pub fn kind(&self) -> ObsModelKind {
        self.kind
    }

    /// Externally reported observation state
    pub fn obs_state(&self) -> ObsState {
        self.machine.state().obs_state()
    }

    pub fn machine_state(&self) -> ObsMachineState {
        self.machine.state()
    }

    /// Last value published to the callback
    pub fn published_obs_state(&self) -> Option<ObsState> {
        self.obs_state.get()
    }
}

impl StateModel for ObsStateModel {
    type State = ObsMachineState;
    type Action = ObsTrigger;

    fn model_name(&self) -> &'static str {
        self.machine.name()
    }

    fn machine(&self) -> &StateMachine<ObsMachineState, ObsTrigger> {
        &self.machine
    }
}
