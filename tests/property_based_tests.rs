//! Transition-table properties checked over every (state, trigger) pair

mod common;

use common::strategies::*;
use common::Recorder;
use device_core::state_machine::{
    AdminMode, AdminModeModel, AdminTrigger, MachineSymbol, ObsModelKind, ObsState, ObsStateModel,
    ObsTrigger, OpStateModel, StateMachine, StateMachineError, StateModel, StateModelError,
    StateObserver, TransitionTable,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::sync::Arc;

/// Fire `trigger` on a fresh machine sitting in `state` and check it against the table
fn check_engine_pair<S: MachineSymbol, T: MachineSymbol>(
    table: Arc<TransitionTable<S, T>>,
    state: S,
    trigger: T,
) -> Result<(), TestCaseError> {
    let recorder = Recorder::<S>::new();
    let machine = StateMachine::new(
        Arc::clone(&table),
        state,
        Some(Arc::clone(&recorder) as Arc<dyn StateObserver<S>>),
    )
    .map_err(|err| TestCaseError::fail(err.to_string()))?;

    match table.destination(state, trigger) {
        None => {
            let outcome = machine.trigger(trigger);
            prop_assert!(
                matches!(outcome, Err(StateMachineError::InvalidTransition { .. })),
                "{} --{}--> should fail, got {:?}",
                state,
                trigger,
                outcome
            );
            prop_assert_eq!(machine.state(), state);
            prop_assert!(recorder.values().is_empty());
        }
        Some(destination) => {
            prop_assert_eq!(machine.trigger(trigger), Ok(destination));
            prop_assert_eq!(machine.state(), destination);
            prop_assert_eq!(recorder.values(), vec![destination]);
        }
    }
    Ok(())
}

/// Drive `model` from its initial state to `state`, then perform `trigger`
fn check_model_pair<M: StateModel>(
    model: &M,
    state: M::State,
    trigger: M::Action,
) -> Result<(), TestCaseError> {
    let initial = model.machine().state();
    let Some(path) = path_to(model.machine().table(), initial, state) else {
        // Unreachable from the initial state; covered at engine level
        return Ok(());
    };
    for step in path {
        model
            .perform_action(step)
            .map_err(|err| TestCaseError::fail(err.to_string()))?;
    }
    prop_assert_eq!(model.machine().state(), state);

    let expected = model.machine().table().destination(state, trigger);
    prop_assert_eq!(
        model.is_action_allowed(trigger, false).ok(),
        Some(expected.is_some())
    );

    match expected {
        None => {
            let outcome = model.perform_action(trigger);
            prop_assert!(
                matches!(outcome, Err(StateModelError::ActionNotAllowed { .. })),
                "{} in {} should be refused, got {:?}",
                trigger,
                state,
                outcome
            );
            prop_assert_eq!(model.machine().state(), state);
        }
        Some(destination) => {
            prop_assert!(model.perform_action(trigger).is_ok());
            prop_assert_eq!(model.machine().state(), destination);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn op_state_table_is_exhaustive(
        state in op_state_strategy(),
        trigger in op_trigger_strategy(),
    ) {
        check_engine_pair(OpStateModel::transition_table(), state, trigger)?;
    }

    #[test]
    fn admin_mode_table_is_exhaustive(
        state in admin_mode_strategy(),
        trigger in admin_trigger_strategy(),
    ) {
        check_engine_pair(AdminModeModel::transition_table(), state, trigger)?;
    }

    #[test]
    fn basic_obs_table_is_exhaustive(
        state in obs_state_strategy(),
        trigger in obs_trigger_strategy(),
    ) {
        let table = ObsStateModel::transition_table(ObsModelKind::Basic);
        prop_assume!(table.declares(state));
        check_engine_pair(table, state, trigger)?;
    }

    #[test]
    fn subarray_obs_table_is_exhaustive(
        state in obs_state_strategy(),
        trigger in obs_trigger_strategy(),
    ) {
        check_engine_pair(ObsStateModel::transition_table(ObsModelKind::Subarray), state, trigger)?;
    }

    #[test]
    fn op_state_model_enforces_table(
        state in op_state_strategy(),
        trigger in op_trigger_strategy(),
    ) {
        let model = OpStateModel::new(None).map_err(|err| TestCaseError::fail(err.to_string()))?;
        check_model_pair(&model, state, trigger)?;
    }

    #[test]
    fn admin_mode_model_enforces_table(
        state in admin_mode_strategy(),
        trigger in admin_trigger_strategy(),
    ) {
        let model = AdminModeModel::new(None).map_err(|err| TestCaseError::fail(err.to_string()))?;
        check_model_pair(&model, state, trigger)?;
    }

    #[test]
    fn subarray_obs_model_enforces_table(
        state in obs_state_strategy(),
        trigger in obs_trigger_strategy(),
    ) {
        let model = ObsStateModel::new(ObsModelKind::Subarray, None)
            .map_err(|err| TestCaseError::fail(err.to_string()))?;
        check_model_pair(&model, state, trigger)?;
    }

    #[test]
    fn basic_obs_model_enforces_table(
        state in obs_state_strategy(),
        trigger in obs_trigger_strategy(),
    ) {
        let model = ObsStateModel::new(ObsModelKind::Basic, None)
            .map_err(|err| TestCaseError::fail(err.to_string()))?;
        check_model_pair(&model, state, trigger)?;
    }

    #[test]
    fn published_obs_state_tracks_machine(
        triggers in trigger_sequence(ObsTrigger::ALL, 40),
    ) {
        let recorder = Recorder::<ObsState>::new();
        let model = ObsStateModel::new(
            ObsModelKind::Subarray,
            Some(Arc::clone(&recorder) as Arc<dyn StateObserver<ObsState>>),
        )
        .map_err(|err| TestCaseError::fail(err.to_string()))?;

        for trigger in triggers {
            let _ = model.perform_action(trigger);
        }

        let published = recorder.values();
        prop_assert_eq!(published.last().copied(), Some(model.obs_state()));
        for pair in published.windows(2) {
            prop_assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn admin_mode_never_crosses_clusters_directly(
        triggers in trigger_sequence(AdminTrigger::ALL, 30),
    ) {
        let model = AdminModeModel::new(None).map_err(|err| TestCaseError::fail(err.to_string()))?;
        let available = [AdminMode::Maintenance, AdminMode::Online];
        let unavailable = [AdminMode::NotFitted, AdminMode::Reserved];

        for trigger in triggers {
            let before = model.admin_mode();
            if model.perform_action(trigger).is_ok() {
                let after = model.admin_mode();
                let crossed = (available.contains(&before) && unavailable.contains(&after))
                    || (unavailable.contains(&before) && available.contains(&after));
                prop_assert!(!crossed, "{} -> {} skipped OFFLINE", before, after);
            }
        }
    }
}

#[test]
fn offline_to_online_then_reserved_is_refused() {
    let model = AdminModeModel::with_initial(AdminMode::Offline, None).unwrap();

    model.perform_action_named("to_online").unwrap();
    assert_eq!(model.admin_mode(), AdminMode::Online);

    let err = model.perform_action_named("to_reserved").unwrap_err();
    assert!(matches!(err, StateModelError::ActionNotAllowed { .. }));
    assert_eq!(model.admin_mode(), AdminMode::Online);
}

#[test]
fn every_declared_state_is_reachable_in_subarray_model() {
    let table = ObsStateModel::transition_table(ObsModelKind::Subarray);
    let initial = ObsModelKind::Subarray.initial_state();
    for state in table.states() {
        assert!(
            path_to(&table, initial, *state).is_some(),
            "{state} unreachable from {initial}"
        );
    }
}
