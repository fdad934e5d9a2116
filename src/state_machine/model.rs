//! Common contract of the domain state models.
//!
//! A state model owns one [`StateMachine`] and exposes it only through
//! `perform_action`, the single sanctioned mutator. Externally visible values
//! (operational state, admin mode, observation state) are projections of the
//! machine state, published through a [`Projection`] when they change.

use super::engine::{MachineSymbol, StateMachine, StateObserver};
use super::errors::{StateModelError, StateModelResult};
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Domain wrapper around a state machine
pub trait StateModel: Send + Sync {
    type State: MachineSymbol;
    type Action: MachineSymbol + FromStr;

    /// Name used in errors and logs
    fn model_name(&self) -> &'static str;

    /// The wrapped machine. Read-only access; mutate through `perform_action`.
    fn machine(&self) -> &StateMachine<Self::State, Self::Action>;

    /// Pure check whether `action` is valid in the current state.
    ///
    /// With `raise_if_disallowed` a disallowed action is reported as
    /// [`StateModelError::ActionNotAllowed`] instead of `Ok(false)`.
    fn is_action_allowed(
        &self,
        action: Self::Action,
        raise_if_disallowed: bool,
    ) -> StateModelResult<bool> {
        let machine = self.machine();
        let state = machine.state();
        if machine.table().lookup(state, action).is_some() {
            return Ok(true);
        }
        if raise_if_disallowed {
            return Err(StateModelError::ActionNotAllowed {
                model: self.model_name().to_string(),
                action: action.to_string(),
                state: state.to_string(),
            });
        }
        Ok(false)
    }

    /// Validate and perform `action`
    fn perform_action(&self, action: Self::Action) -> StateModelResult<()> {
        self.is_action_allowed(action, true)?;
        // The machine re-checks under its own lock, so a concurrent change between
        // the check and the trigger still surfaces as ActionNotAllowed.
        self.machine().trigger(action)?;
        Ok(())
    }

    /// Parse an action name, as received from the control protocol
    fn parse_action(&self, action: &str) -> StateModelResult<Self::Action> {
        action
            .parse::<Self::Action>()
            .map_err(|_| StateModelError::UnknownAction {
                model: self.model_name().to_string(),
                action: action.to_string(),
            })
    }

    fn perform_action_named(&self, action: &str) -> StateModelResult<()> {
        let action = self.parse_action(action)?;
        self.perform_action(action)
    }

    fn is_action_allowed_named(
        &self,
        action: &str,
        raise_if_disallowed: bool,
    ) -> StateModelResult<bool> {
        let action = self.parse_action(action)?;
        self.is_action_allowed(action, raise_if_disallowed)
    }
}

/// Last published value of an externally visible projection.
///
/// Invoked from inside the machine's observer, so updates are serialised by
/// the machine lock and reach the callback in transition order.
pub struct Projection<P> {
    model: &'static str,
    value: Mutex<Option<P>>,
    callback: Option<Arc<dyn StateObserver<P>>>,
}

impl<P: MachineSymbol> Projection<P> {
    pub fn new(model: &'static str, callback: Option<Arc<dyn StateObserver<P>>>) -> Self {
        Self {
            model,
            value: Mutex::new(None),
            callback,
        }
    }

    pub fn get(&self) -> Option<P> {
        *self.value.lock()
    }

    /// Record `value`, notifying the callback only if it differs from the last one
    pub fn update(&self, value: P) {
        {
            let mut current = self.value.lock();
            if *current == Some(value) {
                return;
            }
            *current = Some(value);
        }
        debug!(model = self.model, value = %value, "Published state changed");
        if let Some(callback) = &self.callback {
            callback.on_state_changed(value);
        }
    }
}

impl<P: MachineSymbol> std::fmt::Debug for Projection<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projection")
            .field("model", &self.model)
            .field("value", &self.get())
            .finish()
    }
}
