//! # Table-Driven State Machine Engine
//!
//! A generic finite-state machine built from an explicit transition table.
//!
//! The table maps `(state, trigger)` to a destination state plus an optional side
//! effect. Any pair missing from the table is disallowed: triggering it is an
//! error and leaves the state untouched.
//!
//! One reentrant mutex per machine serialises the whole
//! assign → side effect → notify sequence. A side effect (or an observer) may
//! trigger the same machine again from the same thread; the nested transition
//! runs inside the outer one and every resulting state is delivered to the
//! observer in the order the transitions happened, after all side effects of
//! the chain have finished.

use super::errors::{StateMachineError, StateMachineResult};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Bound shared by state and trigger vocabularies
pub trait MachineSymbol:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

impl<T> MachineSymbol for T where
    T: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// Code run as part of a transition, with the machine as argument
pub type SideEffect<S, T> = Arc<dyn Fn(&StateMachine<S, T>) + Send + Sync>;

/// Receives every state a machine enters
pub trait StateObserver<S>: Send + Sync {
    fn on_state_changed(&self, state: S);
}

impl<S, F> StateObserver<S> for F
where
    F: Fn(S) + Send + Sync,
{
    fn on_state_changed(&self, state: S) {
        self(state)
    }
}

/// Destination and side effect for one `(state, trigger)` entry
pub struct Transition<S: MachineSymbol, T: MachineSymbol> {
    pub destination: S,
    side_effect: Option<SideEffect<S, T>>,
}

impl<S: MachineSymbol, T: MachineSymbol> Clone for Transition<S, T> {
    fn clone(&self) -> Self {
        Self {
            destination: self.destination,
            side_effect: self.side_effect.clone(),
        }
    }
}

impl<S: MachineSymbol, T: MachineSymbol> fmt::Debug for Transition<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("destination", &self.destination)
            .field("side_effect", &self.side_effect.is_some())
            .finish()
    }
}

/// Static transition table, built once per machine type
pub struct TransitionTable<S: MachineSymbol, T: MachineSymbol> {
    name: &'static str,
    states: Vec<S>,
    transitions: HashMap<(S, T), Transition<S, T>>,
}

impl<S: MachineSymbol, T: MachineSymbol> TransitionTable<S, T> {
    /// Start a table for a machine declaring `states`
    pub fn new(name: &'static str, states: &[S]) -> Self {
        Self {
            name,
            states: states.to_vec(),
            transitions: HashMap::new(),
        }
    }

    /// Add `source --trigger--> destination`
    pub fn transition(self, source: S, trigger: T, destination: S) -> Self {
        self.insert(source, trigger, destination, None)
    }

    /// Add the same trigger and destination for several sources
    pub fn transitions(mut self, sources: &[S], trigger: T, destination: S) -> Self {
        for source in sources {
            self = self.insert(*source, trigger, destination, None);
        }
        self
    }

    /// Add `trigger` from every declared state
    pub fn from_any(self, trigger: T, destination: S) -> Self {
        let sources = self.states.clone();
        self.transitions(&sources, trigger, destination)
    }

    /// Accept each trigger in `state` without leaving it
    pub fn reflexive(mut self, state: S, triggers: &[T]) -> Self {
        for trigger in triggers {
            self = self.insert(state, *trigger, state, None);
        }
        self
    }

    /// Add a transition that runs `effect` after the state is assigned
    pub fn transition_with_effect<F>(self, source: S, trigger: T, destination: S, effect: F) -> Self
    where
        F: Fn(&StateMachine<S, T>) + Send + Sync + 'static,
    {
        self.insert(source, trigger, destination, Some(Arc::new(effect)))
    }

    fn insert(
        mut self,
        source: S,
        trigger: T,
        destination: S,
        side_effect: Option<SideEffect<S, T>>,
    ) -> Self {
        debug_assert!(
            self.declares(source) && self.declares(destination),
            "{}: transition {source} --{trigger}--> {destination} uses an undeclared state",
            self.name
        );
        self.transitions.insert(
            (source, trigger),
            Transition {
                destination,
                side_effect,
            },
        );
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared states, in declaration order
    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn declares(&self, state: S) -> bool {
        self.states.contains(&state)
    }

    pub fn lookup(&self, state: S, trigger: T) -> Option<&Transition<S, T>> {
        self.transitions.get(&(state, trigger))
    }

    pub fn destination(&self, state: S, trigger: T) -> Option<S> {
        self.lookup(state, trigger).map(|t| t.destination)
    }

    /// Triggers valid from `state`
    pub fn allowed_triggers(&self, state: S) -> HashSet<T> {
        self.transitions
            .keys()
            .filter(|(source, _)| *source == state)
            .map(|(_, trigger)| *trigger)
            .collect()
    }

    /// Every `(source, trigger, destination)` entry
    pub fn entries(&self) -> impl Iterator<Item = (S, T, S)> + '_ {
        self.transitions
            .iter()
            .map(|((source, trigger), t)| (*source, *trigger, t.destination))
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

impl<S: MachineSymbol, T: MachineSymbol> fmt::Debug for TransitionTable<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionTable")
            .field("name", &self.name)
            .field("states", &self.states)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

struct MachineInner<S> {
    state: S,
    pending: VecDeque<S>,
    depth: usize,
}

/// Decrements the nesting depth even if a side effect unwinds
struct DepthGuard<'a, S>(&'a RefCell<MachineInner<S>>);

impl<S> Drop for DepthGuard<'_, S> {
    fn drop(&mut self) {
        let mut inner = self.0.borrow_mut();
        inner.depth -= 1;
        if inner.depth == 0 {
            inner.pending.clear();
        }
    }
}

/// Thread-safe state machine instance over a shared transition table
pub struct StateMachine<S: MachineSymbol, T: MachineSymbol> {
    table: Arc<TransitionTable<S, T>>,
    inner: ReentrantMutex<RefCell<MachineInner<S>>>,
    on_change: Option<Arc<dyn StateObserver<S>>>,
}

impl<S: MachineSymbol, T: MachineSymbol> StateMachine<S, T> {
    /// Create a machine in `initial`, which must be a declared state
    pub fn new(
        table: Arc<TransitionTable<S, T>>,
        initial: S,
        on_change: Option<Arc<dyn StateObserver<S>>>,
    ) -> StateMachineResult<Self> {
        if !table.declares(initial) {
            return Err(StateMachineError::UndeclaredState {
                machine: table.name().to_string(),
                state: initial.to_string(),
            });
        }

        Ok(Self {
            table,
            inner: ReentrantMutex::new(RefCell::new(MachineInner {
                state: initial,
                pending: VecDeque::new(),
                depth: 0,
            })),
            on_change,
        })
    }

    pub fn name(&self) -> &'static str {
        self.table.name()
    }

    pub fn table(&self) -> &TransitionTable<S, T> {
        &self.table
    }

    /// Current state
    pub fn state(&self) -> S {
        let guard = self.inner.lock();
        let state = guard.borrow().state;
        state
    }

    /// Triggers valid from an arbitrary `state`
    pub fn get_allowed_triggers(&self, state: S) -> HashSet<T> {
        self.table.allowed_triggers(state)
    }

    /// Whether `trigger` is valid from the current state
    pub fn can_trigger(&self, trigger: T) -> bool {
        self.table.lookup(self.state(), trigger).is_some()
    }

    /// Fire `trigger`: assign the destination, run the side effect, then notify.
    ///
    /// Returns the destination of this transition. Fails with
    /// [`StateMachineError::InvalidTransition`] without touching the state if the
    /// pair is not in the table.
    pub fn trigger(&self, trigger: T) -> StateMachineResult<S> {
        let guard = self.inner.lock();
        let cell: &RefCell<MachineInner<S>> = &guard;

        let (from, transition) = {
            let mut inner = cell.borrow_mut();
            let from = inner.state;
            let transition = self.table.lookup(from, trigger).cloned().ok_or_else(|| {
                StateMachineError::InvalidTransition {
                    machine: self.name().to_string(),
                    from: from.to_string(),
                    trigger: trigger.to_string(),
                }
            })?;
            inner.state = transition.destination;
            inner.pending.push_back(transition.destination);
            inner.depth += 1;
            (from, transition)
        };
        let _depth = DepthGuard(cell);

        debug!(
            machine = self.name(),
            from = %from,
            trigger = %trigger,
            to = %transition.destination,
            "State transition"
        );

        if let Some(effect) = &transition.side_effect {
            effect(self);
        }

        let outermost = cell.borrow().depth == 1;
        if outermost {
            self.flush_notifications(cell);
        }

        Ok(transition.destination)
    }

    fn flush_notifications(&self, cell: &RefCell<MachineInner<S>>) {
        loop {
            let next = cell.borrow_mut().pending.pop_front();
            let Some(state) = next else {
                break;
            };
            if let Some(observer) = &self.on_change {
                observer.on_state_changed(state);
            }
        }
    }
}

impl<S: MachineSymbol, T: MachineSymbol> fmt::Debug for StateMachine<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::named_enum;
    use parking_lot::Mutex;

    named_enum! {
        enum Door {
            Closed => "CLOSED",
            Open => "OPEN",
            Locked => "LOCKED",
        }
    }

    named_enum! {
        enum DoorTrigger {
            Open => "open",
            Close => "close",
            Lock => "lock",
            Slam => "slam",
        }
    }

    fn door_table() -> TransitionTable<Door, DoorTrigger> {
        TransitionTable::new("door", Door::ALL)
            .transition(Door::Closed, DoorTrigger::Open, Door::Open)
            .transition(Door::Open, DoorTrigger::Close, Door::Closed)
            .transition(Door::Closed, DoorTrigger::Lock, Door::Locked)
            // Slamming an open door closes and then locks it
            .transition_with_effect(Door::Open, DoorTrigger::Slam, Door::Closed, |machine| {
                machine.trigger(DoorTrigger::Lock).unwrap();
            })
    }

    fn recording_machine(
        table: TransitionTable<Door, DoorTrigger>,
        initial: Door,
    ) -> (StateMachine<Door, DoorTrigger>, Arc<Mutex<Vec<Door>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: Arc<dyn StateObserver<Door>> =
            Arc::new(move |state: Door| sink.lock().push(state));
        let machine = StateMachine::new(Arc::new(table), initial, Some(observer)).unwrap();
        (machine, seen)
    }

    #[test]
    fn test_valid_trigger_moves_and_notifies_once() {
        let (machine, seen) = recording_machine(door_table(), Door::Closed);

        assert_eq!(machine.trigger(DoorTrigger::Open).unwrap(), Door::Open);
        assert_eq!(machine.state(), Door::Open);
        assert_eq!(*seen.lock(), vec![Door::Open]);
    }

    #[test]
    fn test_invalid_trigger_fails_and_keeps_state() {
        let (machine, seen) = recording_machine(door_table(), Door::Closed);

        let err = machine.trigger(DoorTrigger::Close).unwrap_err();
        assert_eq!(
            err,
            StateMachineError::InvalidTransition {
                machine: "door".to_string(),
                from: "CLOSED".to_string(),
                trigger: "close".to_string(),
            }
        );
        assert_eq!(machine.state(), Door::Closed);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_nested_trigger_notifies_chain_in_order() {
        let (machine, seen) = recording_machine(door_table(), Door::Open);

        assert_eq!(machine.trigger(DoorTrigger::Slam).unwrap(), Door::Closed);
        assert_eq!(machine.state(), Door::Locked);
        assert_eq!(*seen.lock(), vec![Door::Closed, Door::Locked]);
    }

    #[test]
    fn test_observer_sees_state_already_assigned() {
        let table = Arc::new(door_table());
        let observed = Arc::new(Mutex::new(None));
        let holder: Arc<Mutex<Option<Arc<StateMachine<Door, DoorTrigger>>>>> =
            Arc::new(Mutex::new(None));

        let sink = observed.clone();
        let machine_ref = holder.clone();
        let observer: Arc<dyn StateObserver<Door>> = Arc::new(move |_state: Door| {
            if let Some(machine) = machine_ref.lock().as_ref() {
                *sink.lock() = Some(machine.state());
            }
        });
        let machine = Arc::new(StateMachine::new(table, Door::Closed, Some(observer)).unwrap());
        *holder.lock() = Some(machine.clone());

        machine.trigger(DoorTrigger::Open).unwrap();
        assert_eq!(*observed.lock(), Some(Door::Open));

        *holder.lock() = None;
    }

    #[test]
    fn test_allowed_triggers() {
        let (machine, _) = recording_machine(door_table(), Door::Closed);

        let allowed = machine.get_allowed_triggers(Door::Closed);
        assert_eq!(
            allowed,
            [DoorTrigger::Open, DoorTrigger::Lock].into_iter().collect()
        );
        assert!(machine.get_allowed_triggers(Door::Locked).is_empty());
        assert!(machine.can_trigger(DoorTrigger::Lock));
        assert!(!machine.can_trigger(DoorTrigger::Slam));
    }

    #[test]
    fn test_undeclared_initial_state_is_rejected() {
        let table = TransitionTable::<Door, DoorTrigger>::new("door", &[Door::Closed]);
        let result = StateMachine::new(Arc::new(table), Door::Open, None);
        assert!(matches!(
            result,
            Err(StateMachineError::UndeclaredState { .. })
        ));
    }

    #[test]
    fn test_concurrent_triggers_are_serialised() {
        let table = TransitionTable::new("door", Door::ALL)
            .transition(Door::Closed, DoorTrigger::Open, Door::Open)
            .transition(Door::Open, DoorTrigger::Close, Door::Closed);
        let (machine, seen) = recording_machine(table, Door::Closed);
        let machine = Arc::new(machine);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = machine.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let _ = machine.trigger(DoorTrigger::Open);
                        let _ = machine.trigger(DoorTrigger::Close);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Notifications must alternate: no transition was observed from a stale state
        let seen = seen.lock();
        for pair in seen.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }
}
