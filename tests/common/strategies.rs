//! Proptest strategies over the state and trigger vocabularies

use device_core::state_machine::{
    AdminMode, AdminTrigger, MachineSymbol, ObsMachineState, ObsTrigger, OpMachineState,
    OpTrigger, TransitionTable,
};
use proptest::prelude::*;
use proptest::sample::select;
use std::collections::{HashMap, HashSet, VecDeque};

pub fn op_state_strategy() -> impl Strategy<Value = OpMachineState> {
    select(OpMachineState::ALL)
}

pub fn op_trigger_strategy() -> impl Strategy<Value = OpTrigger> {
    select(OpTrigger::ALL)
}

pub fn admin_mode_strategy() -> impl Strategy<Value = AdminMode> {
    select(AdminMode::ALL)
}

pub fn admin_trigger_strategy() -> impl Strategy<Value = AdminTrigger> {
    select(AdminTrigger::ALL)
}

pub fn obs_state_strategy() -> impl Strategy<Value = ObsMachineState> {
    select(ObsMachineState::ALL)
}

pub fn obs_trigger_strategy() -> impl Strategy<Value = ObsTrigger> {
    select(ObsTrigger::ALL)
}

/// Sequences of triggers to replay against a model
pub fn trigger_sequence<T: Clone + std::fmt::Debug + 'static>(
    triggers: &'static [T],
    max_len: usize,
) -> impl Strategy<Value = Vec<T>> {
    prop::collection::vec(select(triggers), 0..max_len)
}

/// Shortest trigger path from `from` to `to` through `table`, if any
pub fn path_to<S: MachineSymbol, T: MachineSymbol>(
    table: &TransitionTable<S, T>,
    from: S,
    to: S,
) -> Option<Vec<T>> {
    let mut previous: HashMap<S, (S, T)> = HashMap::new();
    let mut visited: HashSet<S> = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);

    while let Some(state) = queue.pop_front() {
        if state == to {
            let mut path = Vec::new();
            let mut current = to;
            while let Some((source, trigger)) = previous.get(&current) {
                path.push(*trigger);
                current = *source;
            }
            path.reverse();
            return Some(path);
        }
        for (source, trigger, destination) in table.entries() {
            if source == state && visited.insert(destination) {
                previous.insert(destination, (source, trigger));
                queue.push_back(destination);
            }
        }
    }
    None
}
