//! # Admin Mode Model
//!
//! Two clusters of freely inter-convertible modes:
//! `{NOT_FITTED, RESERVED, OFFLINE}` and `{OFFLINE, MAINTENANCE, ONLINE}`.
//! OFFLINE is the only bridge between them; any new mode must keep it that way.

use super::engine::{StateMachine, StateObserver, TransitionTable};
use super::errors::StateModelResult;
use super::events::AdminTrigger;
use super::model::{Projection, StateModel};
use super::states::AdminMode;
use std::sync::{Arc, OnceLock};

static ADMIN_MODE_TABLE: OnceLock<Arc<TransitionTable<AdminMode, AdminTrigger>>> =
    OnceLock::new();

const UNAVAILABLE_CLUSTER: &[AdminMode] = &[
    AdminMode::NotFitted,
    AdminMode::Reserved,
    AdminMode::Offline,
];

const AVAILABLE_CLUSTER: &[AdminMode] = &[
    AdminMode::Offline,
    AdminMode::Maintenance,
    AdminMode::Online,
];

fn build_table() -> TransitionTable<AdminMode, AdminTrigger> {
    TransitionTable::new("admin_mode", AdminMode::ALL)
        .transitions(
            UNAVAILABLE_CLUSTER,
            AdminTrigger::ToNotFitted,
            AdminMode::NotFitted,
        )
        .transitions(
            UNAVAILABLE_CLUSTER,
            AdminTrigger::ToReserved,
            AdminMode::Reserved,
        )
        .from_any(AdminTrigger::ToOffline, AdminMode::Offline)
        .transitions(
            AVAILABLE_CLUSTER,
            AdminTrigger::ToMaintenance,
            AdminMode::Maintenance,
        )
        .transitions(AVAILABLE_CLUSTER, AdminTrigger::ToOnline, AdminMode::Online)
}

/// Admin mode state model
#[derive(Debug)]
pub struct AdminModeModel {
    machine: StateMachine<AdminMode, AdminTrigger>,
    admin_mode: Arc<Projection<AdminMode>>,
}

impl AdminModeModel {
    pub fn transition_table() -> Arc<TransitionTable<AdminMode, AdminTrigger>> {
        ADMIN_MODE_TABLE
            .get_or_init(|| Arc::new(build_table()))
            .clone()
    }

    /// Create a model in the default mode (MAINTENANCE)
    pub fn new(callback: Option<Arc<dyn StateObserver<AdminMode>>>) -> StateModelResult<Self> {
        Self::with_initial(AdminMode::default(), callback)
    }

    pub fn with_initial(
        initial: AdminMode,
        callback: Option<Arc<dyn StateObserver<AdminMode>>>,
    ) -> StateModelResult<Self> {
        let admin_mode = Arc::new(Projection::new("admin_mode", callback));
        let projection = admin_mode.clone();
        let observer: Arc<dyn StateObserver<AdminMode>> =
            Arc::new(move |mode: AdminMode| projection.update(mode));

        let machine = StateMachine::new(Self::transition_table(), initial, Some(observer))?;
        // The starting mode is published without a transition
        admin_mode.update(initial);

        Ok(Self {
            machine,
            admin_mode,
        })
    }

    pub fn admin_mode(&self) -> AdminMode {
        self.machine.state()
    }
}

impl StateModel for AdminModeModel {
    type State = AdminMode;
    type Action = AdminTrigger;

    fn model_name(&self) -> &'static str {
        "admin_mode"
    }

    fn machine(&self) -> &StateMachine<AdminMode, AdminTrigger> {
        &self.machine
    }
}
