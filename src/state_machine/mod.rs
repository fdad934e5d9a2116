// State machine module for device lifecycle modelling
//
// A generic table-driven engine plus the concrete models built on it: operational
// state, admin mode and the observation state variants.

pub mod admin_mode_model;
pub mod engine;
pub mod errors;
pub mod events;
pub mod model;
pub mod obs_state_model;
pub mod op_state_model;
pub mod states;

// Re-export main types for convenient access
pub use admin_mode_model::AdminModeModel;
pub use engine::{MachineSymbol, StateMachine, StateObserver, Transition, TransitionTable};
pub use errors::{StateMachineError, StateMachineResult, StateModelError, StateModelResult};
pub use events::{AdminTrigger, ObsTrigger, OpTrigger};
pub use model::StateModel;
pub use obs_state_model::{ObsModelKind, ObsStateModel};
pub use op_state_model::OpStateModel;
pub use states::{AdminMode, ObsMachineState, ObsState, OpMachineState, OpState};
