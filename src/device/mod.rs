//! Device runtime glue over the state models, tracker and executor.

pub mod component;
pub mod device_core;

pub use component::{ComponentManager, ComponentSignal, NoComponent};
pub use device_core::{DeviceCore, DeviceCoreBuilder, ABORT_COMMANDS};
