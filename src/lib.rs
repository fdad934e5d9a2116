#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Device Core
//!
//! Runtime core for remotely controlled devices.
//!
//! ## Overview
//!
//! A device accepts commands that may run for an unbounded time, executes them
//! without blocking the caller, tracks their lifecycle, and keeps a set of
//! coupled state machines consistent with both command activity and signals from
//! the controlled component.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Table-driven engine plus the operational, admin mode and
//!   observation state models
//! - [`execution`] - Bounded worker pool with cooperative abort
//! - [`commands`] - Command tracker, change feeds and the invocation wrapper
//! - [`device`] - Glue owning the models, tracker, executor and command registry
//! - [`config`] - Configuration management
//! - [`logging`] - Once-only structured logging initialisation
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use device_core::commands::DeviceCommand;
//! use device_core::device::DeviceCore;
//! use device_core::state_machine::{ObsModelKind, ObsTrigger};
//! use device_core::types::CommandResult;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = DeviceCore::builder("low-mccs/subarray/01")
//!     .observation(ObsModelKind::Basic)
//!     .build()?;
//! device.init()?;
//!
//! let mut configure = DeviceCommand::submitted("Configure", |_argument, reporter, abort| {
//!     reporter.in_progress();
//!     if abort.is_set() {
//!         reporter.aborted();
//!         return Ok(());
//!     }
//!     reporter.completed(CommandResult::ok("Configured"));
//!     Ok(())
//! });
//! let hooks = device.obs_hooks(ObsTrigger::ConfigureInvoked, ObsTrigger::ConfigureCompleted);
//! if let Some(hooks) = hooks {
//!     configure = configure.with_state_hooks(hooks);
//! }
//! device.register_command(configure);
//!
//! let result = device.invoke("Configure", json!({"frequency": 150}));
//! println!("{}: {}", result.code, result.message);
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod execution;
pub mod logging;
pub mod macros;
pub mod state_machine;
pub mod types;

pub use commands::{CommandTracker, DeviceCommand, FeedPublisher, TrackerObserver};
pub use config::{ConfigManager, DeviceConfig};
pub use constants::{ResultCode, TaskStatus};
pub use device::{ComponentManager, ComponentSignal, DeviceCore};
pub use error::{DeviceError, Result};
pub use execution::{AbortEvent, TaskExecutor, TaskReporter, TaskUpdate};
pub use logging::init_structured_logging;
pub use types::CommandResult;
