//! Command tracking and invocation.

pub mod command;
pub mod observer;
mod removal;
pub mod tracker;

pub use command::{
    ArgumentValidator, CommandError, DeviceCommand, ExecutionPolicy, IdentityValidator,
    InlineBody, RequiredKeysValidator, StateHooks, SubmittedBody,
};
pub use observer::{FeedEvent, FeedPublisher, PublishedFeed, TrackerObserver};
pub use tracker::{CommandRecord, CommandTracker, CompletedCallback};
