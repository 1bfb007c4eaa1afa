pub mod backend;
pub mod backend_client;
pub mod controller;
pub mod error;
pub mod model;
pub mod retry;
pub mod timers;
pub mod view;
pub mod voice;

pub use controller::{
    BackendOutcome, ControllerConfig, ControllerHandle, ControllerInput, Dependencies,
    SessionController,
};
pub use error::{SessionError, SessionResult};
