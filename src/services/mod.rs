// src/services/mod.rs
pub mod api_server;
pub mod registration;

pub use api_server::ApiServer;
pub use registration::{
    RegistrationEvent, RegistrationOrchestrator, RegistrationRequest, RegistrationSettings,
    RegistrationState,
};
