pub mod config;
pub mod error;
pub mod models;
pub mod openapi;
pub mod queue;
pub mod repo;
pub mod routes;
pub mod stats;
pub mod telemetry;
pub mod validation;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
