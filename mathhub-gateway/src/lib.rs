//! HTTP gateway for the MathHub quest API.
//!
//! Serves quest listings and content, grades submitted answers and accepts
//! new quests. Every request that touches author code gets its own sandbox
//! from `mathhub-sandbox`.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod store;

pub use auth::Caller;
pub use config::{BackendKind, ConfigError, GatewayConfig, SharedEvaluator};
pub use error::GatewayError;
pub use routes::{create_router, AppState};
pub use store::{InMemoryStore, QuestStore, SeedError};
