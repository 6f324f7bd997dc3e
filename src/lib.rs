//! Maintenance Platform API library crate.
//!
//! The binary in `main.rs` wires configuration, the store and the router;
//! integration tests in `tests/` drive [`api::app`] directly.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod store;

use std::sync::Arc;

use auth::token::TokenIssuer;
use auth::AuthService;
use store::Store;

/// Shared application state passed to handlers and extractors.
/// Built once at startup and never mutated.
pub struct AppState {
    pub config: config::Config,
    pub store: Arc<dyn Store>,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(config: config::Config, store: Arc<dyn Store>) -> Self {
        let tokens = TokenIssuer::from_config(&config);
        let auth = AuthService::new(store.clone(), tokens);
        Self {
            config,
            store,
            auth,
        }
    }
}
