pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod mail;
pub mod models;
pub mod otp;
pub mod presence;
pub mod registry;
pub mod security;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
