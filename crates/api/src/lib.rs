// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Sweet Shop API Library
//!
//! Email-verified registration, password and Google login, bearer tokens,
//! and the role-gated inventory routes that sit behind them.

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod identity;
pub mod routes;
pub mod security;
pub mod state;
pub mod sweets;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::{AppState, Backends};
