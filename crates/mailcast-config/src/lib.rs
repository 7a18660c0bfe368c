//! # Mailcast Config
//!
//! Configuration management for Mailcast.
//! Supports layered configuration from files, `.env` files, environment
//! variables, and runtime refresh.

mod app_config;
mod loader;

pub use app_config::*;
pub use loader::*;
