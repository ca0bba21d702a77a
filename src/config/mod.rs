//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions (Config, ServerConfig, ReplicationConfig, ...)
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup checks that collect every problem at once

pub mod defaults;
mod types;
pub mod validation;

pub use types::{ArrayConfig, Config, ConfigError, NamesConfig, ReplicationConfig, ServerConfig};
