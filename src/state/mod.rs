//! State management module.
//!
//! Contains the array hosts (authority state), the registry that names
//! them, and the observer hooks around both.

mod host;
pub mod observer;
mod registry;

pub use host::{ArrayHost, HostParams, HostSettings};
pub use observer::{LoggingObserver, RegistryObserver};
pub use registry::{ArrayRegistry, NameTables};
