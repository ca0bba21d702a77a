//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "reparrayd".to_string()
}

/// Port 0 disables the HTTP endpoint.
pub fn default_metrics_port() -> u16 {
    9090
}

// =============================================================================
// Replication Defaults
// =============================================================================

pub fn default_flush_interval_ms() -> u64 {
    100
}

pub fn default_channel_capacity() -> usize {
    64
}

pub fn default_replicas() -> usize {
    1
}

// =============================================================================
// Array Defaults
// =============================================================================

/// Property types that may take part in a property sort.
pub fn default_sortable_types() -> Vec<String> {
    ["string", "bool", "i64", "u64", "f64"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn default_type_tag() -> String {
    "Json".to_string()
}
