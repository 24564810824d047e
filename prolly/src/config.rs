//! Codec configuration module.
//!
//! This module provides configuration loading for the node codec from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `PROLLY_POOL_CAPACITY`: Number of encoder scratch buffers (default: `64`)
//! - `PROLLY_MAX_NODE_SIZE`: Largest encoded node in bytes (default: `262144`)
//! - `PROLLY_ADDRESS_WIDTH`: Content address width in bytes (default: `20`)
//!
//! # Invariants
//!
//! - `pool_capacity` and `max_node_size` are always positive
//! - `address_width` is always in 1-255

use std::sync::Arc;

use crate::address::DEFAULT_ADDRESS_WIDTH;
use crate::buffer_pool::{BufferPool, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_POOL_CAPACITY};

/// Codec configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()` or `default()`:
/// - `pool_capacity` > 0
/// - `max_node_size` > 0
/// - `address_width` > 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Number of scratch buffers shared by concurrent encoders.
    pub pool_capacity: usize,
    /// Largest node the encoder will produce, header included.
    pub max_node_size: usize,
    /// Width of content addresses written by the encoder.
    pub address_width: u8,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            max_node_size: DEFAULT_MAX_BUFFER_SIZE,
            address_width: DEFAULT_ADDRESS_WIDTH,
        }
    }
}

impl CodecConfig {
    /// Environment variable for the pool capacity.
    pub const POOL_CAPACITY_VAR: &'static str = "PROLLY_POOL_CAPACITY";
    /// Environment variable for the maximum node size.
    pub const MAX_NODE_SIZE_VAR: &'static str = "PROLLY_MAX_NODE_SIZE";
    /// Environment variable for the address width.
    pub const ADDRESS_WIDTH_VAR: &'static str = "PROLLY_ADDRESS_WIDTH";

    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but is not a positive integer in
    /// range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let pool_capacity =
            load_positive(&lookup, Self::POOL_CAPACITY_VAR)?.unwrap_or(defaults.pool_capacity);
        let max_node_size =
            load_positive(&lookup, Self::MAX_NODE_SIZE_VAR)?.unwrap_or(defaults.max_node_size);
        let address_width =
            load_positive(&lookup, Self::ADDRESS_WIDTH_VAR)?.unwrap_or(defaults.address_width);

        Ok(Self {
            pool_capacity,
            max_node_size,
            address_width,
        })
    }

    /// Build the buffer pool described by this configuration.
    #[must_use]
    pub fn build_pool(&self) -> Arc<BufferPool> {
        BufferPool::with_max_buffer_size(self.pool_capacity, self.max_node_size)
    }
}

/// Load a positive integer variable.
///
/// Returns `None` if the variable is not set.
///
/// # Errors
///
/// Returns an error if the value does not parse, is out of range, or is zero.
fn load_positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed != T::default() => Ok(Some(parsed)),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a positive integer in range"),
        }),
    }
}
