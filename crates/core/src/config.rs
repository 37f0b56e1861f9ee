//! Runtime configuration
//!
//! Fiber stack size and the per-thread stack pool capacity. Both are read
//! from the environment the first time a fiber is created, unless a
//! configuration was installed with [`configure`] before that.
//!
//! ## Environment
//!
//! - `ONESHOT_STACK_SIZE`: bytes per fiber stack (default 256 KiB)
//! - `ONESHOT_POOL_CAPACITY`: finished stacks kept per thread for reuse (default 64)
//!
//! Invalid values are reported with a warning and replaced by the default.

use crate::error::EffectError;
use std::sync::OnceLock;

/// Default fiber stack size.
/// Handled bodies run on their own stack; clauses run on the stack below.
pub const DEFAULT_STACK_SIZE: usize = 0x40000;

/// Smallest stack we hand to corosensei
pub const MIN_STACK_SIZE: usize = 0x4000;

/// Default number of finished stacks kept per thread
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Effect runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Size in bytes of each fiber stack
    pub stack_size: usize,
    /// Finished stacks kept per thread for reuse (0 disables pooling)
    pub pool_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            stack_size: parse_stack_size(std::env::var("ONESHOT_STACK_SIZE").ok()),
            pool_capacity: parse_pool_capacity(std::env::var("ONESHOT_POOL_CAPACITY").ok()),
        }
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// The active configuration, loading it from the environment on first use.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::from_env)
}

/// Install an explicit configuration.
///
/// Must run before the first fiber is created anywhere in the process.
pub fn configure(config: RuntimeConfig) -> Result<(), EffectError> {
    let config = RuntimeConfig {
        stack_size: config.stack_size.max(MIN_STACK_SIZE),
        ..config
    };
    CONFIG
        .set(config)
        .map_err(|_| EffectError::AlreadyConfigured)
}

/// Parse a stack size from an optional string value.
/// Returns the parsed size, or DEFAULT_STACK_SIZE if the value is missing, zero, or invalid.
/// Sizes below MIN_STACK_SIZE are raised to it.
fn parse_stack_size(env_value: Option<String>) -> usize {
    match env_value {
        Some(val) => match val.parse::<usize>() {
            Ok(0) => {
                tracing::warn!(
                    "ONESHOT_STACK_SIZE=0 is invalid, using default {}",
                    DEFAULT_STACK_SIZE
                );
                DEFAULT_STACK_SIZE
            }
            Ok(size) if size < MIN_STACK_SIZE => {
                tracing::warn!(
                    "ONESHOT_STACK_SIZE={} is too small, using minimum {}",
                    size,
                    MIN_STACK_SIZE
                );
                MIN_STACK_SIZE
            }
            Ok(size) => size,
            Err(_) => {
                tracing::warn!(
                    "ONESHOT_STACK_SIZE='{}' is not a valid number, using default {}",
                    val,
                    DEFAULT_STACK_SIZE
                );
                DEFAULT_STACK_SIZE
            }
        },
        None => DEFAULT_STACK_SIZE,
    }
}

fn parse_pool_capacity(env_value: Option<String>) -> usize {
    match env_value {
        Some(val) => val.parse::<usize>().unwrap_or_else(|_| {
            tracing::warn!(
                "ONESHOT_POOL_CAPACITY='{}' is not a valid number, using default {}",
                val,
                DEFAULT_POOL_CAPACITY
            );
            DEFAULT_POOL_CAPACITY
        }),
        None => DEFAULT_POOL_CAPACITY,
    }
}
