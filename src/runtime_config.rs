//! Environment-driven runtime configuration.
//!
//! ## Environment variables
//!
//! ### `RESTRPC_STACK_SIZE`
//!
//! Stack size in bytes for the per-procedure coroutines, accepted in
//! decimal (`65536`) or hex (`0x10000`). Default: 64 KB. Larger stacks
//! support deeper call chains inside procedure handlers; smaller stacks
//! reduce memory when many procedures are registered.

use std::env;

const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Runtime configuration loaded once at service construction.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for procedure coroutines in bytes.
    pub stack_size: usize,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let stack_size = env::var("RESTRPC_STACK_SIZE")
            .ok()
            .and_then(|val| {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).ok()
                } else {
                    val.parse().ok()
                }
            })
            .unwrap_or(DEFAULT_STACK_SIZE);

        RuntimeConfig { stack_size }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}
