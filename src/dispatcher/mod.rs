//! # Dispatcher
//!
//! Coroutine-based procedure dispatch. Each procedure registered from the
//! route table runs in its own `may` coroutine; resolved calls travel to it
//! over an mpsc channel and the outcome returns over a per-call reply
//! channel. The request coroutine suspends on the reply, so many requests
//! interleave without threads or locks.
//!
//! Stack size for procedure coroutines comes from
//! [`RuntimeConfig`](crate::runtime_config::RuntimeConfig)
//! (`RESTRPC_STACK_SIZE`).
//!
//! Panics inside a procedure are caught and replied as internal errors;
//! the coroutine keeps serving subsequent calls.

mod core;

pub use core::{CallSender, Dispatcher, ProcedureCall};
