//! Oneshot Core: the machinery underneath one-shot effect handlers
//!
//! This crate knows nothing about commands or clauses as Rust traits. It
//! provides the pieces the handler runtime is assembled from.
//!
//! Key design principles:
//! - Fiber: every handled computation runs on its own stackful coroutine
//! - Metaframe: one handler installation, linked into a per-thread chain
//! - Segment: a run of metaframes detached by a capture, reattached by a resume
//!
//! # Modules
//!
//! - `config`: Fiber stack size and stack pool capacity, from the environment
//! - `diagnostics`: Counters and metastack dumps, SIGQUIT handler
//! - `error`: Runtime error type and the fatal reporting path
//! - `fiber`: Stackful coroutines with request forwarding
//! - `metastack`: The per-thread chain of handler installations
//! - `stats`: Thread-local and process-wide event counters

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fiber;
pub mod metastack;
pub mod stats;

pub use config::{RuntimeConfig, config, configure};
pub use diagnostics::{dump_diagnostics, install_signal_handler};
pub use error::{EffectError, fatal};
pub use fiber::{Fiber, Resumed, Suspend, in_fiber, suspend};
pub use metastack::{
    ClauseEntry, ClauseTable, FrameInfo, Metaframe, Modifier, SENTINEL_LABEL, SHADOW_LABEL,
    Segment, debug_print_metastack, fresh_label,
};
pub use stats::{Counter, EffectStats, global_stats, thread_stats};
