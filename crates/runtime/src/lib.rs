//! Oneshot Runtime: one-shot algebraic effect handlers
//!
//! Code running under [`handle`] can invoke commands without knowing who
//! will serve them. The innermost handler that declares a command receives
//! it, together with a [`Resumption`]: the rest of the computation from the
//! invocation point up to the handler, which it may resume once, resume in
//! tail position, keep for later, or drop.
//!
//! ```
//! use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
//!
//! struct Ask;
//! impl Command for Ask {
//!     type Out = i32;
//! }
//!
//! struct Answer42;
//! impl Handler for Answer42 {
//!     type Answer = i32;
//!     type Body = i32;
//!     fn declare(clauses: &mut Clauses<Self>) {
//!         clauses.command::<Ask>();
//!     }
//!     fn handle_return(&self, body: i32) -> i32 {
//!         body
//!     }
//! }
//! impl Clause<Ask> for Answer42 {
//!     fn handle_command(&self, _: Ask, r: Resumption<i32, i32>) -> i32 {
//!         r.resume(42)
//!     }
//! }
//!
//! assert_eq!(handle(Answer42, || invoke_command(Ask) + 1), 43);
//! ```
//!
//! Each thread has its own metastack; handled computations and resumptions
//! are `!Send`.
//!
//! # Modules
//!
//! - `command`: The `Command` trait
//! - `handler`: `Handler`, the clause traits and the declaration builder
//! - `resumption`: One-shot continuations
//! - `dispatch`: Invoking commands by type, label, reference or handler type
//! - `handle`: Installing handlers, `wrap` adapters
//! - `trampoline`: Tail resumes without native stack growth

pub mod command;
pub mod dispatch;
pub mod handle;
pub mod handler;
pub mod resumption;
pub mod trampoline;

pub use command::{Command, Never};
pub use dispatch::{
    HandlerRef, find_handler, find_handler_by_label, invoke_command, invoke_command_at,
    invoke_command_with_label, static_invoke_command, static_invoke_command_at,
    static_invoke_command_with_label,
};
pub use handle::{
    handle, handle_labeled, handle_ref, handle_with, handle_with_labeled, handle_with_ref, wrap,
    wrap_with,
};
pub use handler::{Clause, Clauses, Handler, NoResumeClause, PlainClause};
pub use resumption::{RawResumption, Resumption};

// Runtime services from the core crate
pub use oneshot_core::{
    EffectError, EffectStats, RuntimeConfig, configure, debug_print_metastack, dump_diagnostics,
    fresh_label, global_stats, install_signal_handler, thread_stats,
};
