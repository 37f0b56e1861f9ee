//! Client programs for the one-shot effect handler runtime
//!
//! Each module is a small program built on `oneshot-runtime`. Output goes
//! through [`output`] so the `oneshot-demo` binary can print it and the
//! tests can check it.

pub mod actors;
pub mod async_await;
pub mod exceptions;
pub mod fuel;
pub mod generators;
pub mod logging;
pub mod output;
pub mod rollback;
pub mod shift0;
pub mod state;
pub mod threads;
