//! Commands: the operations a handled computation can invoke
//!
//! A command is an ordinary value carrying whatever the handler needs to
//! act on it. Its type also fixes what the handler hands back when it
//! resumes the invoker:
//!
//! ```
//! use oneshot_runtime::Command;
//!
//! struct Get;
//! impl Command for Get {
//!     type Out = i64;
//! }
//!
//! struct Put(i64);
//! impl Command for Put {
//!     type Out = ();
//! }
//!
//! // Several results come back as a tuple
//! struct Split(String);
//! impl Command for Split {
//!     type Out = (String, String);
//! }
//! ```
//!
//! Commands move into dispatch. The clause that receives one owns it and
//! may keep using it after resuming, whatever the invoker did in between.

/// A command type and the result it produces at the invocation site.
///
/// `Out = ()` for commands that produce nothing, a tuple for several
/// results, and an uninhabited type for commands whose clause never
/// resumes.
pub trait Command: 'static {
    type Out: 'static;
}

/// Uninhabited result for commands that never return to their invoker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Never {}
