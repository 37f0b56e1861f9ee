//! Effect runtime errors
//!
//! Almost every error here is a misuse of the dispatch or resumption
//! contracts: a command invoked outside any handler that could serve it, a
//! resumption consumed twice, a handler reference that outlived its frame.
//! Those are not recoverable. They go through [`fatal`], which logs, dumps
//! the metastack to stderr and terminates the process.
//!
//! The few operations that can fail for environmental reasons (allocating a
//! fiber stack, installing a configuration) return `Result<_, EffectError>`.

use crate::metastack;
use std::io::Write;

/// Exit status used by [`fatal`]
pub const FATAL_EXIT_CODE: i32 = 1;

/// Error type for the effect runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// No installed handler declares the command
    NoHandler { command: &'static str },
    /// Label-based dispatch found no frame with the label
    LabelNotFound { label: i64, command: &'static str },
    /// A handler lookup by label found no frame with the label
    NoSuchLabel(i64),
    /// The labelled frame exists but its handler does not declare the command
    LabelDoesNotHandle {
        label: i64,
        handler: &'static str,
        command: &'static str,
    },
    /// Static dispatch reached a frame installed for a different handler type
    HandlerMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// A handler reference points at a frame that is not on the live metastack
    StaleHandlerRef { label: i64, handler: &'static str },
    /// Resume or tail-resume of an empty resumption
    ResumeEmpty,
    /// A tail-resume was requested while another one was still pending
    TailSlotOccupied,
    /// The pending tail-resume does not produce the answer type being drained
    TailResumeMismatch { expected: &'static str },
    /// Control re-entered the discarded continuation of a no_resume clause
    MalformedNoResume { command: &'static str },
    /// Label 0 and the shadow label cannot be used for installations
    ReservedLabel(i64),
    /// A negative label that `fresh_label` has not handed out
    UnissuedLabel(i64),
    /// A command needed to suspend, but no fiber is running on this thread
    NotInFiber { command: &'static str },
    /// A handler declared the same command twice
    DuplicateClause {
        handler: &'static str,
        command: &'static str,
    },
    /// `configure` was called after the configuration had been fixed
    AlreadyConfigured,
    /// A fiber stack could not be allocated
    StackAllocation(String),
    /// Broken runtime invariant
    Internal(String),
}

impl std::fmt::Display for EffectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectError::NoHandler { command } => write!(f, "no handler for command {}", command),
            EffectError::LabelNotFound { label, command } => write!(
                f,
                "no handler with label {} (invoking command {})",
                label, command
            ),
            EffectError::NoSuchLabel(label) => write!(f, "no handler with label {}", label),
            EffectError::LabelDoesNotHandle {
                label,
                handler,
                command,
            } => write!(
                f,
                "handler {} with label {} does not handle command {}",
                handler, label, command
            ),
            EffectError::HandlerMismatch { expected, found } => write!(
                f,
                "static dispatch expected handler {} but found {}",
                expected, found
            ),
            EffectError::StaleHandlerRef { label, handler } => write!(
                f,
                "handler reference {}:{} is not installed on the metastack",
                label, handler
            ),
            EffectError::ResumeEmpty => write!(f, "resuming an empty resumption"),
            EffectError::TailSlotOccupied => {
                write!(f, "tail-resume requested while another is still pending")
            }
            EffectError::TailResumeMismatch { expected } => write!(
                f,
                "pending tail-resume does not answer with {}",
                expected
            ),
            EffectError::MalformedNoResume { command } => {
                write!(f, "malformed no_resume handler for command {}", command)
            }
            EffectError::ReservedLabel(label) => {
                write!(f, "label {} is reserved by the runtime", label)
            }
            EffectError::UnissuedLabel(label) => write!(
                f,
                "label {} was not issued by fresh_label; explicit labels must be positive",
                label
            ),
            EffectError::NotInFiber { command } => write!(
                f,
                "command {} cannot suspend: no fiber is running on this thread",
                command
            ),
            EffectError::DuplicateClause { handler, command } => write!(
                f,
                "handler {} declares command {} more than once",
                handler, command
            ),
            EffectError::AlreadyConfigured => {
                write!(f, "runtime configuration is already fixed")
            }
            EffectError::StackAllocation(e) => write!(f, "fiber stack allocation failed: {}", e),
            EffectError::Internal(s) => write!(f, "internal error: {}", s),
        }
    }
}

impl std::error::Error for EffectError {}

impl From<std::io::Error> for EffectError {
    fn from(e: std::io::Error) -> Self {
        EffectError::StackAllocation(e.to_string())
    }
}

/// Report an unrecoverable runtime error and terminate the process.
///
/// Writes `oneshot: <message>` followed by the metastack of the calling
/// thread to stderr, then exits with [`FATAL_EXIT_CODE`].
pub fn fatal(err: EffectError) -> ! {
    tracing::error!(error = %err, "fatal effect runtime error");
    {
        let mut out = std::io::stderr().lock();
        let _ = writeln!(out, "oneshot: {}", err);
        metastack::write_metastack(&mut out);
        let _ = out.flush();
    }
    std::process::exit(FATAL_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_command_and_label() {
        let err = EffectError::LabelNotFound {
            label: 42,
            command: "app::Read",
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("app::Read"));
    }

    #[test]
    fn test_label_lookup_message_has_no_command() {
        assert_eq!(EffectError::NoSuchLabel(9).to_string(), "no handler with label 9");
    }

    #[test]
    fn test_no_handler_message() {
        let err = EffectError::NoHandler { command: "Get" };
        assert_eq!(err.to_string(), "no handler for command Get");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "mmap failed");
        let err: EffectError = io.into();
        assert!(matches!(err, EffectError::StackAllocation(ref s) if s.contains("mmap failed")));
    }
}
