//! Command dispatch
//!
//! Invoking a command locates a metaframe and sends the command to the
//! clause its handler declared for it. The frame is found in one of four
//! ways:
//!
//! - by command type: the innermost installation that declares the command
//!   ([`invoke_command`])
//! - by label ([`invoke_command_with_label`])
//! - by a [`HandlerRef`] obtained earlier ([`invoke_command_at`])
//! - by handler type, for call sites that know which handler will serve them
//!   ([`static_invoke_command`] and its label and reference variants)
//!
//! Plain clauses run right here, on the invoker's stack. Every other clause
//! runs in the driver of the target frame: the invoker parks its fiber with
//! a [`Suspend`] request pointing at an [`Exchange`] on its own stack, and
//! reads the clause's result from the same exchange once it is resumed.

use crate::command::Command;
use crate::handler::{Clause, Handler, NoResumeClause, PlainClause};
use crate::resumption::Resumption;
use crate::trampoline::Continue;
use oneshot_core::error::{EffectError, fatal};
use oneshot_core::fiber::{self, Suspend};
use oneshot_core::metastack::{self, Metaframe, Modifier};
use oneshot_core::stats::{self, Counter};
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::rc::Rc;

/// Command and result slot shared between an invoker and a clause
pub(crate) struct Exchange<C: Command> {
    command: Option<C>,
    out: Option<C::Out>,
}

/// Entry point of a clause that runs in the driver of its handler's frame.
/// Takes the handler, the invoker's `Exchange<C>` and the captured continuation.
pub(crate) type ResumeThunk<H> = fn(
    &H,
    *mut (),
    Box<dyn Continue<<H as Handler>::Answer>>,
) -> <H as Handler>::Answer;

/// Entry point of a plain clause. Takes the handler and the invoker's `Exchange<C>`.
pub(crate) type PlainThunk = unsafe fn(&dyn Any, *mut ());

/// Take the command out of an exchange.
///
/// # Safety
///
/// `exchange` must point at a live `Exchange<C>`.
unsafe fn take_command<C: Command>(exchange: *mut Exchange<C>) -> C {
    match unsafe { (*exchange).command.take() } {
        Some(command) => command,
        None => fatal(EffectError::Internal(format!(
            "command {} delivered twice",
            type_name::<C>()
        ))),
    }
}

pub(crate) fn resume_thunk<H: Clause<C>, C: Command>(
    handler: &H,
    exchange: *mut (),
    k: Box<dyn Continue<H::Answer>>,
) -> H::Answer {
    let exchange = exchange.cast::<Exchange<C>>();
    // SAFETY: the frame's clause table maps this entry to `C`, and the
    // invoker's fiber (owned by `k`) keeps the exchange alive.
    let command = unsafe { take_command(exchange) };
    let slot = unsafe { &raw mut (*exchange).out };
    handler.handle_command(command, Resumption::captured(k, slot))
}

pub(crate) fn no_resume_thunk<H: NoResumeClause<C>, C: Command>(
    handler: &H,
    exchange: *mut (),
    k: Box<dyn Continue<H::Answer>>,
) -> H::Answer {
    // SAFETY: as in `resume_thunk`; the command is moved out before `k`
    // (and the stack holding the exchange) goes away.
    let command = unsafe { take_command(exchange.cast::<Exchange<C>>()) };
    stats::bump(Counter::Discarded);
    tracing::trace!(command = type_name::<C>(), "discarding continuation for no_resume clause");
    drop(k);
    handler.handle_no_resume(command)
}

/// # Safety
///
/// `exchange` must point at a live `Exchange<C>` on the caller's stack.
pub(crate) unsafe fn plain_thunk<H: PlainClause<C>, C: Command>(
    handler: &dyn Any,
    exchange: *mut (),
) {
    let Some(handler) = handler.downcast_ref::<H>() else {
        fatal(EffectError::HandlerMismatch {
            expected: type_name::<H>(),
            found: "<unknown>",
        })
    };
    let exchange = exchange.cast::<Exchange<C>>();
    let command = unsafe { take_command(exchange) };
    let out = handler.handle_plain(command);
    unsafe { (*exchange).out = Some(out) };
}

/// A stable reference to one handler installation.
///
/// Dispatching through it reaches that exact installation even when other
/// handlers for the same commands have been installed above it since.
#[derive(Clone)]
pub struct HandlerRef {
    frame: Rc<Metaframe>,
}

impl HandlerRef {
    pub(crate) fn new(frame: Rc<Metaframe>) -> Self {
        Self { frame }
    }

    pub fn label(&self) -> i64 {
        self.frame.label()
    }

    pub fn handler_name(&self) -> &'static str {
        self.frame.handler_name()
    }

    /// Whether the installation is on the live metastack of this thread.
    ///
    /// False once its body has returned, and while it is part of a captured
    /// continuation.
    pub fn is_installed(&self) -> bool {
        !self.frame.is_retired() && metastack::contains(&self.frame)
    }

    fn live_frame(&self) -> Rc<Metaframe> {
        if !self.is_installed() {
            fatal(EffectError::StaleHandlerRef {
                label: self.frame.label(),
                handler: self.frame.handler_name(),
            });
        }
        Rc::clone(&self.frame)
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerRef({}:{})", self.label(), self.handler_name())
    }
}

/// Invoke `command` on the innermost handler that declares it.
///
/// Fatal when no installed handler declares the command.
pub fn invoke_command<C: Command>(command: C) -> C::Out {
    let Some((frame, entry)) = metastack::find_command(TypeId::of::<C>()) else {
        fatal(EffectError::NoHandler {
            command: type_name::<C>(),
        })
    };
    send(frame, entry, command)
}

/// Invoke `command` on the innermost installation labelled `label`.
///
/// Fatal when no such installation exists or its handler does not declare
/// the command.
pub fn invoke_command_with_label<C: Command>(label: i64, command: C) -> C::Out {
    let frame = labelled_frame::<C>(label);
    let entry = entry_for::<C>(&frame);
    send(frame, entry, command)
}

/// Invoke `command` on the installation `handler` refers to.
pub fn invoke_command_at<C: Command>(handler: &HandlerRef, command: C) -> C::Out {
    let frame = handler.live_frame();
    let entry = entry_for::<C>(&frame);
    send(frame, entry, command)
}

/// Invoke `command` on the innermost installation of handler type `H`.
///
/// Skips scanning clause tables: the frame is located by handler type.
pub fn static_invoke_command<H: Handler, C: Command>(command: C) -> C::Out {
    let Some(frame) = metastack::find_handler_type(TypeId::of::<H>()) else {
        fatal(EffectError::NoHandler {
            command: type_name::<C>(),
        })
    };
    let entry = entry_for::<C>(&frame);
    send(frame, entry, command)
}

/// Invoke `command` on the installation labelled `label`, which must be a `H`
pub fn static_invoke_command_with_label<H: Handler, C: Command>(label: i64, command: C) -> C::Out {
    let frame = labelled_frame::<C>(label);
    expect_handler::<H>(&frame);
    let entry = entry_for::<C>(&frame);
    send(frame, entry, command)
}

/// Invoke `command` on the installation `handler` refers to, which must be a `H`
pub fn static_invoke_command_at<H: Handler, C: Command>(handler: &HandlerRef, command: C) -> C::Out {
    let frame = handler.live_frame();
    expect_handler::<H>(&frame);
    let entry = entry_for::<C>(&frame);
    send(frame, entry, command)
}

/// Reference to the innermost installation that declares `C`
pub fn find_handler<C: Command>() -> HandlerRef {
    match metastack::find_command(TypeId::of::<C>()) {
        Some((frame, _)) => HandlerRef::new(frame),
        None => fatal(EffectError::NoHandler {
            command: type_name::<C>(),
        }),
    }
}

/// Reference to the innermost installation labelled `label`
pub fn find_handler_by_label(label: i64) -> HandlerRef {
    match metastack::find_label(label) {
        Some(frame) => HandlerRef::new(frame),
        None => fatal(EffectError::NoSuchLabel(label)),
    }
}

fn labelled_frame<C: Command>(label: i64) -> Rc<Metaframe> {
    match metastack::find_label(label) {
        Some(frame) => frame,
        None => fatal(EffectError::LabelNotFound {
            label,
            command: type_name::<C>(),
        }),
    }
}

fn entry_for<C: Command>(frame: &Metaframe) -> usize {
    match frame.clauses().lookup(TypeId::of::<C>()) {
        Some(entry) => entry,
        None => fatal(EffectError::LabelDoesNotHandle {
            label: frame.label(),
            handler: frame.handler_name(),
            command: type_name::<C>(),
        }),
    }
}

fn expect_handler<H: Handler>(frame: &Metaframe) {
    if !frame.handler().is::<H>() {
        fatal(EffectError::HandlerMismatch {
            expected: type_name::<H>(),
            found: frame.handler_name(),
        });
    }
}

/// Deliver `command` to clause `entry` of `frame` and wait for its result
fn send<C: Command>(frame: Rc<Metaframe>, entry: usize, command: C) -> C::Out {
    let modifier = frame.clauses().entry(entry).modifier;
    if modifier == Modifier::Plain {
        return send_plain(&frame, entry, command);
    }

    let mut exchange = Exchange::<C> {
        command: Some(command),
        out: None,
    };
    tracing::trace!(
        command = type_name::<C>(),
        label = frame.label(),
        handler = frame.handler_name(),
        "invoke"
    );
    let request = Suspend {
        frame: Rc::as_ptr(&frame),
        entry,
        exchange: (&raw mut exchange).cast(),
    };
    fiber::suspend(request, type_name::<C>());

    if modifier == Modifier::NoResume {
        fatal(EffectError::MalformedNoResume {
            command: type_name::<C>(),
        });
    }
    match exchange.out.take() {
        Some(out) => out,
        None => fatal(EffectError::Internal(format!(
            "{} resumed without a result",
            type_name::<C>()
        ))),
    }
}

/// Run a plain clause in place, with its handler and everything above it
/// detached from the metastack for the duration.
fn send_plain<C: Command>(frame: &Rc<Metaframe>, entry: usize, command: C) -> C::Out {
    let Some(&thunk) = frame.clauses().entry(entry).thunk.downcast_ref::<PlainThunk>() else {
        fatal(EffectError::Internal(format!(
            "plain clause for {} has no plain entry point",
            type_name::<C>()
        )))
    };
    let handler = Rc::clone(frame.handler());
    let mut exchange = Exchange::<C> {
        command: Some(command),
        out: None,
    };

    // Not restored on unwind: a forced unwind means the whole continuation,
    // hidden frames included, is being discarded.
    let hidden = metastack::split(frame);
    stats::bump(Counter::PlainDispatches);
    // SAFETY: the entry was registered for `C`, and `exchange` is a live `Exchange<C>`
    unsafe { thunk(&*handler, (&raw mut exchange).cast()) };
    metastack::splice(hidden);

    match exchange.out.take() {
        Some(out) => out,
        None => fatal(EffectError::Internal(format!(
            "plain clause for {} produced no result",
            type_name::<C>()
        ))),
    }
}
