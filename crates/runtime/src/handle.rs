//! Installing handlers
//!
//! `handle` pushes a metaframe for the handler, starts the body on a fresh
//! fiber and drives that fiber from the caller's stack. Driving means
//! resuming the fiber and reacting to how it comes back:
//!
//! - it finished: pop the frame and run the return clause
//! - it suspended on a command for this frame: detach the frame and
//!   everything above it, package the fiber and the detached frames as the
//!   continuation, and run the clause right here
//! - it suspended on a command for a frame further down: pass the request
//!   on by suspending the fiber this driver runs on
//!
//! Resuming a continuation splices its frames back and drives its fiber
//! again, on whatever stack the resumer is running on.

use crate::dispatch::{HandlerRef, ResumeThunk};
use crate::handler::{Handler, clause_table};
use crate::resumption::Resumption;
use crate::trampoline::{Continue, Step, run, settle};
use oneshot_core::error::{EffectError, fatal};
use oneshot_core::fiber::{self, Fiber, Resumed, Suspend};
use oneshot_core::metastack::{self, Metaframe, Modifier, SENTINEL_LABEL, SHADOW_LABEL, Segment};
use oneshot_core::stats::{self, Counter};
use std::any::type_name;
use std::rc::Rc;

/// Run `body` under `handler`, returning the handler's answer.
pub fn handle<H: Handler>(handler: H, body: impl FnOnce() -> H::Body + 'static) -> H::Answer {
    install(metastack::fresh_label(), Rc::new(handler), move |_| body())
}

/// Like [`handle`], with an explicit label for label-based dispatch.
///
/// Explicit labels are positive. Negative labels belong to anonymous
/// installations, so a negative `label` is accepted only if it came from
/// [`fresh_label`](crate::fresh_label). Anything else,
/// including `0`, is fatal.
pub fn handle_labeled<H: Handler>(
    label: i64,
    handler: H,
    body: impl FnOnce() -> H::Body + 'static,
) -> H::Answer {
    check_label(label);
    install(label, Rc::new(handler), move |_| body())
}

/// Run `body` under a handler instance that may be shared with other
/// installations or kept by the caller.
pub fn handle_with<H: Handler>(
    handler: Rc<H>,
    body: impl FnOnce() -> H::Body + 'static,
) -> H::Answer {
    install(metastack::fresh_label(), handler, move |_| body())
}

/// Like [`handle_with`], with an explicit label, under the same rules as
/// [`handle_labeled`]
pub fn handle_with_labeled<H: Handler>(
    label: i64,
    handler: Rc<H>,
    body: impl FnOnce() -> H::Body + 'static,
) -> H::Answer {
    check_label(label);
    install(label, handler, move |_| body())
}

/// Like [`handle`], handing the body a reference to its own installation
pub fn handle_ref<H: Handler>(
    handler: H,
    body: impl FnOnce(HandlerRef) -> H::Body + 'static,
) -> H::Answer {
    install(metastack::fresh_label(), Rc::new(handler), body)
}

/// Like [`handle_with`], handing the body a reference to its own installation
pub fn handle_with_ref<H: Handler>(
    handler: Rc<H>,
    body: impl FnOnce(HandlerRef) -> H::Body + 'static,
) -> H::Answer {
    install(metastack::fresh_label(), handler, body)
}

/// Lift `body` into a resumption that runs it under a fresh `H`.
///
/// Resuming the result with `a` evaluates `handle(H::default(), || body(a))`.
pub fn wrap<H, A>(body: impl FnOnce(A) -> H::Body + 'static) -> Resumption<A, H::Answer>
where
    H: Handler + Default,
    A: 'static,
{
    Resumption::from_fn(move |a| handle(H::default(), move || body(a)))
}

/// Lift `body` into a resumption that runs it under `handler`.
pub fn wrap_with<H: Handler, A: 'static>(
    handler: Rc<H>,
    body: impl FnOnce(A) -> H::Body + 'static,
) -> Resumption<A, H::Answer> {
    Resumption::from_fn(move |a| handle_with(handler, move || body(a)))
}

fn check_label(label: i64) {
    if label == SENTINEL_LABEL || label == SHADOW_LABEL {
        fatal(EffectError::ReservedLabel(label));
    }
    if !metastack::is_issued(label) {
        fatal(EffectError::UnissuedLabel(label));
    }
}

fn install<H: Handler>(
    label: i64,
    handler: Rc<H>,
    body: impl FnOnce(HandlerRef) -> H::Body + 'static,
) -> H::Answer {
    let frame = Rc::new(Metaframe::new(
        label,
        handler,
        type_name::<H>(),
        clause_table::<H>(),
    ));
    let this = HandlerRef::new(Rc::clone(&frame));
    let fiber = match Fiber::new(move || body(this)) {
        Ok(fiber) => fiber,
        Err(e) => fatal(e),
    };

    metastack::push(Rc::clone(&frame));
    stats::bump(Counter::Handles);
    tracing::trace!(label, handler = type_name::<H>(), "install");
    run(drive::<H>(frame, fiber))
}

/// A continuation captured by a clause of `H`: the suspended body fiber and
/// the frames that were detached with it.
struct Captured<H: Handler> {
    // Dropped first: unwinding the fiber may still touch the frames
    fiber: Fiber<H::Body>,
    segment: Segment,
}

impl<H: Handler> Continue<H::Answer> for Captured<H> {
    fn step(self: Box<Self>) -> Step<H::Answer> {
        let Captured { fiber, segment } = *self;
        let frame = Rc::clone(segment.bottom());
        tracing::trace!(
            label = frame.label(),
            handler = type_name::<H>(),
            frames = segment.frame_count(),
            "resume"
        );
        metastack::splice(segment);
        drive::<H>(frame, fiber)
    }
}

fn drive<H: Handler>(frame: Rc<Metaframe>, mut fiber: Fiber<H::Body>) -> Step<H::Answer> {
    loop {
        match fiber.resume() {
            Resumed::Finished(body) => return finish::<H>(frame, body),
            Resumed::Suspended(request) if request.targets(&frame) => {
                return capture::<H>(frame, fiber, request);
            }
            Resumed::Suspended(request) => forward(request),
        }
    }
}

/// Pass a request for a frame further down to the driver below this one
fn forward(request: Suspend) {
    // SAFETY: the invoker holds the target frame alive while it is suspended
    let command = unsafe { (*request.frame).clauses().entry(request.entry).command_name };
    fiber::suspend(request, command);
}

fn capture<H: Handler>(
    frame: Rc<Metaframe>,
    fiber: Fiber<H::Body>,
    request: Suspend,
) -> Step<H::Answer> {
    let (modifier, thunk) = {
        let entry = frame.clauses().entry(request.entry);
        (entry.modifier, entry.thunk.downcast_ref::<ResumeThunk<H>>().copied())
    };
    let Some(thunk) = thunk else {
        fatal(EffectError::Internal(format!(
            "clause {} of {} has no resumptive entry point",
            request.entry,
            type_name::<H>()
        )))
    };
    let handler: *const H = Rc::as_ptr(frame.handler()).cast::<H>();

    let segment = metastack::split(&frame);
    stats::bump(Counter::Captures);
    tracing::trace!(
        label = frame.label(),
        handler = type_name::<H>(),
        frames = segment.frame_count(),
        ?modifier,
        "capture"
    );

    // The clause borrows the handler; unless told otherwise, hold the frame
    // (and with it the handler) until the clause returns, even if the
    // continuation is dropped or resumed to completion in the meantime.
    let keep = (modifier != Modifier::NoManage).then_some(frame);
    let k: Box<dyn Continue<H::Answer>> = Box::new(Captured::<H> { fiber, segment });

    // SAFETY: the handler is owned by the frame, kept alive by `keep` or,
    // for no_manage clauses, by the contract of `Clauses::no_manage`.
    let answer = thunk(unsafe { &*handler }, request.exchange, k);
    drop(keep);
    settle(answer)
}

fn finish<H: Handler>(frame: Rc<Metaframe>, body: H::Body) -> Step<H::Answer> {
    let top = metastack::pop();
    if !Rc::ptr_eq(&top, &frame) {
        fatal(EffectError::Internal(format!(
            "body of {} returned while {} was installed above it",
            type_name::<H>(),
            top.handler_name()
        )));
    }
    tracing::trace!(label = frame.label(), handler = type_name::<H>(), "return");
    frame.retire();

    let Some(handler) = frame.handler().downcast_ref::<H>() else {
        fatal(EffectError::HandlerMismatch {
            expected: type_name::<H>(),
            found: frame.handler_name(),
        })
    };
    settle(handler.handle_return(body))
}
