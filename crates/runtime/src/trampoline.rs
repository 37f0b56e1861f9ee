//! Tail-resume trampoline
//!
//! A clause that resumes with [`Resumption::tail_resume`] does not switch
//! to the continuation itself. The continuation goes into a per-thread
//! pending slot and the clause returns a placeholder answer. Whoever
//! receives that answer (the driver that dispatched to the clause) finds the
//! slot occupied, discards the placeholder and hands the continuation to
//! the [`run`] loop one level up. Long chains of tail resumes therefore run
//! as iterations of one loop instead of nested native calls.
//!
//! [`Resumption::tail_resume`]: crate::Resumption::tail_resume

use oneshot_core::error::{EffectError, fatal};
use std::any::{Any, type_name};
use std::cell::RefCell;

/// A suspended computation that eventually produces an answer of type `A`.
///
/// Stepping consumes it: it runs until it either completes with an answer
/// or hands over another continuation to run in its place.
pub trait Continue<A> {
    fn step(self: Box<Self>) -> Step<A>;
}

/// Outcome of one step of a continuation
pub enum Step<A> {
    Done(A),
    Tail(Box<dyn Continue<A>>),
}

thread_local! {
    /// Holds a `Box<dyn Continue<A>>` for the answer type of the clause that scheduled it
    static PENDING: RefCell<Option<Box<dyn Any>>> = const { RefCell::new(None) };
}

/// Park `k` in the pending slot. Only one continuation may wait at a time.
pub(crate) fn schedule<A: 'static>(k: Box<dyn Continue<A>>) {
    let occupied = PENDING.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return true;
        }
        let k: Box<dyn Any> = Box::new(k);
        *slot = Some(k);
        false
    });
    if occupied {
        fatal(EffectError::TailSlotOccupied);
    }
}

fn take_pending<A: 'static>() -> Option<Box<dyn Continue<A>>> {
    let pending = PENDING.with(|slot| slot.borrow_mut().take())?;
    match pending.downcast::<Box<dyn Continue<A>>>() {
        Ok(k) => Some(*k),
        Err(_) => fatal(EffectError::TailResumeMismatch {
            expected: type_name::<A>(),
        }),
    }
}

/// Turn a clause's answer into a step, picking up a pending tail resume.
///
/// When the slot is occupied, `answer` is the placeholder returned by
/// `tail_resume` and is dropped.
pub(crate) fn settle<A: 'static>(answer: A) -> Step<A> {
    match take_pending::<A>() {
        Some(k) => Step::Tail(k),
        None => Step::Done(answer),
    }
}

/// Drive steps until one produces an answer
pub fn run<A>(mut step: Step<A>) -> A {
    loop {
        match step {
            Step::Done(answer) => return answer,
            Step::Tail(k) => step = k.step(),
        }
    }
}

/// Whether a tail resume is waiting to be picked up on this thread
pub fn is_pending() -> bool {
    PENDING.with(|slot| slot.borrow().is_some())
}
