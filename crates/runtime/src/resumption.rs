//! Resumptions: one-shot continuations handed to command clauses
//!
//! A [`Resumption<Out, A>`] stands for the rest of a handled computation
//! from the point where it invoked a command. Resuming it delivers the
//! command's result (`Out`) to the invoker and runs the computation until
//! its handler produces an answer (`A`). It can be used once:
//!
//! - [`resume`](Resumption::resume) runs the continuation now and returns its answer
//! - [`tail_resume`](Resumption::tail_resume) leaves it to the trampoline
//! - dropping it discards the continuation, unwinding the suspended fibers
//! - [`release`](Resumption::release) turns it into a raw handle that owns
//!   the continuation until [`from_raw`](Resumption::from_raw) takes it back
//!
//! A resumption can also be built from a closure ([`Resumption::from_fn`]),
//! so code that schedules resumptions can mix captured continuations with
//! plain functions.

use crate::trampoline::{self, Continue, Step, run, settle};
use oneshot_core::error::{EffectError, fatal};
use oneshot_core::stats::{self, Counter};
use std::cell::UnsafeCell;
use std::fmt;
use std::ptr::{self, NonNull};

/// A one-shot continuation expecting an `Out` and answering with an `A`
pub struct Resumption<Out: 'static, A: 'static> {
    k: Option<Box<dyn Continue<A>>>,
    /// Where the invoker picks up its result. Owned by `k`.
    slot: *mut Option<Out>,
}

impl<Out: 'static, A: 'static> Resumption<Out, A> {
    pub(crate) fn captured(k: Box<dyn Continue<A>>, slot: *mut Option<Out>) -> Self {
        Self { k: Some(k), slot }
    }

    /// Resume the continuation with `out`, returning the answer it produces.
    ///
    /// Resuming an empty resumption is fatal.
    pub fn resume(mut self, out: Out) -> A {
        let k = self.arm(out);
        stats::bump(Counter::Resumes);
        run(k.step())
    }

    /// Resume in tail position.
    ///
    /// The continuation runs once the calling clause has returned, on the
    /// trampoline of the driver that called the clause. The clause must
    /// return the placeholder this gives back without doing anything else.
    pub fn tail_resume(mut self, out: Out) -> A
    where
        A: Default,
    {
        let k = self.arm(out);
        stats::bump(Counter::TailResumes);
        trampoline::schedule(k);
        A::default()
    }

    fn arm(&mut self, out: Out) -> Box<dyn Continue<A>> {
        let Some(k) = self.k.take() else {
            fatal(EffectError::ResumeEmpty)
        };
        // SAFETY: the slot lives in storage owned by `k` (the invoker's
        // suspended stack, or the closure adapter), which is alive here.
        unsafe { *self.slot = Some(out) };
        k
    }

    /// Whether the resumption still holds a continuation
    pub fn is_valid(&self) -> bool {
        self.k.is_some()
    }

    /// Move the continuation out, leaving an empty resumption in its place
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Give up ownership of the continuation without discarding it.
    ///
    /// The returned handle must be passed to [`Resumption::from_raw`]
    /// exactly once, or the continuation leaks.
    pub fn release(self) -> RawResumption<Out, A> {
        RawResumption {
            ptr: NonNull::from(Box::leak(Box::new(self))),
        }
    }

    /// Take back a continuation given up with [`Resumption::release`].
    ///
    /// # Safety
    ///
    /// `raw` must come from `release` and must not have been passed to
    /// `from_raw` before.
    pub unsafe fn from_raw(raw: RawResumption<Out, A>) -> Self {
        // SAFETY: by contract `raw.ptr` is the unique leaked box
        *unsafe { Box::from_raw(raw.ptr.as_ptr()) }
    }

    /// A resumption that calls `f` with the value it is resumed with.
    pub fn from_fn(f: impl FnOnce(Out) -> A + 'static) -> Self {
        let input = Box::new(UnsafeCell::new(None));
        let slot = input.get();
        Self::captured(Box::new(FnContinuation { input, f }), slot)
    }
}

impl<Out: 'static, A: 'static> Default for Resumption<Out, A> {
    fn default() -> Self {
        Self {
            k: None,
            slot: ptr::null_mut(),
        }
    }
}

impl<Out: 'static, A: 'static> Drop for Resumption<Out, A> {
    fn drop(&mut self) {
        if let Some(k) = self.k.take() {
            stats::bump(Counter::Discarded);
            tracing::trace!(answer = std::any::type_name::<A>(), "discarding continuation");
            drop(k);
        }
    }
}

impl<Out: 'static, A: 'static> fmt::Debug for Resumption<Out, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resumption")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// A released [`Resumption`]: a plain copyable handle that owns nothing by
/// itself. It can travel inside commands and handler state, and becomes a
/// resumption again through [`Resumption::from_raw`].
pub struct RawResumption<Out: 'static, A: 'static> {
    ptr: NonNull<Resumption<Out, A>>,
}

impl<Out: 'static, A: 'static> Clone for RawResumption<Out, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Out: 'static, A: 'static> Copy for RawResumption<Out, A> {}

impl<Out: 'static, A: 'static> fmt::Debug for RawResumption<Out, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawResumption({:p})", self.ptr)
    }
}

struct FnContinuation<Out, F> {
    input: Box<UnsafeCell<Option<Out>>>,
    f: F,
}

impl<Out, A: 'static, F: FnOnce(Out) -> A> Continue<A> for FnContinuation<Out, F> {
    fn step(self: Box<Self>) -> Step<A> {
        let FnContinuation { input, f } = *self;
        let input = *input;
        let Some(out) = input.into_inner() else {
            fatal(EffectError::Internal(
                "function resumption stepped without a value".to_string(),
            ))
        };
        settle(f(out))
    }
}
