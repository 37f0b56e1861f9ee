//! Fibers: stackful coroutines that handled computations run on
//!
//! Every `handle` call runs its body on a fresh [`Fiber`]. A body that
//! invokes a command parks its fiber with [`suspend`], passing a
//! [`Suspend`] request up to whoever resumed the fiber.
//!
//! ## Forwarding
//!
//! Corosensei coroutines are asymmetric: suspending always returns control
//! to the resumer. The resumer of a body's fiber is the driver of that
//! body's metaframe, which itself runs on the fiber of the frame below. A
//! driver that receives a request for some other frame forwards it by
//! suspending its own fiber, so the request travels down the chain of
//! drivers until it reaches the frame that will handle it:
//!
//! ```text
//!   native ─► drive(A) ─► fiber A ─► drive(B) ─► fiber B ─► body
//!                 ▲                      │ forward              │ suspend(req for A)
//!                 └──────────────────────┴──────────────────────┘
//! ```
//!
//! Resuming retraces the path: each forwarding driver wakes up and resumes
//! the fiber above it.
//!
//! ## Stacks
//!
//! Stacks come from a per-thread pool and go back to it when a fiber
//! finishes. A fiber dropped while suspended is unwound by corosensei
//! (destructors on its stack run), and its stack is freed.

use crate::config::config;
use crate::error::{EffectError, fatal};
use crate::metastack::Metaframe;
use crate::stats::{self, Counter};
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};
use std::cell::{Cell, RefCell};
use std::ptr;

/// A request from a suspended body to the driver of `frame`.
///
/// `exchange` points at the invoker's command/result slot, which lives on
/// the suspended fiber's stack and stays valid while that fiber is parked.
#[derive(Debug, Clone, Copy)]
pub struct Suspend {
    pub frame: *const Metaframe,
    pub entry: usize,
    pub exchange: *mut (),
}

impl Suspend {
    /// Whether this request is addressed to `frame`
    #[inline]
    pub fn targets(&self, frame: &Metaframe) -> bool {
        ptr::eq(self.frame, frame)
    }
}

/// Outcome of resuming a fiber
pub enum Resumed<R> {
    Suspended(Suspend),
    Finished(R),
}

type FiberYielder = Yielder<(), Suspend>;

thread_local! {
    /// Yielder of the fiber currently running on this thread (null on the native stack)
    static CURRENT: Cell<*const FiberYielder> = const { Cell::new(ptr::null()) };

    static STACK_POOL: RefCell<Vec<DefaultStack>> = const { RefCell::new(Vec::new()) };
}

/// A suspendable computation producing `R`
pub struct Fiber<R: 'static> {
    co: Option<Coroutine<(), Suspend, R, DefaultStack>>,
}

impl<R: 'static> Fiber<R> {
    /// Create a fiber that will run `body` when first resumed.
    pub fn new(body: impl FnOnce() -> R + 'static) -> Result<Self, EffectError> {
        let stack = acquire_stack()?;
        let co = Coroutine::with_stack(stack, move |yielder: &FiberYielder, ()| {
            CURRENT.with(|c| c.set(yielder as *const FiberYielder));
            body()
        });
        stats::bump(Counter::FibersCreated);
        Ok(Self { co: Some(co) })
    }

    /// Run the fiber until it suspends or finishes.
    pub fn resume(&mut self) -> Resumed<R> {
        let Some(co) = self.co.as_mut() else {
            fatal(EffectError::Internal("resumed a finished fiber".to_string()))
        };
        let result = {
            let _restore = RestoreCurrent(CURRENT.with(|c| c.get()));
            co.resume(())
        };
        match result {
            CoroutineResult::Yield(request) => Resumed::Suspended(request),
            CoroutineResult::Return(value) => {
                if let Some(co) = self.co.take() {
                    release_stack(co.into_stack());
                }
                Resumed::Finished(value)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.co.is_none()
    }
}

/// Restores the caller's yielder once a resumed fiber hands control back,
/// including when it unwinds.
struct RestoreCurrent(*const FiberYielder);

impl Drop for RestoreCurrent {
    fn drop(&mut self) {
        let saved = self.0;
        let _ = CURRENT.try_with(|c| c.set(saved));
    }
}

/// Park the running fiber, handing `request` to its resumer.
///
/// Returns once the fiber is resumed. `command` names the command on whose
/// behalf the fiber suspends, for the diagnostic when no fiber is running.
pub fn suspend(request: Suspend, command: &'static str) {
    let yielder = CURRENT.with(|c| c.get());
    if yielder.is_null() {
        fatal(EffectError::NotInFiber { command });
    }
    // SAFETY: CURRENT is set by the running fiber to its own yielder, which
    // lives on that fiber's stack for as long as the fiber exists.
    let yielder = unsafe { &*yielder };
    yielder.suspend(request);
    CURRENT.with(|c| c.set(yielder as *const FiberYielder));
}

/// Whether code is currently running on a fiber (as opposed to the native stack)
pub fn in_fiber() -> bool {
    !CURRENT.with(|c| c.get()).is_null()
}

fn acquire_stack() -> Result<DefaultStack, EffectError> {
    if let Some(stack) = STACK_POOL.with(|pool| pool.borrow_mut().pop()) {
        stats::bump(Counter::StacksReused);
        return Ok(stack);
    }
    Ok(DefaultStack::new(config().stack_size)?)
}

fn release_stack(stack: DefaultStack) {
    let _ = STACK_POOL.try_with(|pool| {
        let mut pool = pool.borrow_mut();
        if pool.len() < config().pool_capacity {
            pool.push(stack);
        }
    });
}

/// Number of stacks waiting in this thread's pool
pub fn pooled_stacks() -> usize {
    STACK_POOL.with(|pool| pool.borrow().len())
}
