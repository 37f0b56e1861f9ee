//! Async/await on a randomised scheduler
//!
//! `spawn_async` queues a computation and hands back a [`Future`] for its
//! result. `yield_now` and `await_future` park the caller; the scheduler
//! then wakes a random parked computation. A computation that awaits an
//! unfinished future is parked on that future and rejoins the queue when
//! the future's computation returns.

use crate::output::emit;
use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

type Parked = Resumption<(), ()>;

thread_local! {
    static QUEUE: RefCell<Vec<Parked>> = const { RefCell::new(Vec::new()) };
    static RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// The eventual result of an asynchronous computation
pub struct Future<T> {
    value: RefCell<Option<T>>,
    awaiting: RefCell<Vec<Parked>>,
}

impl<T: Clone> Future<T> {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(None),
            awaiting: RefCell::new(Vec::new()),
        })
    }

    pub fn value(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.value.borrow().is_some()
    }
}

/// Anything a computation can be parked on
trait Waitable {
    fn park(&self, r: Parked);
}

impl<T> Waitable for Future<T> {
    fn park(&self, r: Parked) {
        self.awaiting.borrow_mut().push(r);
    }
}

struct Yield;
impl Command for Yield {
    type Out = ();
}

struct Await(Rc<dyn Waitable>);
impl Command for Await {
    type Out = ();
}

pub fn yield_now() {
    invoke_command(Yield)
}

pub fn await_future<T: Clone + 'static>(future: &Rc<Future<T>>) -> Option<T> {
    if !future.is_ready() {
        invoke_command(Await(Rc::clone(future) as Rc<dyn Waitable>));
    }
    future.value()
}

/// Queue `f` to run asynchronously
pub fn spawn_async<T: Clone + 'static>(f: impl FnOnce() -> T + 'static) -> Rc<Future<T>> {
    let future = Future::new();
    let fulfil = Rc::clone(&future);
    QUEUE.with(|q| {
        q.borrow_mut()
            .push(Resumption::from_fn(move |()| Scheduler::run_into(fulfil, f)))
    });
    future
}

struct Scheduler<T> {
    current: Rc<Future<T>>,
}

impl<T: Clone + 'static> Scheduler<T> {
    /// Run `f` as the main computation on a scheduler seeded with `seed`
    fn run(seed: u64, f: impl FnOnce() -> T + 'static) -> Option<T> {
        RNG.with(|rng| *rng.borrow_mut() = Some(StdRng::seed_from_u64(seed)));
        let future = Future::new();
        Self::run_into(Rc::clone(&future), f);
        future.value()
    }

    fn run_into(future: Rc<Future<T>>, f: impl FnOnce() -> T + 'static) {
        handle(Scheduler { current: future }, f)
    }
}

/// Resume a random parked computation, if there is one
fn wake_random() {
    let next = QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        if q.is_empty() {
            return None;
        }
        let idx = RNG.with(|rng| match rng.borrow_mut().as_mut() {
            Some(rng) => rng.gen_range(0..q.len()),
            None => 0,
        });
        Some(q.remove(idx))
    });
    if let Some(r) = next {
        r.resume(());
    }
}

impl<T: Clone + 'static> Handler for Scheduler<T> {
    type Answer = ();
    type Body = T;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Yield>().command::<Await>();
    }

    fn handle_return(&self, value: T) {
        let woken: Vec<Parked> = self.current.awaiting.borrow_mut().drain(..).collect();
        QUEUE.with(|q| q.borrow_mut().extend(woken));
        *self.current.value.borrow_mut() = Some(value);
        wake_random();
    }
}

impl<T: Clone + 'static> Clause<Yield> for Scheduler<T> {
    fn handle_command(&self, _: Yield, r: Parked) {
        QUEUE.with(|q| q.borrow_mut().push(r));
        wake_random();
    }
}

impl<T: Clone + 'static> Clause<Await> for Scheduler<T> {
    fn handle_command(&self, Await(future): Await, r: Parked) {
        future.park(r);
        wake_random();
    }
}

fn worker() -> i32 {
    for _ in 0..30 {
        emit(".");
        yield_now();
    }
    100
}

fn starter() {
    let future = spawn_async(worker);
    emit("[worker started]");
    for _ in 0..5 {
        if !future.is_ready() {
            emit("\n[no value yet]");
            yield_now();
        }
    }
    emit("\n[I'd better wait]");
    match await_future(&future) {
        Some(v) => emit(format!("\n[worker returned {}]", v)),
        None => emit("\n[worker never returned]"),
    }
}

pub fn run(seed: u64) {
    Scheduler::run(seed, starter);
    emit("\n");
}
