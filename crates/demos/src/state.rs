//! Two ways to give a computation mutable state
//!
//! 1. Stateful handler: the state is a field of the handler, and the
//!    clauses read and write it before resuming in tail position.
//! 2. State as a function: the computation is interpreted as a function
//!    from the initial state to its answer, and each command composes such
//!    functions. No handler field changes.

use crate::output::{emit, emitln};
use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
use std::cell::Cell;
use std::marker::PhantomData;

pub struct Get;
impl Command for Get {
    type Out = i64;
}

pub struct Put(pub i64);
impl Command for Put {
    type Out = ();
}

pub fn get() -> i64 {
    invoke_command(Get)
}

pub fn put(v: i64) {
    invoke_command(Put(v))
}

fn squares() {
    emit(format!("{} ", get()));
    put(get() + 1);
    emit(format!("{} ", get()));
    put(get() * get());
    emitln(get().to_string());
}

fn squares_ok() -> &'static str {
    squares();
    "ok"
}

pub struct Stateful<A> {
    state: Cell<i64>,
    _answer: PhantomData<fn() -> A>,
}

impl<A> Stateful<A> {
    pub fn new(initial: i64) -> Self {
        Self {
            state: Cell::new(initial),
            _answer: PhantomData,
        }
    }
}

impl<A: Default + 'static> Handler for Stateful<A> {
    type Answer = A;
    type Body = A;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Get>().command::<Put>();
    }

    fn handle_return(&self, body: A) -> A {
        body
    }
}

impl<A: Default + 'static> Clause<Get> for Stateful<A> {
    fn handle_command(&self, _: Get, r: Resumption<i64, A>) -> A {
        r.tail_resume(self.state.get())
    }
}

impl<A: Default + 'static> Clause<Put> for Stateful<A> {
    fn handle_command(&self, Put(v): Put, r: Resumption<(), A>) -> A {
        self.state.set(v);
        r.tail_resume(())
    }
}

/// A computation waiting for its initial state
pub type StateFn<A> = Box<dyn FnOnce(i64) -> A>;

pub struct Lambda<A>(PhantomData<fn() -> A>);

impl<A> Default for Lambda<A> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<A: 'static> Handler for Lambda<A> {
    type Answer = StateFn<A>;
    type Body = A;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Get>().command::<Put>();
    }

    fn handle_return(&self, body: A) -> StateFn<A> {
        Box::new(move |_| body)
    }
}

impl<A: 'static> Clause<Get> for Lambda<A> {
    fn handle_command(&self, _: Get, r: Resumption<i64, StateFn<A>>) -> StateFn<A> {
        Box::new(move |s| r.resume(s)(s))
    }
}

impl<A: 'static> Clause<Put> for Lambda<A> {
    fn handle_command(&self, Put(v): Put, r: Resumption<(), StateFn<A>>) -> StateFn<A> {
        Box::new(move |_| r.resume(())(v))
    }
}

pub fn run() {
    tracing::debug!("stateful handler");
    handle(Stateful::<()>::new(100), squares);
    emitln(handle(Stateful::<&'static str>::new(100), squares_ok));

    tracing::debug!("state as a function");
    handle(Lambda::<()>::default(), squares)(100);
    emitln(handle(Lambda::<&'static str>::default(), squares_ok)(100));
}
