//! Lightweight threads with a round-robin scheduler
//!
//! `yield_now` parks the running thread at the back of the queue; `fork`
//! parks it and queues the new thread behind it. Each thread runs under its
//! own `Scheduler` installation.

use crate::output::emit;
use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
use std::cell::RefCell;
use std::collections::VecDeque;

struct Yield;
impl Command for Yield {
    type Out = ();
}

struct Fork(Box<dyn FnOnce()>);
impl Command for Fork {
    type Out = ();
}

pub fn yield_now() {
    invoke_command(Yield)
}

pub fn fork(thread: impl FnOnce() + 'static) {
    invoke_command(Fork(Box::new(thread)))
}

thread_local! {
    static QUEUE: RefCell<VecDeque<Resumption<(), ()>>> = const { RefCell::new(VecDeque::new()) };
}

fn enqueue(r: Resumption<(), ()>) {
    QUEUE.with(|q| q.borrow_mut().push_back(r));
}

struct Scheduler;

impl Scheduler {
    /// Run `main` and every thread it forks until all of them finish
    fn start(main: impl FnOnce() + 'static) {
        Self::spawn(main);
        while let Some(r) = QUEUE.with(|q| q.borrow_mut().pop_front()) {
            r.resume(());
        }
    }

    fn spawn(thread: impl FnOnce() + 'static) {
        handle(Scheduler, thread);
    }
}

impl Handler for Scheduler {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Yield>().command::<Fork>();
    }

    fn handle_return(&self, _: ()) {}
}

impl Clause<Yield> for Scheduler {
    fn handle_command(&self, _: Yield, r: Resumption<(), ()>) {
        enqueue(r);
    }
}

impl Clause<Fork> for Scheduler {
    fn handle_command(&self, Fork(thread): Fork, r: Resumption<(), ()>) {
        enqueue(r);
        enqueue(Resumption::from_fn(move |()| Scheduler::spawn(thread)));
    }
}

fn worker(k: usize, steps: usize) {
    for _ in 0..steps {
        emit(k.to_string());
        yield_now();
    }
}

pub fn run(workers: usize, steps: usize) {
    Scheduler::start(move || {
        for k in 0..workers {
            fork(move || worker(k, steps));
        }
    });
    emit("\n");
}
