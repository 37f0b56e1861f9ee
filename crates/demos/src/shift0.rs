//! The shift0/reset control operators
//!
//! `reset` installs a handler; `shift0` hands the continuation up to the
//! nearest `reset` as an ordinary function.

use crate::output::emitln;
use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
use std::marker::PhantomData;

type Body<A, H> = Box<dyn FnOnce(Resumption<H, A>) -> A>;

struct Shift0<A: 'static, H: 'static>(Body<A, H>);

impl<A: 'static, H: 'static> Command for Shift0<A, H> {
    type Out = H;
}

struct Reset<A, H>(PhantomData<fn(H) -> A>);

impl<A: 'static, H: 'static> Handler for Reset<A, H> {
    type Answer = A;
    type Body = A;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Shift0<A, H>>();
    }

    fn handle_return(&self, body: A) -> A {
        body
    }
}

impl<A: 'static, H: 'static> Clause<Shift0<A, H>> for Reset<A, H> {
    fn handle_command(&self, Shift0(e): Shift0<A, H>, r: Resumption<H, A>) -> A {
        e(r)
    }
}

/// Delimit the continuations captured by `shift0::<A, H>`
pub fn reset<A: 'static, H: 'static>(body: impl FnOnce() -> A + 'static) -> A {
    handle(Reset::<A, H>(PhantomData), body)
}

/// Capture the continuation up to the nearest `reset` and pass it to `e`
pub fn shift0<A: 'static, H: 'static>(e: impl FnOnce(Box<dyn FnOnce(H) -> A>) -> A + 'static) -> H {
    invoke_command(Shift0::<A, H>(Box::new(move |r: Resumption<H, A>| {
        e(Box::new(move |hole: H| r.resume(hole)))
    })))
}

pub fn run() {
    let answer = reset::<String, i32>(|| {
        format!(
            "2 + 2 = {}",
            2 + shift0::<String, i32>(|k| format!("It is not true that {}", k(3)))
        )
    });
    emitln(answer);
}
