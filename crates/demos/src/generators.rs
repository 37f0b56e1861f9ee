//! Generators
//!
//! A generator body runs under its own labelled handler until its first
//! `yield`. The handler answers with the yielded value and the resumption
//! that produces the next one, so a generator is just an `Iterator` over
//! that state.

use crate::output::emitln;
use oneshot_runtime::{
    Clause, Clauses, Command, Handler, Resumption, fresh_label, handle_labeled,
    static_invoke_command_with_label,
};
use std::marker::PhantomData;

struct Yield<T>(T);

impl<T: 'static> Command for Yield<T> {
    type Out = ();
}

/// A produced value and the rest of the generator
struct GenState<T: 'static> {
    value: T,
    rest: Resumption<(), Option<GenState<T>>>,
}

struct GeneratorHandler<T>(PhantomData<fn(T)>);

impl<T: 'static> Handler for GeneratorHandler<T> {
    type Answer = Option<GenState<T>>;
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        // SAFETY: the clause does not touch the handler
        unsafe {
            clauses.no_manage::<Yield<T>>();
        }
    }

    fn handle_return(&self, _: ()) -> Option<GenState<T>> {
        None
    }
}

impl<T: 'static> Clause<Yield<T>> for GeneratorHandler<T> {
    fn handle_command(
        &self,
        Yield(value): Yield<T>,
        rest: Resumption<(), Option<GenState<T>>>,
    ) -> Option<GenState<T>> {
        Some(GenState { value, rest })
    }
}

pub struct Generator<T: 'static> {
    state: Option<GenState<T>>,
}

impl<T: 'static> Generator<T> {
    /// Start `body`, which produces values by calling the function it is given
    pub fn new(body: impl FnOnce(&dyn Fn(T)) + 'static) -> Self {
        let label = fresh_label();
        let state = handle_labeled(label, GeneratorHandler::<T>(PhantomData), move || {
            body(&|x: T| {
                static_invoke_command_with_label::<GeneratorHandler<T>, Yield<T>>(label, Yield(x))
            })
        });
        Self { state }
    }
}

impl<T: 'static> Iterator for Generator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let GenState { value, rest } = self.state.take()?;
        self.state = rest.resume(());
        Some(value)
    }
}

pub fn run() {
    let naturals = Generator::new(|yield_| {
        let mut i = 1;
        loop {
            yield_(i);
            i += 1;
        }
    });

    let peaks = Generator::new(|yield_| {
        for peak in ["Everest", "K2", "Kangchenjunga", "Lhotse", "Makalu"] {
            yield_(peak);
        }
    });

    for (n, peak) in naturals.zip(peaks) {
        emitln(format!("{} {}", n, peak));
    }
}
