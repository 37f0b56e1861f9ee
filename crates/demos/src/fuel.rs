//! Bounding and measuring a computation by the commands it invokes

use crate::output::emitln;
use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
use std::cell::Cell;

/// Use up this many units of fuel
pub struct Consume(pub i64);
impl Command for Consume {
    type Out = ();
}

/// Gives up once the computation needs more fuel than is left
pub struct BoundedExecution {
    fuel: Cell<i64>,
}

impl BoundedExecution {
    pub fn new(fuel: i64) -> Self {
        Self {
            fuel: Cell::new(fuel),
        }
    }
}

impl Handler for BoundedExecution {
    type Answer = Option<i64>;
    type Body = i64;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Consume>();
    }

    fn handle_return(&self, body: i64) -> Option<i64> {
        Some(body)
    }
}

impl Clause<Consume> for BoundedExecution {
    fn handle_command(&self, Consume(amount): Consume, r: Resumption<(), Option<i64>>) -> Option<i64> {
        if self.fuel.get() < amount {
            tracing::debug!(left = self.fuel.get(), amount, "out of fuel");
            return None;
        }
        self.fuel.set(self.fuel.get() - amount);
        r.tail_resume(())
    }
}

/// Runs to completion, counting the fuel used
#[derive(Default)]
pub struct MeasureFuel {
    used: Cell<i64>,
}

impl Handler for MeasureFuel {
    type Answer = (i64, i64);
    type Body = i64;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Consume>();
    }

    fn handle_return(&self, body: i64) -> (i64, i64) {
        (body, self.used.get())
    }
}

impl Clause<Consume> for MeasureFuel {
    fn handle_command(&self, Consume(amount): Consume, r: Resumption<(), (i64, i64)>) -> (i64, i64) {
        self.used.set(self.used.get() + amount);
        r.tail_resume(())
    }
}

pub fn fib(n: i64) -> i64 {
    invoke_command(Consume(1));
    match n {
        0 | 1 => n,
        _ => fib(n - 1) + fib(n - 2),
    }
}

pub fn run(budget: i64) {
    for n in [5, 10, 15, 20] {
        match handle(BoundedExecution::new(budget), move || fib(n)) {
            Some(v) => emitln(format!("fib({}) = {}", n, v)),
            None => emitln(format!(
                "fib({}) = (not enough fuel to complete this computation)",
                n
            )),
        }
    }
    for n in [5, 10, 15, 20] {
        let (v, steps) = handle(MeasureFuel::default(), move || fib(n));
        emitln(format!("fib({}) = {}\t(took {} steps to complete)", n, v, steps));
    }
}
