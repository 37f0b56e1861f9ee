//! Choosing where results are logged by choosing the handler
//!
//! The computation only announces that it is doing work. Which stream the
//! final value is written to is up to the handler it runs under.

use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
use std::cell::RefCell;
use std::fmt::Display;
use std::marker::PhantomData;
use std::rc::Rc;

struct Log;
impl Command for Log {
    type Out = ();
}

/// Separate output streams a logger can write to
#[derive(Debug, Clone, Default)]
pub struct Streams {
    pub stdout: Rc<RefCell<String>>,
    pub stderr: Rc<RefCell<String>>,
}

/// Writes the result of the computation to one stream
pub struct Logger<T> {
    sink: Rc<RefCell<String>>,
    _value: PhantomData<fn(T)>,
}

impl<T> Logger<T> {
    pub fn new(sink: Rc<RefCell<String>>) -> Self {
        Self {
            sink,
            _value: PhantomData,
        }
    }
}

impl<T: Display + 'static> Handler for Logger<T> {
    type Answer = Option<T>;
    type Body = T;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Log>();
    }

    fn handle_return(&self, body: T) -> Option<T> {
        let mut sink = self.sink.borrow_mut();
        sink.push_str(&body.to_string());
        sink.push('\n');
        Some(body)
    }
}

impl<T: Display + 'static> Clause<Log> for Logger<T> {
    fn handle_command(&self, _: Log, r: Resumption<(), Option<T>>) -> Option<T> {
        r.tail_resume(())
    }
}

pub fn fib(n: i64) -> i64 {
    invoke_command(Log);
    match n {
        0 | 1 => n,
        _ => fib(n - 1) + fib(n - 2),
    }
}

pub fn run() -> Streams {
    let streams = Streams::default();
    for (n, sink) in [
        (5, &streams.stdout),
        (10, &streams.stderr),
        (15, &streams.stdout),
        (20, &streams.stderr),
    ] {
        handle(Logger::new(Rc::clone(sink)), move || fib(n));
    }
    streams
}
