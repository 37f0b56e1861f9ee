//! Exceptions as a command that never returns
//!
//! `error()` invokes a command whose result type is uninhabited. The
//! handler abandons the computation and answers with a default value.

use crate::output::emitln;
use oneshot_runtime::{Clauses, Command, Handler, Never, NoResumeClause, handle, invoke_command};

struct Error;
impl Command for Error {
    type Out = Never;
}

/// Abandon the computation up to the nearest `WithDefault`
pub fn error<T>() -> T {
    match invoke_command(Error) {}
}

pub struct WithDefault<T>(pub T);

impl<T: Clone + 'static> Handler for WithDefault<T> {
    type Answer = T;
    type Body = T;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.no_resume::<Error>();
    }

    fn handle_return(&self, body: T) -> T {
        body
    }
}

impl<T: Clone + 'static> NoResumeClause<Error> for WithDefault<T> {
    fn handle_no_resume(&self, _: Error) -> T {
        self.0.clone()
    }
}

/// Product of `xs`, bailing out on the first zero
pub fn product(xs: Vec<i64>) -> i64 {
    handle(WithDefault(0), move || {
        let mut acc = 1;
        for x in xs {
            if x == 0 {
                error::<()>();
            }
            acc *= x;
        }
        acc
    })
}

pub fn run() {
    emitln(product(vec![1, 2, 3, 4, 5]).to_string());
    emitln(product(vec![1, 2, 0, 4, 5]).to_string());
}
