//! Handlers and their command clauses
//!
//! A handler is an ordinary type implementing [`Handler`]: it names the
//! answer type of the computations it handles, the result type of their
//! bodies, a return clause, and the commands it handles. Each declared
//! command is backed by one clause trait implementation:
//!
//! | Declared with          | Implement            | Clause receives           |
//! |------------------------|----------------------|---------------------------|
//! | `command::<C>()`       | [`Clause<C>`]        | command and resumption    |
//! | `no_manage::<C>()`     | [`Clause<C>`]        | command and resumption    |
//! | `no_resume::<C>()`     | [`NoResumeClause<C>`]| command only              |
//! | `plain::<C>()`         | [`PlainClause<C>`]   | command only, returns `C::Out` |
//!
//! ```
//! use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
//! use std::cell::Cell;
//!
//! struct Tick;
//! impl Command for Tick {
//!     type Out = u32;
//! }
//!
//! #[derive(Default)]
//! struct Counter {
//!     ticks: Cell<u32>,
//! }
//!
//! impl Handler for Counter {
//!     type Answer = (u32, u32);
//!     type Body = u32;
//!
//!     fn declare(clauses: &mut Clauses<Self>) {
//!         clauses.command::<Tick>();
//!     }
//!
//!     fn handle_return(&self, body: u32) -> (u32, u32) {
//!         (body, self.ticks.get())
//!     }
//! }
//!
//! impl Clause<Tick> for Counter {
//!     fn handle_command(&self, _: Tick, r: Resumption<u32, (u32, u32)>) -> (u32, u32) {
//!         self.ticks.set(self.ticks.get() + 1);
//!         r.resume(self.ticks.get())
//!     }
//! }
//!
//! let answer = handle(Counter::default(), || invoke_command(Tick) + invoke_command(Tick));
//! assert_eq!(answer, (3, 2));
//! ```

use crate::command::Command;
use crate::dispatch::{PlainThunk, ResumeThunk, no_resume_thunk, plain_thunk, resume_thunk};
use crate::resumption::Resumption;
use oneshot_core::error::{EffectError, fatal};
use oneshot_core::metastack::{ClauseEntry, ClauseTable, Modifier};
use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

/// A handler for a set of commands
pub trait Handler: Sized + 'static {
    /// What a handled computation evaluates to
    type Answer: 'static;
    /// What the handled body returns
    type Body: 'static;

    /// Register the commands this handler handles
    fn declare(clauses: &mut Clauses<Self>);

    /// Turn the body's result into the answer. Runs once, when the body
    /// returns normally.
    fn handle_return(&self, body: Self::Body) -> Self::Answer;
}

/// Clause for a command that is handled with access to the continuation
pub trait Clause<C: Command>: Handler {
    fn handle_command(&self, command: C, r: Resumption<C::Out, Self::Answer>) -> Self::Answer;
}

/// Clause for a command that behaves like a function call.
///
/// The result goes straight back to the invoker. No continuation is
/// captured and no fiber switch happens; while the clause runs, this
/// handler and everything installed above it are hidden from dispatch.
pub trait PlainClause<C: Command>: Handler {
    fn handle_plain(&self, command: C) -> C::Out;
}

/// Clause for a command that abandons the rest of the computation.
///
/// The continuation is discarded before the clause runs, and the clause's
/// result becomes the answer of the handled computation.
pub trait NoResumeClause<C: Command>: Handler {
    fn handle_no_resume(&self, command: C) -> Self::Answer;
}

/// The declaration builder passed to [`Handler::declare`]
pub struct Clauses<H> {
    entries: Vec<ClauseEntry>,
    _handler: PhantomData<fn() -> H>,
}

impl<H: Handler> Clauses<H> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            _handler: PhantomData,
        }
    }

    /// Handle `C` with [`Clause::handle_command`]
    pub fn command<C: Command>(&mut self) -> &mut Self
    where
        H: Clause<C>,
    {
        let thunk: ResumeThunk<H> = resume_thunk::<H, C>;
        self.add::<C>(Modifier::Resumptive, Box::new(thunk))
    }

    /// Handle `C` with [`PlainClause::handle_plain`]
    pub fn plain<C: Command>(&mut self) -> &mut Self
    where
        H: PlainClause<C>,
    {
        let thunk: PlainThunk = plain_thunk::<H, C>;
        self.add::<C>(Modifier::Plain, Box::new(thunk))
    }

    /// Handle `C` with [`NoResumeClause::handle_no_resume`]
    pub fn no_resume<C: Command>(&mut self) -> &mut Self
    where
        H: NoResumeClause<C>,
    {
        let thunk: ResumeThunk<H> = no_resume_thunk::<H, C>;
        self.add::<C>(Modifier::NoResume, Box::new(thunk))
    }

    /// Handle `C` with [`Clause::handle_command`], without keeping the
    /// handler alive while the clause runs.
    ///
    /// # Safety
    ///
    /// The clause's `&self` is only kept alive by the installation. If the
    /// clause drops its resumption (or the last other owner of the handler
    /// goes away) while it still uses `self`, that is a use after free. Use
    /// this only for handlers owned elsewhere through `handle_with`, or whose
    /// clauses do not touch `self` after giving up the resumption.
    pub unsafe fn no_manage<C: Command>(&mut self) -> &mut Self
    where
        H: Clause<C>,
    {
        let thunk: ResumeThunk<H> = resume_thunk::<H, C>;
        self.add::<C>(Modifier::NoManage, Box::new(thunk))
    }

    fn add<C: Command>(&mut self, modifier: Modifier, thunk: Box<dyn Any>) -> &mut Self {
        let command = TypeId::of::<C>();
        if self.entries.iter().any(|e| e.command == command) {
            fatal(EffectError::DuplicateClause {
                handler: type_name::<H>(),
                command: type_name::<C>(),
            });
        }
        self.entries.push(ClauseEntry {
            command,
            command_name: type_name::<C>(),
            modifier,
            thunk,
        });
        self
    }
}

thread_local! {
    static TABLES: RefCell<HashMap<TypeId, Rc<ClauseTable>>> = RefCell::new(HashMap::new());
}

/// The clause table of `H`, declared on first use on this thread
pub(crate) fn clause_table<H: Handler>() -> Rc<ClauseTable> {
    let id = TypeId::of::<H>();
    if let Some(table) = TABLES.with(|tables| tables.borrow().get(&id).cloned()) {
        return table;
    }

    // `declare` is user code and may install handlers of its own
    let mut clauses = Clauses::<H>::new();
    H::declare(&mut clauses);
    let table = Rc::new(ClauseTable::new(clauses.entries));
    tracing::debug!(
        handler = type_name::<H>(),
        clauses = table.entries().len(),
        "declared handler"
    );
    TABLES.with(|tables| tables.borrow_mut().insert(id, Rc::clone(&table)));
    table
}
