//! Tracked assignments that can be rolled back
//!
//! Every tracked assignment is a command. Its clause resumes the rest of
//! the computation and, if that ends in a rollback, restores the old value
//! on the way out.

use crate::output::emitln;
use oneshot_runtime::{Clause, Clauses, Command, Handler, Resumption, handle, invoke_command};
use std::cell::Cell;
use std::rc::Rc;

trait Undo {
    fn undo(&self);
}

struct Assignment<T: Copy> {
    var: Rc<Cell<T>>,
    old: T,
}

impl<T: Copy> Undo for Assignment<T> {
    fn undo(&self) {
        self.var.set(self.old);
    }
}

struct Assign(Box<dyn Undo>);
impl Command for Assign {
    type Out = ();
}

struct Rollback;
impl Command for Rollback {
    type Out = ();
}

/// Assign `val` to `var`, undoably
pub fn track<T: Copy + 'static>(var: &Rc<Cell<T>>, val: T) {
    let old = var.replace(val);
    invoke_command(Assign(Box::new(Assignment {
        var: Rc::clone(var),
        old,
    })));
}

/// Undo every tracked assignment and abandon the computation
pub fn rollback() {
    invoke_command(Rollback);
}

/// Answers whether the computation finished without rolling back
pub struct RollbackState;

impl Handler for RollbackState {
    type Answer = bool;
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Rollback>().command::<Assign>();
    }

    fn handle_return(&self, _: ()) -> bool {
        true
    }
}

impl Clause<Rollback> for RollbackState {
    fn handle_command(&self, _: Rollback, _: Resumption<(), bool>) -> bool {
        false
    }
}

impl Clause<Assign> for RollbackState {
    fn handle_command(&self, Assign(assignment): Assign, r: Resumption<(), bool>) -> bool {
        let committed = r.resume(());
        if !committed {
            assignment.undo();
        }
        committed
    }
}

pub fn run() {
    let x = Rc::new(Cell::new(1));
    let c = Rc::new(Cell::new('a'));

    let show = {
        let (x, c) = (Rc::clone(&x), Rc::clone(&c));
        move || emitln(format!("x = {}, c = {}", x.get(), c.get()))
    };

    let committed = handle(RollbackState, {
        let show = show.clone();
        move || {
            show();
            track(&x, 2);
            track(&c, 'b');
            show();
            track(&x, 3);
            track(&c, 'c');
            show();
            emitln("rolling back!");
            rollback();
            track(&x, 4);
            track(&c, 'd');
        }
    });
    tracing::debug!(committed, "rollback state finished");
    show();
}
