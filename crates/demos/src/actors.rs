//! Message-passing actors on a round-robin scheduler
//!
//! Every actor has a typed [`Mailbox`]. Sending a message yields to the
//! scheduler; receiving from an empty mailbox parks the actor until someone
//! sends it mail. All actors of one scheduler run under installations of
//! the same shared handler, found by the scheduler's label.

use crate::output::{emit, emitln};
use oneshot_runtime::{
    Clause, Clauses, Command, Handler, Resumption, fresh_label, handle_with_labeled,
    invoke_command_with_label,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

struct Yield;
impl Command for Yield {
    type Out = ();
}

/// Queue a new actor; `start` installs it when the scheduler gets to it
struct Fork {
    waiting: Rc<Cell<bool>>,
    start: Box<dyn FnOnce()>,
}
impl Command for Fork {
    type Out = ();
}

/// Every live actor is waiting for mail that nobody will send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadlock {
    pub parked: usize,
}

impl fmt::Display for Deadlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deadlock detected ({} actors waiting for mail)",
            self.parked
        )
    }
}

impl std::error::Error for Deadlock {}

struct Parked {
    waiting: Rc<Cell<bool>>,
    resumption: Resumption<(), ()>,
}

pub struct Scheduler {
    label: i64,
    /// Waiting flag of the running actor
    current: RefCell<Rc<Cell<bool>>>,
    active: RefCell<Vec<Parked>>,
    deadlock: Cell<Option<Deadlock>>,
}

impl Scheduler {
    /// Run `main` as the first actor, then every actor it spawns, until all
    /// of them finish or all that remain wait for mail.
    pub fn run<T: 'static>(main: impl FnOnce(Mailbox<T>) + 'static) -> Result<(), Deadlock> {
        let scheduler = Rc::new(Scheduler {
            label: fresh_label(),
            current: RefCell::new(Rc::new(Cell::new(false))),
            active: RefCell::new(Vec::new()),
            deadlock: Cell::new(None),
        });
        let me = Mailbox::new(&scheduler);
        scheduler.start(me.waiting.clone(), move || main(me));
        match scheduler.deadlock.take() {
            Some(deadlock) => Err(deadlock),
            None => Ok(()),
        }
    }

    fn start(self: &Rc<Self>, waiting: Rc<Cell<bool>>, body: impl FnOnce() + 'static) {
        *self.current.borrow_mut() = waiting;
        handle_with_labeled(self.label, Rc::clone(self), body);
    }

    fn yield_now(&self) {
        invoke_command_with_label(self.label, Yield)
    }

    /// Hand control to the first actor that is not waiting for mail
    fn wake(&self) {
        let next = {
            let mut active = self.active.borrow_mut();
            active
                .iter()
                .position(|p| !p.waiting.get())
                .map(|i| active.remove(i))
        };
        match next {
            Some(Parked {
                waiting,
                resumption,
            }) => {
                *self.current.borrow_mut() = waiting;
                resumption.tail_resume(())
            }
            None => {
                let parked = std::mem::take(&mut *self.active.borrow_mut());
                tracing::warn!(parked = parked.len(), "actors deadlocked");
                self.deadlock.set(Some(Deadlock {
                    parked: parked.len(),
                }));
            }
        }
    }
}

impl Handler for Scheduler {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Yield>().command::<Fork>();
    }

    fn handle_return(&self, _: ()) {
        if !self.active.borrow().is_empty() {
            self.wake()
        }
    }
}

impl Clause<Yield> for Scheduler {
    fn handle_command(&self, _: Yield, r: Resumption<(), ()>) {
        let waiting = self.current.borrow().clone();
        self.active.borrow_mut().push(Parked {
            waiting,
            resumption: r,
        });
        self.wake()
    }
}

impl Clause<Fork> for Scheduler {
    fn handle_command(&self, Fork { waiting, start }: Fork, r: Resumption<(), ()>) {
        self.active.borrow_mut().push(Parked {
            waiting,
            resumption: Resumption::from_fn(move |()| start()),
        });
        r.tail_resume(())
    }
}

/// Address of an actor that accepts messages of type `T`
pub struct Mailbox<T> {
    scheduler: Rc<Scheduler>,
    inbox: Rc<RefCell<VecDeque<T>>>,
    waiting: Rc<Cell<bool>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Rc::clone(&self.scheduler),
            inbox: Rc::clone(&self.inbox),
            waiting: Rc::clone(&self.waiting),
        }
    }
}

impl<T: 'static> Mailbox<T> {
    fn new(scheduler: &Rc<Scheduler>) -> Self {
        Self {
            scheduler: Rc::clone(scheduler),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            waiting: Rc::new(Cell::new(false)),
        }
    }

    /// Deliver `msg` and give up control
    pub fn send(&self, msg: T) {
        self.waiting.set(false);
        self.inbox.borrow_mut().push_back(msg);
        self.scheduler.yield_now();
    }

    /// Take the oldest message, parking the calling actor until one arrives.
    /// Only the owner of the mailbox may call this.
    pub fn receive(&self) -> T {
        loop {
            if let Some(msg) = self.inbox.borrow_mut().pop_front() {
                return msg;
            }
            self.waiting.set(true);
            self.scheduler.yield_now();
        }
    }

    /// Give up control without waiting for mail
    pub fn yield_now(&self) {
        self.scheduler.yield_now();
    }

    /// Add an actor to the scheduler and return its address
    pub fn spawn<U: 'static>(&self, body: impl FnOnce(Mailbox<U>) + 'static) -> Mailbox<U> {
        let child = Mailbox::new(&self.scheduler);
        let address = child.clone();
        let scheduler = Rc::clone(&self.scheduler);
        let waiting = child.waiting.clone();
        let start = Box::new(move || scheduler.start(waiting, move || body(child)));
        invoke_command_with_label(
            self.scheduler.label,
            Fork {
                waiting: address.waiting.clone(),
                start,
            },
        );
        address
    }
}

type EchoMsg = (Mailbox<i32>, i32);

fn echo(me: Mailbox<EchoMsg>) {
    loop {
        let (sender, msg) = me.receive();
        if msg == -1 {
            emitln("no more echo");
            return;
        }
        sender.send(msg);
    }
}

fn starter(me: Mailbox<i32>, rounds: i32) {
    let echo = me.spawn(echo);
    for i in 0..rounds {
        emit(format!("sent: {}", i));
        echo.send((me.clone(), i));
        emitln(format!(", received: {}", me.receive()));
    }
    echo.send((me.clone(), -1));
}

pub fn run(rounds: i32) {
    if let Err(e) = Scheduler::run(move |me| starter(me, rounds)) {
        emitln(e.to_string());
    }
}
