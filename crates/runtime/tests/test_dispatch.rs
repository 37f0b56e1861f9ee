//! Integration tests for command dispatch
//!
//! Type-based, label-based, reference-based and static dispatch, and
//! computations moved between handlers while suspended.

use oneshot_runtime::{
    Clause, Clauses, Command, Handler, HandlerRef, Never, RawResumption, Resumption,
    find_handler, find_handler_by_label, handle, handle_labeled, handle_ref, handle_with,
    handle_with_labeled, handle_with_ref, invoke_command, invoke_command_at,
    invoke_command_with_label, static_invoke_command, static_invoke_command_at,
    static_invoke_command_with_label,
};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

thread_local! {
    static OUT: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn emit(line: impl Into<String>) {
    OUT.with(|out| out.borrow_mut().push(line.into()));
}

fn transcript() -> Vec<String> {
    OUT.with(|out| std::mem::take(&mut *out.borrow_mut()))
}

// ----------------------------------------------------------------------
// State
// ----------------------------------------------------------------------

struct Get;
impl Command for Get {
    type Out = i64;
}

struct Put(i64);
impl Command for Put {
    type Out = ();
}

struct State {
    value: Cell<i64>,
}

impl Handler for State {
    type Answer = i64;
    type Body = i64;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Get>().command::<Put>();
    }

    fn handle_return(&self, body: i64) -> i64 {
        body
    }
}

impl Clause<Get> for State {
    fn handle_command(&self, _: Get, r: Resumption<i64, i64>) -> i64 {
        r.tail_resume(self.value.get())
    }
}

impl Clause<Put> for State {
    fn handle_command(&self, Put(v): Put, r: Resumption<(), i64>) -> i64 {
        self.value.set(v);
        r.tail_resume(())
    }
}

#[test]
fn test_state_matches_reference_cell() {
    // Deterministic mix of reads and writes
    let ops: Vec<Option<i64>> = (0..2000u64)
        .map(|i| {
            let x = i.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407) >> 33;
            if x % 3 == 0 { Some((x % 1000) as i64) } else { None }
        })
        .collect();

    let mut reference = 7;
    let mut expected = Vec::new();
    for op in &ops {
        match op {
            Some(v) => reference = *v,
            None => expected.push(reference),
        }
    }

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let last = handle(State { value: Cell::new(7) }, move || {
        for op in ops {
            match op {
                Some(v) => invoke_command(Put(v)),
                None => log.borrow_mut().push(invoke_command(Get)),
            }
        }
        invoke_command(Get)
    });

    assert_eq!(*seen.borrow(), expected);
    assert_eq!(last, reference);
}

// ----------------------------------------------------------------------
// Readers and labels
// ----------------------------------------------------------------------

struct Read;
impl Command for Read {
    type Out = i64;
}

struct Reader<A> {
    val: i64,
    _answer: PhantomData<A>,
}

impl<A> Reader<A> {
    fn new(val: i64) -> Self {
        Self {
            val,
            _answer: PhantomData,
        }
    }
}

impl<A: Default + 'static> Handler for Reader<A> {
    type Answer = A;
    type Body = A;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Read>();
    }

    fn handle_return(&self, body: A) -> A {
        body
    }
}

impl<A: Default + 'static> Clause<Read> for Reader<A> {
    fn handle_command(&self, _: Read, r: Resumption<i64, A>) -> A {
        r.tail_resume(self.val)
    }
}

fn nested_readers(n: i64, depth: i64, seen: Rc<RefCell<Vec<(i64, i64)>>>) {
    if n > 0 {
        handle_labeled(n, Reader::<()>::new(n), move || nested_readers(n - 1, depth, seen));
    } else {
        for i in (0..30000).step_by(767) {
            let label = i % depth + 1;
            let got = invoke_command_with_label(label, Read);
            seen.borrow_mut().push((label, got));
        }
        // Type-based dispatch reaches the innermost reader
        seen.borrow_mut().push((1, invoke_command(Read)));
    }
}

#[test]
fn test_label_dispatch_reaches_exact_frame() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    nested_readers(99, 99, seen.clone());
    let seen = seen.borrow();
    assert_eq!(seen.len(), 41);
    for &(label, got) in seen.iter() {
        assert_eq!(label, got);
    }
}

#[test]
fn test_handler_refs_target_installations() {
    let escaped: Rc<RefCell<Option<HandlerRef>>> = Rc::new(RefCell::new(None));
    let keep = escaped.clone();

    let total = handle_ref(Reader::<i64>::new(10), move |outer| {
        *keep.borrow_mut() = Some(outer.clone());
        assert!(outer.is_installed());
        assert!(outer.handler_name().contains("Reader"));

        handle_labeled(77, Reader::<i64>::new(20), move || {
            let nearest = find_handler::<Read>();
            assert_eq!(nearest.label(), 77);
            assert_eq!(find_handler_by_label(77).label(), 77);

            let a = invoke_command(Read);
            let b = invoke_command_at(&outer, Read);
            let c = static_invoke_command::<Reader<i64>, Read>(Read);
            let d = static_invoke_command_at::<Reader<i64>, Read>(&outer, Read);
            let e = static_invoke_command_with_label::<Reader<i64>, Read>(77, Read);
            assert_eq!((a, b, c, d, e), (20, 10, 20, 10, 20));
            a + b
        })
    });

    assert_eq!(total, 30);
    let outer = escaped.borrow_mut().take().unwrap();
    assert!(!outer.is_installed());
}

#[test]
fn test_shared_reader_installed_twice() {
    let shared = Rc::new(Reader::<i64>::new(5));
    let total = handle_with_labeled(31, Rc::clone(&shared), {
        let shared = Rc::clone(&shared);
        move || {
            let inner = handle_with_ref(shared, |this| {
                assert_eq!(this.label(), find_handler::<Read>().label());
                invoke_command(Read) + invoke_command_at(&this, Read)
            });
            inner + invoke_command_with_label(31, Read)
        }
    });
    assert_eq!(total, 15);
    assert_eq!(Rc::strong_count(&shared), 1);
}

// ----------------------------------------------------------------------
// Removing a handler from the middle of the metastack
// ----------------------------------------------------------------------

struct PingOuter;
impl Command for PingOuter {
    type Out = ();
}

struct PingInner;
impl Command for PingInner {
    type Out = ();
}

struct CutMiddlemanAid;
impl Command for CutMiddlemanAid {
    type Out = ();
}

struct CutMiddlemanAbet {
    res: RawResumption<(), ()>,
}
impl Command for CutMiddlemanAbet {
    type Out = ();
}

struct HInner;

impl Handler for HInner {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<PingInner>().command::<CutMiddlemanAid>();
    }

    fn handle_return(&self, _: ()) {}
}

impl Clause<PingInner> for HInner {
    fn handle_command(&self, _: PingInner, r: Resumption<(), ()>) {
        emit("Inner!");
        r.tail_resume(())
    }
}

impl Clause<CutMiddlemanAid> for HInner {
    fn handle_command(&self, _: CutMiddlemanAid, r: Resumption<(), ()>) {
        invoke_command(CutMiddlemanAbet { res: r.release() })
    }
}

struct HOuter;

impl Handler for HOuter {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<PingOuter>().command::<CutMiddlemanAbet>();
    }

    fn handle_return(&self, _: ()) {}
}

impl Clause<PingOuter> for HOuter {
    fn handle_command(&self, _: PingOuter, r: Resumption<(), ()>) {
        emit("Outer!");
        r.tail_resume(())
    }
}

impl Clause<CutMiddlemanAbet> for HOuter {
    fn handle_command(&self, a: CutMiddlemanAbet, _: Resumption<(), ()>) {
        unsafe { Resumption::from_raw(a.res) }.tail_resume(())
    }
}

#[test]
fn test_cut_out_the_middleman() {
    emit("A+");
    handle(HOuter, || {
        emit("B+");
        handle(HInner, || {
            emit("C+");
            invoke_command(PingOuter);
            invoke_command(PingInner);
            invoke_command(CutMiddlemanAid);
            invoke_command(PingInner);
            emit("C-");
        });
        emit("B-");
    });
    emit("A-");

    assert_eq!(
        transcript(),
        ["A+", "B+", "C+", "Outer!", "Inner!", "Inner!", "C-", "A-"]
    );
}

// ----------------------------------------------------------------------
// Reading the final result elsewhere
// ----------------------------------------------------------------------

thread_local! {
    static PAUSED: Cell<Option<RawResumption<(), i32>>> = const { Cell::new(None) };
}

struct Inc;
impl Command for Inc {
    type Out = ();
}

struct Break;
impl Command for Break {
    type Out = ();
}

struct Hip;

impl Handler for Hip {
    type Answer = i32;
    type Body = i32;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Inc>().command::<Break>();
    }

    fn handle_return(&self, v: i32) -> i32 {
        v
    }
}

impl Clause<Break> for Hip {
    fn handle_command(&self, _: Break, r: Resumption<(), i32>) -> i32 {
        PAUSED.with(|p| p.set(Some(r.release())));
        0
    }
}

impl Clause<Inc> for Hip {
    fn handle_command(&self, _: Inc, r: Resumption<(), i32>) -> i32 {
        r.resume(()) + 1
    }
}

fn resume_paused() -> i32 {
    let raw = PAUSED.with(|p| p.take()).expect("nothing paused");
    unsafe { Resumption::from_raw(raw) }.resume(())
}

#[test]
fn test_result_read_outside_the_handler() {
    let first = handle(Hip, || {
        invoke_command(Inc);
        invoke_command(Inc);
        invoke_command(Break);
        invoke_command(Inc);
        invoke_command(Break);
        invoke_command(Inc);
        100
    });
    assert_eq!(first, 2);
    assert_eq!(resume_paused(), 1);
    assert_eq!(resume_paused(), 101);
}

// ----------------------------------------------------------------------
// Swapping the handler of a suspended computation
// ----------------------------------------------------------------------

struct CmdAid {
    han: Rc<Reader<i64>>,
    res: RawResumption<(), i64>,
}
impl Command for CmdAid {
    type Out = Never;
}

struct CmdAbet {
    han: Rc<Reader<i64>>,
}
impl Command for CmdAbet {
    type Out = ();
}

#[derive(Default)]
struct Aid;

impl Handler for Aid {
    type Answer = i64;
    type Body = i64;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<CmdAid>();
    }

    fn handle_return(&self, a: i64) -> i64 {
        a
    }
}

impl Clause<CmdAid> for Aid {
    fn handle_command(&self, c: CmdAid, _: Resumption<Never, i64>) -> i64 {
        let CmdAid { han, res } = c;
        handle(Aid, move || {
            handle_with(han, move || unsafe { Resumption::from_raw(res) }.resume(()))
        })
    }
}

struct Abet;

impl Handler for Abet {
    type Answer = i64;
    type Body = i64;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<CmdAbet>();
    }

    fn handle_return(&self, b: i64) -> i64 {
        b
    }
}

impl Clause<CmdAbet> for Abet {
    fn handle_command(&self, c: CmdAbet, r: Resumption<(), i64>) -> i64 {
        match invoke_command(CmdAid {
            han: c.han,
            res: r.release(),
        }) {}
    }
}

fn swappable_handle_with(
    body: impl FnOnce() -> i64 + 'static,
    handler: Rc<Reader<i64>>,
) -> i64 {
    handle(Aid, move || handle_with(handler, move || handle(Abet, body)))
}

fn put_reader(v: i64) {
    invoke_command(CmdAbet {
        han: Rc::new(Reader::new(v)),
    });
}

fn get_reader() -> i64 {
    invoke_command(Read)
}

#[test]
fn test_swap_handler_mid_computation() {
    let answer = swappable_handle_with(
        || {
            emit(get_reader().to_string());
            put_reader(get_reader() + 10);
            emit(get_reader().to_string());
            put_reader(200);
            put_reader(300);
            put_reader(get_reader() + 10);
            emit(get_reader().to_string());
            emit(get_reader().to_string());
            put_reader(get_reader() + 10);
            emit(get_reader().to_string());
            18
        },
        Rc::new(Reader::new(100)),
    );
    assert_eq!(answer, 18);
    assert_eq!(transcript(), ["100", "110", "310", "310", "320"]);
}

// ----------------------------------------------------------------------
// Answers without resuming, several results per command
// ----------------------------------------------------------------------

struct Quit;
impl Command for Quit {
    type Out = ();
}

struct Global;

impl Handler for Global {
    type Answer = i32;
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Quit>();
    }

    fn handle_return(&self, _: ()) -> i32 {
        10
    }
}

impl Clause<Quit> for Global {
    fn handle_command(&self, _: Quit, _: Resumption<(), i32>) -> i32 {
        100
    }
}

#[test]
fn test_answer_without_resuming() {
    assert_eq!(handle(Global, || invoke_command(Quit)), 100);
    assert_eq!(handle(Global, || ()), 10);
}

struct Triple;
impl Command for Triple {
    type Out = (i32, i32, String);
}

struct Counters {
    a: Cell<i32>,
    b: Cell<i32>,
    s: String,
}

impl Handler for Counters {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Triple>();
    }

    fn handle_return(&self, _: ()) {}
}

impl Clause<Triple> for Counters {
    fn handle_command(&self, _: Triple, r: Resumption<(i32, i32, String), ()>) {
        let a = self.a.get();
        let b = self.b.get();
        self.a.set(a + 1);
        self.b.set(b - 1);
        r.resume((a, b, self.s.clone()))
    }
}

#[test]
fn test_tuple_results() {
    let counters = Counters {
        a: Cell::new(100),
        b: Cell::new(100),
        s: "hello!".to_string(),
    };
    handle(counters, || {
        for _ in 0..10 {
            let (a, b, s) = invoke_command(Triple);
            emit(format!("{} {} {}", a, b, s));
        }
    });
    let lines = transcript();
    assert_eq!(lines.len(), 10);
    assert_eq!(lines[0], "100 100 hello!");
    assert_eq!(lines[9], "109 91 hello!");
}
