//! Fatal runtime errors
//!
//! Misuse terminates the process, so each scenario runs in a child copy of
//! this test binary, selected by name through an environment variable.

use oneshot_runtime::{
    Clause, Clauses, Command, Handler, HandlerRef, Resumption, find_handler_by_label, fresh_label,
    handle, handle_labeled, handle_ref, invoke_command, invoke_command_at,
    invoke_command_with_label, static_invoke_command_with_label,
};
use std::cell::RefCell;
use std::process::Output;

const CHILD_ENV: &str = "ONESHOT_FATAL_CHILD";

/// Run `scenario` in a child process when this test is the selected child;
/// otherwise spawn that child and return its output.
fn in_child(name: &str, scenario: fn()) -> Option<Output> {
    if std::env::var(CHILD_ENV).as_deref() == Ok(name) {
        scenario();
        return None;
    }
    let exe = std::env::current_exe().unwrap();
    let output = std::process::Command::new(exe)
        .args([name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, name)
        .output()
        .unwrap();
    Some(output)
}

fn assert_fatal(output: Option<Output>, message: &str) {
    let Some(output) = output else {
        panic!("scenario returned instead of terminating the process");
    };
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr);
    assert!(stderr.contains(message), "stderr: {}", stderr);
    assert!(stderr.contains("=== Metastack (top first) ==="), "stderr: {}", stderr);
}

struct Ping;
impl Command for Ping {
    type Out = ();
}

struct Pong;
impl Command for Pong {
    type Out = ();
}

struct Pinger;

impl Handler for Pinger {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Ping>();
    }

    fn handle_return(&self, _: ()) {}
}

impl Clause<Ping> for Pinger {
    fn handle_command(&self, _: Ping, r: Resumption<(), ()>) {
        r.resume(())
    }
}

#[test]
fn test_unhandled_command() {
    let output = in_child("test_unhandled_command", || {
        handle(Pinger, || invoke_command(Pong));
    });
    assert_fatal(output, "no handler for command test_fatal::Pong");
}

#[test]
fn test_unknown_label() {
    let output = in_child("test_unknown_label", || {
        handle_labeled(5, Pinger, || invoke_command_with_label(6, Ping));
    });
    assert_fatal(output, "no handler with label 6");
}

#[test]
fn test_label_does_not_handle_command() {
    let output = in_child("test_label_does_not_handle_command", || {
        handle_labeled(5, Pinger, || invoke_command_with_label(5, Pong));
    });
    assert_fatal(
        output,
        "handler test_fatal::Pinger with label 5 does not handle command test_fatal::Pong",
    );
}

#[test]
fn test_find_handler_by_unknown_label() {
    let output = in_child("test_find_handler_by_unknown_label", || {
        handle_labeled(5, Pinger, || {
            find_handler_by_label(9);
        });
    });
    let stderr = output
        .as_ref()
        .map(|o| String::from_utf8_lossy(&o.stderr).into_owned())
        .unwrap_or_default();
    assert_fatal(output, "no handler with label 9");
    assert!(!stderr.contains("invoking command"), "stderr: {}", stderr);
}

#[test]
fn test_reserved_label() {
    let output = in_child("test_reserved_label", || {
        handle_labeled(0, Pinger, || ());
    });
    assert_fatal(output, "label 0 is reserved");
}

#[test]
fn test_unissued_negative_label() {
    let output = in_child("test_unissued_negative_label", || {
        let minted = fresh_label();
        handle_labeled(minted, Pinger, move || {
            handle_labeled(minted - 1, Pinger, || ());
        });
    });
    assert_fatal(output, "was not issued by fresh_label");
}

thread_local! {
    static ESCAPED: RefCell<Option<HandlerRef>> = const { RefCell::new(None) };
}

#[test]
fn test_stale_handler_ref() {
    let output = in_child("test_stale_handler_ref", || {
        handle_ref(Pinger, |this| ESCAPED.with(|e| *e.borrow_mut() = Some(this)));
        let Some(stale) = ESCAPED.with(|e| e.borrow_mut().take()) else {
            return;
        };
        handle(Pinger, move || invoke_command_at(&stale, Ping));
    });
    assert_fatal(output, "is not installed on the metastack");
}

struct Resumer;

impl Handler for Resumer {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Ping>();
    }

    fn handle_return(&self, _: ()) {}
}

impl Clause<Ping> for Resumer {
    fn handle_command(&self, _: Ping, mut r: Resumption<(), ()>) {
        let _live = r.take();
        r.resume(())
    }
}

#[test]
fn test_resume_empty() {
    let output = in_child("test_resume_empty", || {
        handle(Resumer, || invoke_command(Ping));
    });
    assert_fatal(output, "resuming an empty resumption");
}

struct Twice;

impl Handler for Twice {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Ping>().command::<Ping>();
    }

    fn handle_return(&self, _: ()) {}
}

impl Clause<Ping> for Twice {
    fn handle_command(&self, _: Ping, r: Resumption<(), ()>) {
        r.resume(())
    }
}

#[test]
fn test_duplicate_clause() {
    let output = in_child("test_duplicate_clause", || {
        handle(Twice, || ());
    });
    assert_fatal(output, "declares command test_fatal::Ping more than once");
}

#[test]
fn test_dump_lists_installed_handlers() {
    let output = in_child("test_dump_lists_installed_handlers", || {
        handle_labeled(17, Pinger, || {
            handle_labeled(18, Resumer, || invoke_command(Pong));
        });
    });
    let stderr = output
        .as_ref()
        .map(|o| String::from_utf8_lossy(&o.stderr).into_owned())
        .unwrap_or_default();
    assert_fatal(output, "no handler for command test_fatal::Pong");
    let inner = stderr.find("18:test_fatal::Resumer [Ping]").unwrap();
    let outer = stderr.find("17:test_fatal::Pinger [Ping]").unwrap();
    assert!(inner < outer, "stderr: {}", stderr);
}

#[test]
fn test_static_dispatch_to_wrong_handler() {
    let output = in_child("test_static_dispatch_to_wrong_handler", || {
        handle_labeled(5, Pinger, || {
            static_invoke_command_with_label::<Resumer, Ping>(5, Ping)
        });
    });
    assert_fatal(
        output,
        "static dispatch expected handler test_fatal::Resumer but found test_fatal::Pinger",
    );
}

// ----------------------------------------------------------------------
// Misuse of tail resumes
// ----------------------------------------------------------------------

struct DoubleTail;

impl Handler for DoubleTail {
    type Answer = ();
    type Body = ();

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Ping>();
    }

    fn handle_return(&self, _: ()) {}
}

impl Clause<Ping> for DoubleTail {
    fn handle_command(&self, _: Ping, r: Resumption<(), ()>) {
        r.tail_resume(());
        Resumption::<(), ()>::from_fn(|()| ()).tail_resume(())
    }
}

#[test]
fn test_second_tail_resume_before_drain() {
    let output = in_child("test_second_tail_resume_before_drain", || {
        handle(DoubleTail, || invoke_command(Ping));
    });
    assert_fatal(output, "tail-resume requested while another is still pending");
}

struct WideAnswer;

impl Handler for WideAnswer {
    type Answer = u64;
    type Body = u64;

    fn declare(clauses: &mut Clauses<Self>) {
        clauses.command::<Ping>();
    }

    fn handle_return(&self, body: u64) -> u64 {
        body
    }
}

impl Clause<Ping> for WideAnswer {
    fn handle_command(&self, _: Ping, r: Resumption<(), u64>) -> u64 {
        drop(r);
        let narrow = Resumption::<(), u8>::from_fn(|()| 5);
        u64::from(narrow.tail_resume(()))
    }
}

#[test]
fn test_tail_resume_with_foreign_answer_type() {
    let output = in_child("test_tail_resume_with_foreign_answer_type", || {
        handle(WideAnswer, || {
            invoke_command(Ping);
            1
        });
    });
    assert_fatal(output, "pending tail-resume does not answer with u64");
}
