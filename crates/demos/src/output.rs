//! Demo output
//!
//! Demos write through [`emit`] into a per-thread buffer instead of stdout,
//! so the CLI can print what a demo produced and the tests can compare it.

use std::cell::RefCell;

thread_local! {
    static BUFFER: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Append `text` to the current buffer
pub fn emit(text: impl AsRef<str>) {
    BUFFER.with(|b| b.borrow_mut().push_str(text.as_ref()));
}

/// Append `text` and a newline
pub fn emitln(text: impl AsRef<str>) {
    BUFFER.with(|b| {
        let mut b = b.borrow_mut();
        b.push_str(text.as_ref());
        b.push('\n');
    });
}

/// Run `f` and return everything it emitted.
///
/// Nests: output of an enclosing `capture` is set aside and restored.
pub fn capture(f: impl FnOnce()) -> String {
    let outer = BUFFER.with(|b| std::mem::take(&mut *b.borrow_mut()));
    f();
    BUFFER.with(|b| std::mem::replace(&mut *b.borrow_mut(), outer))
}
