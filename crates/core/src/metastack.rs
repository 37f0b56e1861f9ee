//! Metastack: the chain of active handler installations
//!
//! Every `handle` call pushes one [`Metaframe`]. Frames are linked from the
//! top down (each frame owns the one below it), and the thread-local top
//! pointer owns the whole chain. The bottom frame is a sentinel with label 0
//! that is installed with the thread and never removed.
//!
//! ```text
//!   TOP ──► [-3 Inner] ──► [7 Reader] ──► [-1 State] ──► [0 <bottom>]
//! ```
//!
//! Capturing a continuation detaches a contiguous run of frames from the
//! top down to (and including) the handling frame into a [`Segment`]; the
//! top pointer moves to the frame below. Resuming splices the segment back
//! on top of whatever the metastack holds at that moment. Both are O(1):
//! only the top pointer and the segment's bottom link change.
//!
//! Dispatch scans from the top: the innermost installation that declares a
//! command wins, unless a label or a handler reference picks a frame
//! explicitly.

use crate::error::{EffectError, fatal};
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;

/// Label of the bottom sentinel. Never matches label-based dispatch.
pub const SENTINEL_LABEL: i64 = 0;

/// Label given to a frame once its handler has started its return clause.
pub const SHADOW_LABEL: i64 = i64::MIN;

/// How a declared command clause is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Capture the continuation and hand the clause a resumption
    Resumptive,
    /// Like `Resumptive`, without keeping the handler alive during the clause
    NoManage,
    /// Discard the continuation; the clause gets no resumption
    NoResume,
    /// Run the clause in place and return its result to the invoker
    Plain,
}

impl Modifier {
    fn tag(self) -> &'static str {
        match self {
            Modifier::Resumptive => "",
            Modifier::NoManage => "(no_manage)",
            Modifier::NoResume => "(no_resume)",
            Modifier::Plain => "(plain)",
        }
    }
}

/// One declared command clause.
///
/// `thunk` holds a monomorphized entry point; its concrete fn-pointer type
/// depends on the modifier and is known to the dispatch code that downcasts it.
pub struct ClauseEntry {
    pub command: TypeId,
    pub command_name: &'static str,
    pub modifier: Modifier,
    pub thunk: Box<dyn Any>,
}

/// The clauses declared by one handler type
#[derive(Default)]
pub struct ClauseTable {
    entries: Vec<ClauseEntry>,
}

impl ClauseTable {
    pub fn new(entries: Vec<ClauseEntry>) -> Self {
        Self { entries }
    }

    /// Index of the clause for `command`, if declared
    #[inline]
    pub fn lookup(&self, command: TypeId) -> Option<usize> {
        self.entries.iter().position(|e| e.command == command)
    }

    pub fn entry(&self, index: usize) -> &ClauseEntry {
        &self.entries[index]
    }

    pub fn entries(&self) -> &[ClauseEntry] {
        &self.entries
    }
}

/// One handler installation on the metastack
pub struct Metaframe {
    label: Cell<i64>,
    below: RefCell<Option<Rc<Metaframe>>>,
    handler: Rc<dyn Any>,
    handler_name: &'static str,
    clauses: Rc<ClauseTable>,
}

impl Metaframe {
    pub fn new(
        label: i64,
        handler: Rc<dyn Any>,
        handler_name: &'static str,
        clauses: Rc<ClauseTable>,
    ) -> Self {
        Self {
            label: Cell::new(label),
            below: RefCell::new(None),
            handler,
            handler_name,
            clauses,
        }
    }

    fn sentinel() -> Self {
        Self::new(
            SENTINEL_LABEL,
            Rc::new(()),
            "<bottom>",
            Rc::new(ClauseTable::default()),
        )
    }

    pub fn label(&self) -> i64 {
        self.label.get()
    }

    pub fn handler(&self) -> &Rc<dyn Any> {
        &self.handler
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub fn clauses(&self) -> &ClauseTable {
        &self.clauses
    }

    /// Mark the frame as finished: its return clause is running or has run.
    pub fn retire(&self) {
        self.label.set(SHADOW_LABEL);
    }

    pub fn is_retired(&self) -> bool {
        self.label.get() == SHADOW_LABEL
    }

    fn below(&self) -> Option<Rc<Metaframe>> {
        self.below.borrow().clone()
    }

    fn is_sentinel(&self) -> bool {
        self.label.get() == SENTINEL_LABEL && self.below.borrow().is_none()
    }
}

/// A run of frames detached from the metastack, `top` down to `bottom`.
///
/// The bottom frame's link is cut while detached, so the segment owns
/// exactly its own frames.
pub struct Segment {
    top: Rc<Metaframe>,
    bottom: Rc<Metaframe>,
}

impl Segment {
    /// The lowest frame of the segment (the handler that captured it)
    pub fn bottom(&self) -> &Rc<Metaframe> {
        &self.bottom
    }

    /// Number of frames in the segment
    pub fn frame_count(&self) -> usize {
        let mut n = 1;
        let mut cur = self.top.clone();
        while !Rc::ptr_eq(&cur, &self.bottom) {
            match cur.below() {
                Some(next) => cur = next,
                None => break,
            }
            n += 1;
        }
        n
    }
}

thread_local! {
    static TOP: RefCell<Rc<Metaframe>> = RefCell::new(Rc::new(Metaframe::sentinel()));
    static NEXT_LABEL: Cell<i64> = const { Cell::new(-1) };
}

/// A label no other installation on this thread has received.
///
/// Fresh labels are negative; positive labels are left to callers.
pub fn fresh_label() -> i64 {
    NEXT_LABEL.with(|next| {
        let label = next.get();
        next.set(label - 1);
        label
    })
}

/// Whether `label` is positive or was handed out by [`fresh_label`] on this thread
pub fn is_issued(label: i64) -> bool {
    label > 0 || (label != SHADOW_LABEL && label > NEXT_LABEL.with(Cell::get))
}

/// The frame currently on top
pub fn top() -> Rc<Metaframe> {
    TOP.with(|t| t.borrow().clone())
}

/// Install `frame` on top of the metastack
pub fn push(frame: Rc<Metaframe>) {
    TOP.with(|t| {
        let below = t.replace(frame.clone());
        *frame.below.borrow_mut() = Some(below);
    });
}

/// Remove and return the top frame. The sentinel cannot be popped.
pub fn pop() -> Rc<Metaframe> {
    let top = top();
    let Some(below) = top.below.borrow_mut().take() else {
        fatal(EffectError::Internal(
            "attempted to pop the bottom of the metastack".to_string(),
        ))
    };
    TOP.with(|t| t.replace(below))
}

/// Detach `bottom` and every frame above it.
///
/// `bottom` must be on the live metastack; the frame below it becomes the top.
pub fn split(bottom: &Rc<Metaframe>) -> Segment {
    debug_assert!(contains(bottom), "split below a frame not on the metastack");
    let Some(below) = bottom.below.borrow_mut().take() else {
        fatal(EffectError::Internal(
            "attempted to split off the bottom of the metastack".to_string(),
        ))
    };
    let top = TOP.with(|t| t.replace(below));
    Segment {
        top,
        bottom: bottom.clone(),
    }
}

/// Put a detached segment back on top of the metastack
pub fn splice(segment: Segment) {
    let Segment { top, bottom } = segment;
    let below = TOP.with(|t| t.replace(top));
    *bottom.below.borrow_mut() = Some(below);
}

/// Walk the live metastack from the top, returning the first frame accepted by `pred`.
fn find(mut pred: impl FnMut(&Metaframe) -> bool) -> Option<Rc<Metaframe>> {
    let mut cur = top();
    loop {
        if cur.is_sentinel() {
            return None;
        }
        if pred(&*cur) {
            return Some(cur);
        }
        cur = cur.below()?;
    }
}

/// Innermost frame declaring `command`, with the index of its clause
pub fn find_command(command: TypeId) -> Option<(Rc<Metaframe>, usize)> {
    let mut entry = 0;
    let frame = find(|f| match f.clauses.lookup(command) {
        Some(idx) => {
            entry = idx;
            true
        }
        None => false,
    })?;
    Some((frame, entry))
}

/// Innermost frame with `label`. The sentinel and shadow labels never match.
pub fn find_label(label: i64) -> Option<Rc<Metaframe>> {
    if label == SENTINEL_LABEL || label == SHADOW_LABEL {
        return None;
    }
    find(|f| f.label.get() == label)
}

/// Innermost frame whose handler has type `handler`
pub fn find_handler_type(handler: TypeId) -> Option<Rc<Metaframe>> {
    find(|f| (*f.handler).type_id() == handler)
}

/// Whether `frame` is currently installed on the live metastack
pub fn contains(frame: &Rc<Metaframe>) -> bool {
    find(|f| std::ptr::eq(f, Rc::as_ptr(frame))).is_some()
}

/// Number of installed frames, not counting the sentinel
pub fn depth() -> usize {
    let mut n = 0;
    let _ = find(|_| {
        n += 1;
        false
    });
    n
}

/// Label and handler type of one installed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub label: i64,
    pub handler: &'static str,
}

/// The live metastack, top first, without the sentinel
pub fn snapshot() -> Vec<FrameInfo> {
    let mut frames = Vec::new();
    let _ = find(|f| {
        frames.push(FrameInfo {
            label: f.label.get(),
            handler: f.handler_name,
        });
        false
    });
    frames
}

/// Write the metastack of the calling thread, top first.
///
/// One line per frame: `label:HandlerType [Cmd, Cmd(plain), ...]`.
pub fn write_metastack(out: &mut impl Write) {
    let _ = writeln!(out, "=== Metastack (top first) ===");
    let Ok(top) = TOP.try_with(|t| t.try_borrow().ok().map(|t| Rc::clone(&t))) else {
        let _ = writeln!(out, "  (unavailable: thread is shutting down)");
        return;
    };
    let Some(mut cur) = top else {
        let _ = writeln!(out, "  (unavailable: metastack is being modified)");
        return;
    };
    loop {
        let commands: Vec<String> = cur
            .clauses
            .entries()
            .iter()
            .map(|e| format!("{}{}", short_name(e.command_name), e.modifier.tag()))
            .collect();
        let _ = if commands.is_empty() {
            writeln!(out, "  {}:{}", cur.label.get(), cur.handler_name)
        } else {
            writeln!(
                out,
                "  {}:{} [{}]",
                cur.label.get(),
                cur.handler_name,
                commands.join(", ")
            )
        };
        match cur.below.try_borrow().ok().and_then(|b| b.clone()) {
            Some(next) => cur = next,
            None => break,
        }
    }
}

/// Print the metastack of the calling thread to stderr
pub fn debug_print_metastack() {
    write_metastack(&mut std::io::stderr().lock());
}

/// `a::b::Get<c::D>` -> `Get<c::D>`
fn short_name(name: &str) -> &str {
    let head = name.split('<').next().unwrap_or(name);
    match head.rfind("::") {
        Some(pos) => &name[pos + 2..],
        None => name,
    }
}
