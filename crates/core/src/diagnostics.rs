//! Runtime diagnostics for debugging handler programs
//!
//! [`dump_diagnostics`] writes the effect counters, the active configuration
//! and the calling thread's metastack to stderr.
//!
//! ## Usage
//!
//! With the `diagnostics` feature, [`install_signal_handler`] makes a
//! running process dump its process-wide counters on SIGQUIT:
//! ```bash
//! kill -3 <pid>
//! ```
//!
//! ## Signal Safety
//!
//! Dumping does I/O, which is not async-signal-safe. The handler therefore
//! runs on a dedicated thread that waits on signal-hook's iterator API. That
//! thread has no metastack of its own, so it only reports totals.

use crate::config::config;
use crate::metastack;
use crate::stats::{EffectStats, global_stats, thread_stats};
use std::io::Write;
use std::sync::Once;

static SIGNAL_HANDLER_INIT: Once = Once::new();

/// Install the SIGQUIT signal handler for diagnostics
///
/// Safe to call multiple times (idempotent).
pub fn install_signal_handler() {
    SIGNAL_HANDLER_INIT.call_once(|| {
        #[cfg(all(unix, feature = "diagnostics"))]
        {
            use signal_hook::consts::SIGQUIT;
            use signal_hook::iterator::Signals;

            let mut signals = match Signals::new([SIGQUIT]) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "could not register SIGQUIT handler");
                    return;
                }
            };

            std::thread::Builder::new()
                .name("oneshot-diagnostics".to_string())
                .spawn(move || {
                    for sig in signals.forever() {
                        if sig == SIGQUIT {
                            let mut out = std::io::stderr().lock();
                            write_totals(&mut out);
                        }
                    }
                })
                .ok();
        }
    });
}

/// Dump runtime diagnostics for the calling thread to stderr
pub fn dump_diagnostics() {
    let mut out = std::io::stderr().lock();
    write_diagnostics(&mut out);
}

/// Write the full diagnostics report for the calling thread
pub fn write_diagnostics(out: &mut impl Write) {
    write_totals(out);

    let _ = writeln!(out, "\n[This Thread]");
    write_stats(out, &thread_stats());

    let cfg = config();
    let _ = writeln!(out, "\n[Config]");
    let _ = writeln!(out, "  Stack size:    {}", format_bytes(cfg.stack_size as u64));
    let _ = writeln!(out, "  Pool capacity: {} stacks", cfg.pool_capacity);

    let _ = writeln!(out);
    metastack::write_metastack(out);
    let _ = writeln!(out, "\n=== End Diagnostics ===\n");
}

fn write_totals(out: &mut impl Write) {
    let _ = writeln!(out, "\n=== Effect Runtime Diagnostics ===");
    let _ = writeln!(out, "Timestamp: {:?}", std::time::SystemTime::now());
    let _ = writeln!(out, "\n[Process Totals]");
    write_stats(out, &global_stats());
}

fn write_stats(out: &mut impl Write, stats: &EffectStats) {
    let _ = writeln!(out, "  Handlers installed:   {}", stats.handles);
    let _ = writeln!(out, "  Captures:             {}", stats.captures);
    let _ = writeln!(out, "  Resumes:              {}", stats.resumes);
    let _ = writeln!(out, "  Tail resumes:         {}", stats.tail_resumes);
    let _ = writeln!(out, "  Plain dispatches:     {}", stats.plain_dispatches);
    let _ = writeln!(out, "  Discarded:            {}", stats.discarded);
    let _ = writeln!(
        out,
        "  Fibers:               {} created, {} stacks reused",
        stats.fibers_created, stats.stacks_reused
    );

    // Every capture ends in a resume, a tail resume, or a discard; the
    // remainder is held by live resumptions.
    let settled = stats.resumes + stats.tail_resumes + stats.discarded;
    if stats.captures > settled {
        let _ = writeln!(
            out,
            "  Outstanding:          {} captured continuation(s) not yet settled",
            stats.captures - settled
        );
    }
}

/// Format bytes as human-readable string
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
