//! Diagnostic output capture.
//!
//! Code under test reports side-channel diagnostics (tracebacks, "failed
//! with" notices, warnings) through [`write_diagnostic`] or the [`diag!`]
//! macro instead of writing to stderr directly. Each thread keeps a stack of
//! sinks: while any capture is hooked via [`StderrCapture::hook`], text lands
//! in the most recently hooked buffer; otherwise it goes to the real stderr.
//!
//! [`diag!`]: crate::diag

use std::cell::RefCell;
use std::fmt::Write as _;
use std::io::Write as _;
use std::rc::Rc;

mod pattern;
mod stderr;

pub use pattern::MatchTier;
pub use stderr::{StderrCapture, MAINLOOP_ASSERTION};

pub(crate) type SharedBuffer = Rc<RefCell<String>>;

thread_local! {
    static SINKS: RefCell<Vec<SharedBuffer>> = const { RefCell::new(Vec::new()) };
}

/// Makes `buffer` this thread's active sink.
pub(crate) fn push_sink(buffer: SharedBuffer) {
    SINKS.with(|sinks| sinks.borrow_mut().push(buffer));
}

/// Removes `buffer` from this thread's sinks wherever it sits.
///
/// Buffers hooked after it stay installed, so captures may be released in
/// any order. Returns false if `buffer` was not installed.
pub(crate) fn remove_sink(buffer: &SharedBuffer) -> bool {
    SINKS.with(|sinks| {
        let mut sinks = sinks.borrow_mut();
        let Some(pos) = sinks.iter().rposition(|s| Rc::ptr_eq(s, buffer)) else {
            return false;
        };
        if pos + 1 != sinks.len() {
            tracing::debug!(
                above = sinks.len() - pos - 1,
                "released a capture below newer ones"
            );
        }
        sinks.remove(pos);
        true
    })
}

/// Returns true if diagnostics on this thread are currently being captured.
#[must_use]
pub fn is_hooked() -> bool {
    SINKS.with(|sinks| !sinks.borrow().is_empty())
}

/// Writes diagnostic text to the current sink.
pub fn write_diagnostic(text: &str) {
    let captured = SINKS.with(|sinks| {
        sinks.borrow().last().is_some_and(|buffer| {
            buffer.borrow_mut().push_str(text);
            true
        })
    });
    if !captured {
        let _ = std::io::stderr().write_all(text.as_bytes());
    }
}

/// Writes formatted diagnostic text to the current sink.
#[macro_export]
macro_rules! diag {
    ($($arg:tt)*) => {
        $crate::capture::write_diagnostic(&::std::format!($($arg)*))
    };
}

/// A writer over the current diagnostic sink.
///
/// Byte writes may split a UTF-8 sequence; the incomplete tail is held back
/// until the next write completes it, or emitted lossily on flush.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticWriter {
    pending: Vec<u8>,
}

impl DiagnosticWriter {
    /// Creates a writer with nothing pending.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl std::io::Write for DiagnosticWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let mut text = String::new();
        let mut rest = self.pending.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    let Some(bad) = err.error_len() else {
                        rest = after;
                        break;
                    };
                    text.push(char::REPLACEMENT_CHARACTER);
                    rest = &after[bad..];
                }
            }
        }
        self.pending = rest.to_vec();
        if !text.is_empty() {
            write_diagnostic(&text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            write_diagnostic(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
        Ok(())
    }
}

impl std::fmt::Write for DiagnosticWriter {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        write_diagnostic(s);
        Ok(())
    }
}

/// Renders a traceback-shaped report.
///
/// The header is only emitted when there is at least one frame line.
#[must_use]
pub fn format_traceback<S: AsRef<str>>(frames: &[S], kind: &str, value: &str) -> String {
    let mut out = String::new();
    if !frames.is_empty() {
        out.push_str("Traceback (most recent call last):\n");
        for frame in frames {
            let _ = writeln!(out, "  {}", frame.as_ref());
        }
    }
    let _ = writeln!(out, "{kind}: {value}");
    out
}
