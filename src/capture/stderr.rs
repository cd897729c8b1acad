//! Per-test capture of diagnostic output and assertions over it.

use super::pattern::{self, MatchTier, TRACEBACK};
use super::{push_sink, remove_sink, SharedBuffer};
use crate::config::HarnessConfig;
use crate::error::{Error, Result, TestResult};
use crate::hub::HubError;
use regex::Regex;
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write as _};
use std::rc::Rc;

/// Value of the traceback a hub reports when a callback tries to block.
pub const MAINLOOP_ASSERTION: &str =
    "Impossible to call blocking function in the event loop callback";

#[derive(Debug, Default)]
enum State {
    #[default]
    Unhooked,
    Hooked(SharedBuffer),
    Captured(String),
}

/// Captures a test's diagnostic output and matches it piece by piece.
///
/// `hook` redirects this thread's sink into a fresh buffer; `unhook`
/// releases that buffer and freezes the text. Captures on one thread may be
/// released in any order. Each successful assertion removes the span it
/// matched, so the next assertion sees only what is left. In debug mode every
/// consumed span is echoed line by line with a `#ATE#: ` prefix to the real
/// stderr, or to the writer given to [`with_echo`](Self::with_echo). In
/// verbose mode nothing is redirected and every assertion passes through.
///
/// ```
/// use hubtest::capture::StderrCapture;
/// use hubtest::config::HarnessConfig;
///
/// let mut capture = StderrCapture::new(HarnessConfig::new());
/// capture.hook();
/// hubtest::diag!("Traceback (most recent call last):\n  File x\nValueError: bad\n");
/// capture.assert_stderr_traceback("ValueError", Some("bad")).unwrap();
/// capture.assert_no_stderr().unwrap();
/// ```
pub struct StderrCapture {
    state: State,
    config: HarnessConfig,
    echo: Box<dyn io::Write>,
}

impl StderrCapture {
    /// Creates an unhooked capture.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            state: State::Unhooked,
            config,
            echo: Box::new(io::stderr()),
        }
    }

    /// Sends the debug echo of consumed spans to `writer`.
    #[must_use]
    pub fn with_echo(mut self, writer: impl io::Write + 'static) -> Self {
        self.echo = Box::new(writer);
        self
    }

    /// Returns true while the sink is redirected into this capture.
    #[must_use]
    pub const fn is_hooked(&self) -> bool {
        matches!(self.state, State::Hooked(_))
    }

    /// Redirects this thread's diagnostics into a fresh buffer.
    pub fn hook(&mut self) {
        if self.config.verbose {
            return;
        }
        if self.restore().is_some() {
            tracing::debug!("discarding previous capture buffer");
        }
        let buffer: SharedBuffer = Rc::new(RefCell::new(String::new()));
        push_sink(Rc::clone(&buffer));
        self.state = State::Hooked(buffer);
        tracing::debug!("diagnostic sink hooked");
    }

    /// Releases this capture's sink and freezes the captured text.
    ///
    /// Calling it again returns the current recorded text; `None` if the
    /// capture was never hooked.
    pub fn unhook(&mut self) -> Option<&str> {
        if self.config.verbose {
            return None;
        }
        if let Some(text) = self.restore() {
            tracing::debug!(bytes = text.len(), "diagnostic sink unhooked");
            self.state = State::Captured(text);
        }
        self.recorded()
    }

    /// Returns the recorded text that has not been consumed yet.
    #[must_use]
    pub fn recorded(&self) -> Option<&str> {
        match &self.state {
            State::Captured(text) => Some(text),
            _ => None,
        }
    }

    /// Unhooks if needed and hands over whatever is left unconsumed.
    pub fn take_recorded(&mut self) -> Option<String> {
        self.unhook();
        match std::mem::take(&mut self.state) {
            State::Captured(text) => Some(text),
            _ => None,
        }
    }

    /// Asserts that nothing (or nothing left) was written.
    pub fn assert_no_stderr(&mut self) -> TestResult {
        if self.config.verbose {
            return Ok(());
        }
        match self.unhook() {
            Some("") => Ok(()),
            Some(text) => Err(Error::diagnostic_mismatch(
                "expected no diagnostics",
                "",
                text,
            )),
            None => Err(Error::diagnostic_mismatch(
                "diagnostics were never captured",
                "",
                "",
            )),
        }
    }

    /// Asserts that a traceback ending in `kind: value` was written, and
    /// consumes it.
    ///
    /// `kind` matches a dotted kind on its full name or its last component.
    pub fn assert_stderr_traceback(&mut self, kind: &str, value: Option<&str>) -> TestResult {
        if self.config.verbose {
            return Ok(());
        }
        self.unhook();
        self.extract(&TRACEBACK, Some((kind, value))).map(drop)
    }

    /// [`assert_stderr_traceback`](Self::assert_stderr_traceback) with kind
    /// and value taken from a hub error.
    pub fn assert_stderr_traceback_of(&mut self, err: &HubError) -> TestResult {
        let value = err.value();
        self.assert_stderr_traceback(err.kind_name(), Some(&value))
    }

    /// Asserts that the remaining text starts with `message`, and consumes it.
    ///
    /// Rules are tried in order: the exact paragraph, then the message's words
    /// in order with anything between them, then (for messages ending with
    /// `...`) the words followed by 2–5 indented lines and a blank line.
    /// Returns the rule that matched, or `None` in verbose mode.
    pub fn assert_stderr(&mut self, message: &str) -> Result<Option<MatchTier>> {
        if self.config.verbose {
            return Ok(None);
        }
        self.unhook();
        let text = self.recorded().unwrap_or_default().to_owned();
        let tiers = pattern::tiers(message)
            .map_err(|e| Error::config(format!("invalid diagnostic pattern: {e}")))?;
        let Some((tier, regex)) = tiers.into_iter().find(|(_, re)| re.is_match(&text)) else {
            tracing::warn!(stderr = %text, "failed to process");
            return Err(Error::diagnostic_mismatch(
                format!("{message:?} did not match"),
                message,
                text,
            ));
        };
        self.extract(&regex, None)?;
        Ok(Some(tier))
    }

    /// Asserts the hub's report of a blocking call from inside a callback,
    /// optionally followed by `message`.
    pub fn assert_mainloop_assertion(&mut self, message: Option<&str>) -> TestResult {
        self.assert_stderr_traceback("AssertionError", Some(MAINLOOP_ASSERTION))?;
        if let Some(message) = message {
            self.assert_stderr(message)?;
        }
        Ok(())
    }

    fn restore(&mut self) -> Option<String> {
        match std::mem::take(&mut self.state) {
            State::Hooked(buffer) => {
                if !remove_sink(&buffer) {
                    tracing::warn!("capture buffer was no longer installed");
                }
                Some(buffer.take())
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    fn extract(&mut self, regex: &Regex, expect: Option<(&str, Option<&str>)>) -> Result<String> {
        let result = self.extract_span(regex, expect);
        if result.is_err() {
            tracing::warn!(stderr = ?self.recorded(), "failed to process");
        }
        result
    }

    fn extract_span(
        &mut self,
        regex: &Regex,
        expect: Option<(&str, Option<&str>)>,
    ) -> Result<String> {
        let State::Captured(text) = &mut self.state else {
            return Err(Error::diagnostic_mismatch(
                "no diagnostics were captured",
                regex.as_str(),
                "",
            ));
        };
        let Some(caps) = regex.captures(text) else {
            return Err(Error::diagnostic_mismatch(
                "cannot find pattern in captured diagnostics",
                regex.as_str(),
                text.as_str(),
            ));
        };
        if let Some((kind, value)) = expect {
            let found = caps.name("kind").map_or("", |m| m.as_str());
            if !pattern::kind_matches(found, kind) {
                return Err(Error::diagnostic_mismatch(
                    format!("unexpected error kind {found:?} (expected {kind:?})"),
                    kind,
                    text.as_str(),
                ));
            }
            let found = caps.name("value").map_or("", |m| m.as_str());
            if let Some(value) = value.filter(|v| *v != found) {
                return Err(Error::diagnostic_mismatch(
                    format!("unexpected error value {found:?} (expected {value:?})"),
                    value,
                    text.as_str(),
                ));
            }
        }
        let mut span = caps.get(0).map_or(0..0, |m| m.range());
        if !text[..span.end].ends_with('\n') && text[span.end..].starts_with('\n') {
            span.end += 1;
        }
        let eaten: String = text.drain(span).collect();
        tracing::debug!(consumed = %eaten, remaining = text.len(), "consumed diagnostic span");
        if self.config.debug {
            let mut ate = String::new();
            for line in eaten.lines() {
                ate.push_str("#ATE#: ");
                ate.push_str(line);
                ate.push('\n');
            }
            let _ = self.echo.write_all(ate.as_bytes());
        }
        Ok(eaten)
    }
}

impl fmt::Debug for StderrCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StderrCapture")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for StderrCapture {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{is_hooked, write_diagnostic};
    use crate::error::ErrorKind;

    fn hooked() -> StderrCapture {
        let mut capture = StderrCapture::new(HarnessConfig::new());
        capture.hook();
        capture
    }

    #[derive(Clone, Default)]
    struct Echo(Rc<RefCell<Vec<u8>>>);

    impl Echo {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    impl io::Write for Echo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn traceback_is_consumed_leaving_nothing() {
        let mut capture = hooked();
        write_diagnostic("Traceback (most recent call last):\n  File x\nValueError: bad\n");
        capture
            .assert_stderr_traceback("ValueError", Some("bad"))
            .expect("traceback matches");
        assert_eq!(capture.recorded(), Some(""));
        capture.assert_no_stderr().expect("nothing left");
    }

    #[test]
    fn relaxed_words_match_consumes_line() {
        let mut capture = hooked();
        write_diagnostic("hello world extra stuff\n");
        let tier = capture.assert_stderr("hello world").expect("matches");
        assert_eq!(tier, Some(MatchTier::Words));
        capture.assert_no_stderr().expect("nothing left");
    }

    #[test]
    fn assertions_chain_over_the_remainder() {
        let mut capture = hooked();
        write_diagnostic(
            "Traceback (most recent call last):\n  File \"<hub>\", in tick\nsocket.error: refused\n<tick> failed with error\n\nsecond message\n",
        );
        capture
            .assert_stderr_traceback("error", Some("refused"))
            .expect("dotted kind matches on last component");
        assert_eq!(
            capture.assert_stderr("<tick> failed with error").expect("exact"),
            Some(MatchTier::Exact)
        );
        assert_eq!(capture.recorded(), Some("second message\n"));
        capture.assert_stderr("second message").expect("exact");
        capture.assert_no_stderr().expect("nothing left");
    }

    #[test]
    fn wrong_kind_reports_full_buffer() {
        let mut capture = hooked();
        write_diagnostic("KeyError: 'x'\n");
        let err = capture
            .assert_stderr_traceback("ValueError", None)
            .expect_err("kind differs");
        assert_eq!(err.kind(), ErrorKind::DiagnosticMismatch);
        assert_eq!(err.mismatch().map(|m| m.actual.as_str()), Some("KeyError: 'x'\n"));
        assert_eq!(capture.recorded(), Some("KeyError: 'x'\n"));
    }

    #[test]
    fn wrong_value_is_a_mismatch() {
        let mut capture = hooked();
        write_diagnostic("ValueError: good\n");
        let err = capture
            .assert_stderr_traceback("ValueError", Some("bad"))
            .expect_err("value differs");
        assert!(err.to_string().contains("unexpected error value"));
    }

    #[test]
    fn empty_buffer_is_a_failure_not_a_crash() {
        let mut capture = hooked();
        assert!(capture.assert_stderr("anything").is_err());
        assert!(capture.assert_stderr_traceback("ValueError", None).is_err());
        capture.assert_no_stderr().expect("empty is fine here");
    }

    #[test]
    fn unmatched_message_shows_expected_and_actual() {
        let mut capture = hooked();
        write_diagnostic("something else\n");
        let err = capture.assert_stderr("hello").expect_err("no tier matches");
        let mismatch = err.mismatch().expect("mismatch detail");
        assert_eq!(mismatch.expected, "hello");
        assert_eq!(mismatch.actual, "something else\n");
    }

    #[test]
    fn unhook_is_idempotent_and_restores_sink() {
        let mut capture = StderrCapture::new(HarnessConfig::new());
        assert_eq!(capture.unhook(), None);
        capture.hook();
        assert!(is_hooked());
        write_diagnostic("text\n");
        assert_eq!(capture.unhook(), Some("text\n"));
        assert!(!is_hooked());
        assert_eq!(capture.unhook(), Some("text\n"));
    }

    #[test]
    fn never_hooked_fails_no_stderr() {
        let mut capture = StderrCapture::new(HarnessConfig::new());
        assert!(capture.assert_no_stderr().is_err());
    }

    #[test]
    fn verbose_mode_passes_everything_through() {
        let mut capture = StderrCapture::new(HarnessConfig::new().verbose(true));
        capture.hook();
        assert!(!is_hooked());
        assert_eq!(capture.assert_stderr("anything").expect("skipped"), None);
        capture
            .assert_stderr_traceback("ValueError", None)
            .expect("skipped");
        capture.assert_no_stderr().expect("skipped");
    }

    #[test]
    fn leftover_text_fails_no_stderr() {
        let mut capture = hooked();
        write_diagnostic("leftover\n");
        let err = capture.assert_no_stderr().expect_err("text remains");
        assert!(err.to_string().contains("leftover"));
    }

    #[test]
    fn drop_restores_previous_sink() {
        {
            let _capture = hooked();
            assert!(is_hooked());
        }
        assert!(!is_hooked());
    }

    #[test]
    fn rehook_starts_a_fresh_buffer() {
        let mut capture = hooked();
        write_diagnostic("old\n");
        capture.hook();
        write_diagnostic("new\n");
        assert_eq!(capture.unhook(), Some("new\n"));
        assert!(!is_hooked());
    }

    #[test]
    fn traceback_of_hub_error() {
        let mut capture = hooked();
        let err = HubError::failed("RuntimeError", "expected error");
        write_diagnostic(&crate::capture::format_traceback(&["File y"], err.kind_name(), &err.value()));
        capture.assert_stderr_traceback_of(&err).expect("matches");
        capture.assert_no_stderr().expect("nothing left");
    }

    #[test]
    fn take_recorded_empties_the_capture() {
        let mut capture = hooked();
        write_diagnostic("left\n");
        assert_eq!(capture.take_recorded().as_deref(), Some("left\n"));
        assert_eq!(capture.recorded(), None);
    }

    #[test]
    fn captures_released_out_of_order_lose_nothing() {
        let mut outer = hooked();
        let mut inner = hooked();
        outer.unhook();
        assert!(is_hooked());
        write_diagnostic("for inner\n");
        assert_eq!(inner.unhook(), Some("for inner\n"));
        assert!(!is_hooked());
        assert_eq!(outer.recorded(), Some(""));

        let mut next = hooked();
        write_diagnostic("for next\n");
        assert_eq!(next.unhook(), Some("for next\n"));
    }

    #[test]
    fn debug_mode_echoes_each_consumed_line() {
        let echo = Echo::default();
        let mut capture =
            StderrCapture::new(HarnessConfig::new().debug(true)).with_echo(echo.clone());
        capture.hook();
        write_diagnostic("Traceback (most recent call last):\n  File x\nValueError: bad\nnote\n");
        capture
            .assert_stderr_traceback("ValueError", Some("bad"))
            .expect("traceback matches");
        assert_eq!(
            echo.text(),
            "#ATE#: Traceback (most recent call last):\n#ATE#:   File x\n#ATE#: ValueError: bad\n"
        );
        capture.assert_stderr("note").expect("exact");
        assert!(echo.text().ends_with("#ATE#: ValueError: bad\n#ATE#: note\n"));
    }

    #[test]
    fn nothing_is_echoed_without_debug_or_in_verbose_mode() {
        let echo = Echo::default();
        let mut quiet = StderrCapture::new(HarnessConfig::new()).with_echo(echo.clone());
        quiet.hook();
        write_diagnostic("ValueError: bad\n");
        quiet.assert_stderr_traceback("ValueError", None).expect("matches");

        let mut verbose = StderrCapture::new(HarnessConfig::new().debug(true).verbose(true))
            .with_echo(echo.clone());
        verbose.hook();
        verbose.assert_stderr_traceback("ValueError", None).expect("skipped");
        verbose.assert_stderr("ValueError: bad").expect("skipped");

        assert_eq!(echo.text(), "");
    }
}
