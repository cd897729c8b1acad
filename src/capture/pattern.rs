//! Patterns used to match captured diagnostics.

use regex::Regex;
use std::sync::LazyLock;

/// Marker that turns on the trailing-lines tolerant tier.
pub(crate) const ELLIPSIS: &str = "...";

/// Lazily skips text within one paragraph: single newlines, never a blank line.
const PARAGRAPH_GAP: &str = r"(?:[^\n]|\n[^\n])*?";

/// A traceback: optional header and indented frames, then `Kind: value`.
///
/// `Kind` may be dotted. Anchors are per line.
pub(crate) static TRACEBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:Traceback \(most recent call last\):\n(?: +[^\n]*\n)+)?^(?P<kind>\w+(?:\.\w+)*): (?P<value>[^\n]*)$",
    )
    .expect("traceback regex is valid")
});

/// Which rule of [`StderrCapture::assert_stderr`](super::StderrCapture::assert_stderr) matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// The message is the whole leading paragraph, verbatim.
    Exact,
    /// The message's words appear in order within one paragraph.
    Words,
    /// The message ends with `...` and is followed by 2–5 indented lines and
    /// a blank line.
    Ellipsis,
}

/// Returns true if a matched kind satisfies the expected one, comparing the
/// full dotted name or its last component.
pub(crate) fn kind_matches(found: &str, expected: &str) -> bool {
    found == expected || found.rsplit('.').next() == Some(expected)
}

/// Builds the candidate patterns for `message`, in the order they are tried.
pub(crate) fn tiers(message: &str) -> Result<Vec<(MatchTier, Regex)>, regex::Error> {
    let message = message.trim_end_matches('\n');
    let mut tiers = vec![(
        MatchTier::Exact,
        Regex::new(&format!(r"\A{}\n(?:\n|\z)", regex::escape(message)))?,
    )];
    if let Some(words) = words_pattern(message) {
        tiers.push((
            MatchTier::Words,
            Regex::new(&format!(r"\A{words}{PARAGRAPH_GAP}\n(?:\n|\z)"))?,
        ));
    }
    if let Some(head) = message.strip_suffix(ELLIPSIS) {
        let words = words_pattern(head).unwrap_or_default();
        tiers.push((
            MatchTier::Ellipsis,
            Regex::new(&format!(r"\A{words}[^\n]*(?:\n +[^\n]*){{2,5}}\n\n"))?,
        ));
    }
    Ok(tiers)
}

/// Escaped words of `text` joined by paragraph gaps; `None` if there are none.
fn words_pattern(text: &str) -> Option<String> {
    let words: Vec<String> = text.split_whitespace().map(regex::escape).collect();
    (!words.is_empty()).then(|| words.join(PARAGRAPH_GAP))
}
