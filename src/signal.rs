//! Signal extraction — pull one normalized decimal out of noisy view text.
//!
//! Odds cells render differently across markets and locales ("2,35", "x2.35",
//! "2.35 ↑"); the extractor scans left to right, keeps the first digit run it
//! sees, and normalizes the first comma/dot separator to a dot. Pure and
//! deterministic so change detection can compare textual forms.

use serde::{Deserialize, Serialize};

/// A normalized decimal signal and the text it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Canonical decimal text, e.g. `"2.35"`. Comma separators are
    /// normalized to a dot; digit-only input stays digit-only.
    pub text: String,
    /// The raw input the signal came from, for diagnostics.
    pub raw: String,
}

impl Signal {
    /// Numeric value, when the canonical text parses as one.
    pub fn value(&self) -> Option<f64> {
        self.text.parse().ok()
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Extract the first decimal-looking number from free-form text.
///
/// Scan rules:
/// - leading non-digit characters are skipped;
/// - once a digit is seen, digits accumulate;
/// - the first `.` or `,` encountered after a digit is kept as `.`;
/// - accumulation stops at the first character after the digit run that is
///   neither a digit nor that first-seen separator — `"2.3.5"` yields `"2.3"`;
/// - no digit at all (including empty/`None` input) yields `None`.
pub fn extract(text: Option<&str>) -> Option<Signal> {
    let raw = text?;
    let t = raw.replace('\n', " ");
    let t = t.trim();

    let mut out = String::new();
    let mut seen_digit = false;
    let mut seen_separator = false;

    for c in t.chars() {
        if c.is_ascii_digit() {
            out.push(c);
            seen_digit = true;
        } else if (c == '.' || c == ',') && seen_digit && !seen_separator {
            out.push('.');
            seen_separator = true;
        } else if seen_digit {
            break;
        }
        // Not a digit and nothing accumulated yet: keep scanning.
    }

    // A trailing separator with no digits after it is noise, not a decimal.
    if out.ends_with('.') {
        out.pop();
    }

    if out.is_empty() {
        None
    } else {
        Some(Signal {
            text: out,
            raw: raw.to_string(),
        })
    }
}
