//! Section Extractor — rebuilds a `PitchRecord` from free-form model output.
//!
//! Two passes, each only filling fields that are still empty:
//!
//! 1. **Numbered sections.** Every numeric marker (`1.`, `2)`, ...) opens a
//!    section unit that runs until the next marker or the end of the text.
//!    Markers may sit at the start of a line or, in compacted output, in the
//!    middle of one. The unit's label is the bracketed text if present, else
//!    the text before a separator (`:`, `-`, `–`, `—`), else a known label
//!    (optionally bold) at the very start of the unit. Units with unknown
//!    labels are dropped.
//! 2. **Bare labels.** Only if something is still missing: lines that start
//!    with a known label followed by `:` open a buffer that collects the
//!    following unlabelled lines.
//!
//! Extraction is total. Any input, including the empty string, yields a record.

use std::collections::HashMap;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::generation::record::{FieldKey, PitchRecord};

/// Numeric section marker: one or two digits followed by `.` or `)`.
static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}[ \t]*[.)]").expect("marker pattern is valid"));

/// Pre-separator labels longer than this are treated as content, not labels.
const MAX_LABEL_CHARS: usize = 40;

const DASHES: [char; 3] = ['-', '–', '—'];

/// Extracts the six pitch sections from `raw`.
pub fn extract(raw: &str) -> PitchRecord {
    let mut record = PitchRecord::from_raw(raw);
    if raw.trim().is_empty() {
        debug!("Extraction skipped: empty input");
        return record;
    }

    let primary = numbered_pass(raw, &mut record);

    let mut fallback = 0;
    if !record.is_complete() {
        fallback = bare_label_pass(raw, &mut record);
    }

    debug!(
        recovered = record.recovered_count(),
        primary,
        fallback,
        missing = ?record.missing(),
        "Extraction finished"
    );
    record
}

// ────────────────────────────────────────────────────────────────────────────
// Pass 1: numbered sections
// ────────────────────────────────────────────────────────────────────────────

fn numbered_pass(text: &str, record: &mut PitchRecord) -> usize {
    let markers = section_markers(text);
    let mut filled = 0;

    for (i, marker) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map_or(text.len(), |next| next.start);
        let unit = &text[marker.end..end];

        match split_label(unit) {
            Some((key, content)) => {
                if record.fill(key, &join_lines(content)) {
                    filled += 1;
                }
            }
            None => debug!(
                "Dropping section with unknown label: {:?}",
                unit.trim().chars().take(40).collect::<String>()
            ),
        }
    }
    filled
}

/// Byte ranges of the markers that open section units, in text order.
///
/// A marker at the start of a line always opens a unit. A marker in the
/// middle of a line (compacted output) only counts when an explicit label
/// follows it, bracketed or ended by a separator. Numbers inside prose such
/// as "top 10." or an inline list "1) canal direct" do not split a section.
fn section_markers(text: &str) -> Vec<Range<usize>> {
    MARKER
        .find_iter(text)
        .filter(|m| {
            !text[m.end()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        })
        .filter(|m| {
            if starts_line(text, m.start()) {
                return true;
            }
            let rest_of_line = text[m.end()..].split('\n').next().unwrap_or("");
            split_explicit_label(rest_of_line).is_some()
        })
        .map(|m| m.range())
        .collect()
}

fn starts_line(text: &str, pos: usize) -> bool {
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    text[line_start..pos].trim().is_empty()
}

/// Splits a section unit into its resolved key and content.
fn split_label(unit: &str) -> Option<(FieldKey, &str)> {
    if let Some(split) = split_explicit_label(unit) {
        return Some(split);
    }
    let unit = unit.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
    let (key, rest) = match_label_prefix(unit)?;
    Some((key, strip_separator(rest)))
}

/// Label given as `[Label]` or as `Label<separator>` on the first line.
fn split_explicit_label(unit: &str) -> Option<(FieldKey, &str)> {
    let unit = unit.trim_start();

    if let Some(rest) = unit.strip_prefix('[') {
        if let Some(close) = rest.find(']') {
            let key = FieldKey::resolve(&rest[..close])?;
            return Some((key, strip_separator(&rest[close + 1..])));
        }
    }

    let first_line = unit.split('\n').next().unwrap_or("");
    if let Some(idx) = find_separator(first_line) {
        let label = &first_line[..idx];
        if label.chars().count() <= MAX_LABEL_CHARS {
            if let Some(key) = FieldKey::resolve(label) {
                return Some((key, strip_separator(&unit[idx..])));
            }
        }
    }
    None
}

/// Byte index of the first label separator in `line`.
///
/// `:` always separates. Dashes only separate when spaced, so hyphenated
/// words stay intact.
fn find_separator(line: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    chars.iter().enumerate().find_map(|(i, &(idx, c))| {
        if c == ':' {
            return Some(idx);
        }
        if DASHES.contains(&c) {
            let before = i.checked_sub(1).map(|j| chars[j].1);
            let after = chars.get(i + 1).map(|&(_, c)| c);
            if before.is_some_and(char::is_whitespace) || after.is_some_and(char::is_whitespace) {
                return Some(idx);
            }
        }
        None
    })
}

fn strip_separator(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == '*' || DASHES.contains(&c))
}

/// Trims every line and drops blank ones.
fn join_lines(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ────────────────────────────────────────────────────────────────────────────
// Pass 2: bare labels
// ────────────────────────────────────────────────────────────────────────────

fn bare_label_pass(text: &str, record: &mut PitchRecord) -> usize {
    let mut buffers: HashMap<FieldKey, Vec<&str>> = HashMap::new();
    let mut current: Option<FieldKey> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((key, rest)) = match_label_line(line) {
            current = Some(key);
            let lines = buffers.entry(key).or_default();
            if !rest.is_empty() {
                lines.push(rest);
            }
            continue;
        }
        if let Some(key) = current {
            buffers.entry(key).or_default().push(line);
        }
    }

    let mut filled = 0;
    for key in FieldKey::ALL {
        if let Some(lines) = buffers.get(&key) {
            if record.fill(key, &lines.join("\n")) {
                filled += 1;
            }
        }
    }
    filled
}

/// Matches `Label: rest` where `Label` is a known surface form.
fn match_label_line(line: &str) -> Option<(FieldKey, &str)> {
    let line = line.trim_start_matches(|c: char| c == '*' || c == '#' || c.is_whitespace());
    let (key, rest) = match_label_prefix(line)?;
    let rest = rest.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
    let rest = rest.strip_prefix(':')?;
    Some((key, rest.trim()))
}

// ────────────────────────────────────────────────────────────────────────────
// Label prefix matching
// ────────────────────────────────────────────────────────────────────────────

/// Longest known surface form that `text` starts with, case-insensitively,
/// ending on a word boundary. Returns the key and the text after the form.
fn match_label_prefix(text: &str) -> Option<(FieldKey, &str)> {
    let mut best: Option<(usize, FieldKey, &str)> = None;
    for key in FieldKey::ALL {
        for form in key.surface_forms() {
            let Some(rest) = strip_prefix_ci(text, form) else {
                continue;
            };
            if rest.chars().next().is_some_and(char::is_alphanumeric) {
                continue;
            }
            let len = form.chars().count();
            if best.map_or(true, |(best_len, _, _)| len > best_len) {
                best = Some((len, key, rest));
            }
        }
    }
    best.map(|(_, key, rest)| (key, rest))
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let rest_start = chars.next().map_or(text.len(), |(idx, _)| idx);
    Some(&text[rest_start..])
}
