//! `git diff --name-status` output parsing.
//!
//! Every line resolves to exactly one [`ParsedLine`]. Malformed lines are a
//! distinct outcome rather than an error: the diff keeps going without them.

use std::collections::HashSet;

use sandbox_core::{FileAction, FileChange};

/// Why a line could not be turned into a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedLine {
    /// No whitespace between status and path.
    MissingSeparator,
    /// Status present, path empty.
    EmptyPath,
    /// A status code other than `A`, `M` or `D`.
    UnknownStatus(String),
}

/// Outcome of parsing one name-status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Change(FileChange),
    /// Blank line or an ignored path prefix.
    Ignored,
    Malformed(MalformedLine),
}

/// Parse a single `<status><whitespace><path>` line.
pub fn parse_line(line: &str, ignore_prefixes: &[String]) -> ParsedLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return ParsedLine::Ignored;
    }

    let Some((code, path)) = line.split_once(char::is_whitespace) else {
        return ParsedLine::Malformed(MalformedLine::MissingSeparator);
    };
    let path = path.trim_start();
    if path.is_empty() {
        return ParsedLine::Malformed(MalformedLine::EmptyPath);
    }
    let Some(action) = FileAction::from_code(code) else {
        return ParsedLine::Malformed(MalformedLine::UnknownStatus(code.to_string()));
    };
    if ignore_prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    {
        return ParsedLine::Ignored;
    }

    ParsedLine::Change(FileChange::new(action, path))
}

/// Parse full name-status output, keeping the first change per path.
pub fn parse_name_status(output: &str, ignore_prefixes: &[String]) -> Vec<FileChange> {
    let mut seen = HashSet::new();
    let mut changes = Vec::new();
    for line in output.lines() {
        match parse_line(line, ignore_prefixes) {
            ParsedLine::Change(change) => {
                if seen.insert(change.path.clone()) {
                    changes.push(change);
                }
            }
            ParsedLine::Ignored => {}
            ParsedLine::Malformed(reason) => {
                tracing::debug!("skipping unparsable diff line {line:?}: {reason:?}");
            }
        }
    }
    changes
}
