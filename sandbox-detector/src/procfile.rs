//! Procfile parsing.
//!
//! ```text
//! # comment
//! web: gunicorn app:app --bind 0.0.0.0:$PORT
//! worker: celery -A tasks worker
//! ```
//!
//! Only the first `:` separates type from command, so commands may contain
//! colons of their own.

use std::collections::HashSet;
use std::path::Path;

use sandbox_core::types::invalid_process_types;
use sandbox_core::ProcessDescriptor;

use crate::{io_err, DetectError};

/// Read and parse the Procfile at `path`.
pub fn read_procfile(path: &Path) -> Result<Vec<ProcessDescriptor>, DetectError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_procfile(path, &content)
}

/// Parse Procfile `content`; `path` is only used in error messages.
pub fn parse_procfile(path: &Path, content: &str) -> Result<Vec<ProcessDescriptor>, DetectError> {
    let mut descriptors = Vec::new();
    let mut seen = HashSet::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_error = |message: String| DetectError::ParseError {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        };

        let Some((process_type, command)) = line.split_once(':') else {
            return Err(parse_error("expected '<type>: <command>'".to_string()));
        };
        let process_type = process_type.trim();
        let command = command.trim();
        if command.is_empty() {
            return Err(parse_error(format!("process type '{process_type}' has no command")));
        }
        if !seen.insert(process_type.to_string()) {
            return Err(parse_error(format!("duplicate process type '{process_type}'")));
        }
        descriptors.push(ProcessDescriptor::new(process_type, command));
    }

    let invalid = invalid_process_types(&descriptors);
    if !invalid.is_empty() {
        return Err(DetectError::InvalidProcessTypes {
            path: path.to_path_buf(),
            types: invalid,
        });
    }
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn procfile() -> PathBuf {
        PathBuf::from("/app/Procfile")
    }

    #[test]
    fn parses_types_in_file_order() {
        let content = "# processes\nweb: gunicorn app:app\n\nworker:  celery worker \n";
        let parsed = parse_procfile(&procfile(), content).expect("parse");
        assert_eq!(
            parsed,
            vec![
                ProcessDescriptor::new("web", "gunicorn app:app"),
                ProcessDescriptor::new("worker", "celery worker"),
            ]
        );
    }

    #[test]
    fn line_without_separator_reports_line_number() {
        let err = parse_procfile(&procfile(), "web: ok\njust a command\n").unwrap_err();
        match err {
            DetectError::ParseError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_types_are_rejected() {
        let err = parse_procfile(&procfile(), "web: a\nweb: b\n").unwrap_err();
        assert!(err.to_string().contains("duplicate process type 'web'"));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(parse_procfile(&procfile(), "web:\n").is_err());
    }

    #[test]
    fn reserved_characters_in_types_are_listed() {
        let err = parse_procfile(&procfile(), "a|b: x\nweb: y\nc&d: z\n").unwrap_err();
        match err {
            DetectError::InvalidProcessTypes { types, .. } => {
                assert_eq!(types, vec!["a|b".to_string(), "c&d".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = read_procfile(&dir.path().join("Procfile")).unwrap_err();
        assert!(matches!(err, DetectError::Io { .. }));
    }
}
