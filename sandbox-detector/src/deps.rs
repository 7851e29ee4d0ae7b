//! Dependency manifest comparison.
//!
//! Two manifests are equal when their sets of trimmed, non-blank lines are
//! equal: reordering lines or adding blank lines is not a dependency change,
//! editing any character of any line is.

use std::io::ErrorKind;
use std::path::Path;

use sandbox_core::{FileAction, FileChange};

use crate::{io_err, DetectError};

/// Compare two manifest files line-set-wise.
pub fn compare(a: &Path, b: &Path) -> Result<bool, DetectError> {
    Ok(same_lines(&read(a)?, &read(b)?))
}

/// [`compare`] over in-memory contents.
pub fn same_lines(a: &str, b: &str) -> bool {
    normalized_lines(a) == normalized_lines(b)
}

/// Whether any of `manifests` differs between `old_dir` and `new_dir`.
///
/// A manifest missing from `new_dir` is skipped. A manifest present in
/// `new_dir` that cannot be compared (e.g. absent from `old_dir`) counts as
/// changed. Checking stops at the first change.
pub fn dependencies_changed(old_dir: &Path, new_dir: &Path, manifests: &[String]) -> bool {
    for name in manifests {
        let new = new_dir.join(name);
        match std::fs::metadata(&new) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(_) => return true,
        }

        if !matches!(compare(&old_dir.join(name), &new), Ok(true)) {
            return true;
        }
    }
    false
}

/// Whether a change set touches any of `manifests` in a way that counts as
/// a dependency change.
///
/// Only added or modified manifests are considered. `baseline` yields a
/// manifest's content as of the last recorded baseline and `current` its
/// content now; a manifest either side cannot produce counts as changed.
pub fn manifests_changed<B, C>(
    changes: &[FileChange],
    manifests: &[String],
    baseline: B,
    current: C,
) -> bool
where
    B: Fn(&str) -> Option<String>,
    C: Fn(&str) -> Option<String>,
{
    changes
        .iter()
        .filter(|c| c.action != FileAction::Deleted)
        .filter(|c| manifests.iter().any(|m| *m == c.path))
        .any(|c| match (baseline(&c.path), current(&c.path)) {
            (Some(old), Some(new)) => !same_lines(&old, &new),
            _ => true,
        })
}

fn read(path: &Path) -> Result<String, DetectError> {
    std::fs::read_to_string(path).map_err(|e| io_err(path, e))
}

fn normalized_lines(content: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines.sort_unstable();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn pair(a: &str, b: &str) -> (TempDir, bool) {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("a"), a).expect("write a");
        fs::write(dir.path().join("b"), b).expect("write b");
        let equal = compare(&dir.path().join("a"), &dir.path().join("b")).expect("compare");
        (dir, equal)
    }

    #[rstest]
    #[case("flask==2.0\nrequests\n", "requests\n\n\nflask==2.0\n")]
    #[case("  numpy  \n", "numpy")]
    #[case("", "\n\n   \n")]
    fn order_and_blank_lines_are_ignored(#[case] a: &str, #[case] b: &str) {
        let (_dir, equal) = pair(a, b);
        assert!(equal);
    }

    #[rstest]
    #[case("flask==2.0\nrequests\n", "flask==2.1\nrequests\n")]
    #[case("requests\n", "requests\nrequests\n")]
    #[case("a\n", "")]
    fn content_changes_are_detected(#[case] a: &str, #[case] b: &str) {
        let (_dir, equal) = pair(a, b);
        assert!(!equal);
    }

    #[test]
    fn compare_missing_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("b"), "x").expect("write");
        let err = compare(&dir.path().join("a"), &dir.path().join("b")).unwrap_err();
        assert!(matches!(err, DetectError::Io { .. }));
    }

    fn manifests() -> Vec<String> {
        vec!["requirements.txt".into(), "package.json".into()]
    }

    #[test]
    fn absent_new_manifest_is_not_a_change() {
        let old = TempDir::new().expect("old");
        let new = TempDir::new().expect("new");
        fs::write(old.path().join("requirements.txt"), "flask\n").expect("write");
        assert!(!dependencies_changed(old.path(), new.path(), &manifests()));
    }

    #[test]
    fn manifest_new_to_the_tree_is_a_change() {
        let old = TempDir::new().expect("old");
        let new = TempDir::new().expect("new");
        fs::write(new.path().join("package.json"), "{}\n").expect("write");
        assert!(dependencies_changed(old.path(), new.path(), &manifests()));
    }

    #[test]
    fn reordered_manifest_is_not_a_change() {
        let old = TempDir::new().expect("old");
        let new = TempDir::new().expect("new");
        fs::write(old.path().join("requirements.txt"), "a\nb\n").expect("write");
        fs::write(new.path().join("requirements.txt"), "b\n\na\n").expect("write");
        assert!(!dependencies_changed(old.path(), new.path(), &manifests()));
    }

    fn change(action: FileAction, path: &str) -> FileChange {
        FileChange::new(action, path)
    }

    fn lookup<'a>(table: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |path| {
            table
                .iter()
                .find(|(p, _)| *p == path)
                .map(|(_, content)| content.to_string())
        }
    }

    #[test]
    fn reordered_manifest_in_change_set_is_not_a_change() {
        let changes = [change(FileAction::Modified, "requirements.txt")];
        let baseline = [("requirements.txt", "a\nb\n")];
        let current = [("requirements.txt", "b\n\na\n")];
        assert!(!manifests_changed(&changes, &manifests(), lookup(&baseline), lookup(&current)));
    }

    #[test]
    fn edited_or_new_manifest_in_change_set_is_a_change() {
        let edited = [change(FileAction::Modified, "requirements.txt")];
        let baseline = [("requirements.txt", "flask==2.0\n")];
        let current = [("requirements.txt", "flask==2.1\n")];
        assert!(manifests_changed(&edited, &manifests(), lookup(&baseline), lookup(&current)));

        let added = [change(FileAction::Added, "package.json")];
        let current = [("package.json", "{}\n")];
        assert!(manifests_changed(&added, &manifests(), lookup(&[]), lookup(&current)));
    }

    #[test]
    fn deleted_manifests_and_other_files_are_ignored() {
        let changes = [
            change(FileAction::Deleted, "requirements.txt"),
            change(FileAction::Modified, "app.py"),
            change(FileAction::Added, "vendor/package.json"),
        ];
        assert!(!manifests_changed(&changes, &manifests(), lookup(&[]), lookup(&[])));
    }

    #[test]
    fn any_differing_manifest_triggers() {
        let old = TempDir::new().expect("old");
        let new = TempDir::new().expect("new");
        fs::write(old.path().join("requirements.txt"), "a\n").expect("write");
        fs::write(new.path().join("requirements.txt"), "a\n").expect("write");
        fs::write(old.path().join("package.json"), "{\"x\":1}\n").expect("write");
        fs::write(new.path().join("package.json"), "{\"x\":2}\n").expect("write");
        assert!(dependencies_changed(old.path(), new.path(), &manifests()));
    }
}
