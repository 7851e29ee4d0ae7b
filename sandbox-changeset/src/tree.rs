//! Compressed directory report of a change set.
//!
//! Algorithm:
//! 1. Sort changes by full path.
//! 2. Build a raw tree under an empty-named root, one node per directory
//!    segment, leaves renamed to their final segment.
//! 3. Collapse single-child directory chains below the root into one node
//!    named `a/b/c`.

use sandbox_core::{DirTree, FileChange};

/// Build the compressed [`DirTree`] for `changes`.
///
/// Directories and files appear in the order of the sorted path set.
pub fn as_tree(changes: &[FileChange]) -> DirTree {
    let mut sorted: Vec<&FileChange> = changes.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut root = DirTree::named("");
    for change in sorted {
        insert(&mut root, change);
    }

    root.dirs = std::mem::take(&mut root.dirs)
        .into_iter()
        .map(compress)
        .collect();
    root
}

fn insert(root: &mut DirTree, change: &FileChange) {
    let mut segments: Vec<&str> = change.path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file_name) = segments.pop() else {
        return;
    };

    let mut node = root;
    for segment in segments {
        let index = match node.dirs.iter().position(|d| d.name == segment) {
            Some(index) => index,
            None => {
                node.dirs.push(DirTree::named(segment));
                node.dirs.len() - 1
            }
        };
        node = &mut node.dirs[index];
    }

    node.files.push(FileChange {
        action: change.action,
        path: file_name.to_string(),
        content: change.content.clone(),
    });
}

fn compress(mut node: DirTree) -> DirTree {
    while node.files.is_empty() && node.dirs.len() == 1 {
        let Some(mut child) = node.dirs.pop() else {
            break;
        };
        child.name = format!("{}/{}", node.name, child.name);
        node = child;
    }
    node.dirs = std::mem::take(&mut node.dirs)
        .into_iter()
        .map(compress)
        .collect();
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_core::FileAction;

    fn added(path: &str) -> FileChange {
        FileChange::new(FileAction::Added, path)
    }

    fn names(tree: &DirTree) -> Vec<&str> {
        tree.dirs.iter().map(|d| d.name.as_str()).collect()
    }

    fn files(tree: &DirTree) -> Vec<&str> {
        tree.files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn single_chain_collapses_into_one_node() {
        let tree = as_tree(&[added("a/b/c/d.txt")]);
        assert_eq!(tree.name, "");
        assert_eq!(names(&tree), vec!["a/b/c"]);
        assert_eq!(files(&tree.dirs[0]), vec!["d.txt"]);
        assert!(tree.dirs[0].dirs.is_empty());
    }

    #[test]
    fn sibling_file_stops_compression() {
        let tree = as_tree(&[added("a/b/c/d.txt"), added("a/b/e.txt")]);
        assert_eq!(names(&tree), vec!["a/b"]);
        let ab = &tree.dirs[0];
        assert_eq!(files(ab), vec!["e.txt"]);
        assert_eq!(names(ab), vec!["c"]);
        assert_eq!(files(&ab.dirs[0]), vec!["d.txt"]);
    }

    #[test]
    fn root_is_never_merged_into_its_only_child() {
        let tree = as_tree(&[added("only/child.txt")]);
        assert_eq!(tree.name, "");
        assert_eq!(names(&tree), vec!["only"]);
    }

    #[test]
    fn top_level_files_stay_on_root() {
        let tree = as_tree(&[added("Procfile"), added("src/main.py")]);
        assert_eq!(files(&tree), vec!["Procfile"]);
        assert_eq!(names(&tree), vec!["src"]);
    }

    #[test]
    fn output_order_follows_sorted_paths() {
        let tree = as_tree(&[
            added("z/1.txt"),
            added("b.txt"),
            added("a/2.txt"),
            added("a.txt"),
            added("a/1.txt"),
        ]);
        assert_eq!(files(&tree), vec!["a.txt", "b.txt"]);
        assert_eq!(names(&tree), vec!["a", "z"]);
        assert_eq!(files(&tree.dirs[0]), vec!["1.txt", "2.txt"]);
    }

    #[test]
    fn branching_points_are_preserved_below_compressed_chain() {
        let tree = as_tree(&[added("x/y/p/1.txt"), added("x/y/q/r/2.txt")]);
        assert_eq!(names(&tree), vec!["x/y"]);
        let xy = &tree.dirs[0];
        assert!(xy.files.is_empty());
        assert_eq!(names(xy), vec!["p", "q/r"]);
    }

    #[test]
    fn content_and_action_survive_rewrite() {
        let mut change = FileChange::new(FileAction::Modified, "dir/app.py");
        change.content = "print('hi')".into();
        let tree = as_tree(&[change]);
        let leaf = &tree.dirs[0].files[0];
        assert_eq!(leaf.path, "app.py");
        assert_eq!(leaf.action, FileAction::Modified);
        assert_eq!(leaf.content, "print('hi')");
    }

    #[test]
    fn empty_change_set_gives_empty_root() {
        assert!(as_tree(&[]).is_empty());
    }
}
