//! Local directory search
//!
//! Walks each directory for `.yaml`/`.yml` files, reads only the type header
//! of every document, and fully parses the first one whose kind and name
//! match. Unreadable files are skipped with a warning. A miss is `None`;
//! the caller decides whether that is fatal.

use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::document::{split_documents, type_meta};

const API_VERSION: &str = "tekton.dev/v1";

/// Text of the first `tekton.dev/v1` document of `kind` named `name`.
pub fn find_document(dirs: &[PathBuf], kind: &str, name: &str) -> Option<String> {
    dirs.iter().find_map(|dir| find_in_dir(dir, kind, name))
}

fn find_in_dir(root: &Path, kind: &str, name: &str) -> Option<String> {
    if !root.exists() {
        trace!(dir = %root.display(), "Task directory does not exist");
        return None;
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_yaml(entry.path()) {
            continue;
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %entry.path().display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };
        for doc in split_documents(&content) {
            let Some(meta) = type_meta(doc) else {
                continue;
            };
            if meta.kind == kind && meta.api_version == API_VERSION && meta.name() == name {
                debug!(%kind, %name, file = %entry.path().display(), "Found in task directory");
                return Some(doc.to_string());
            }
        }
    }
    None
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_finds_task_in_nested_multi_document_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("tasks/build")).unwrap();
        fs::write(
            dir.path().join("tasks/build/all.yml"),
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: build
---
apiVersion: tekton.dev/v1
kind: Task
metadata:
  name: build
spec:
  params:
    - name: image
"#,
        )
        .unwrap();

        let doc = find_document(&[dir.path().to_path_buf()], "Task", "build").unwrap();
        assert!(doc.contains("kind: Task"));
        assert!(doc.contains("name: image"));
    }

    #[test]
    fn test_ignores_other_versions_and_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("old.yaml"),
            "apiVersion: tekton.dev/v1beta1\nkind: Task\nmetadata:\n  name: lint\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("notes.txt"),
            "apiVersion: tekton.dev/v1\nkind: Task\nmetadata:\n  name: lint\n",
        )
        .unwrap();

        let found = find_document(&[dir.path().to_path_buf()], "Task", "lint");
        assert!(found.is_none());
    }

    #[test]
    fn test_missing_directory_is_a_miss() {
        let found = find_document(&[PathBuf::from("/nonexistent/tekcheck")], "Task", "x");
        assert!(found.is_none());
    }

    #[test]
    fn test_first_directory_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let task = |step: &str| {
            format!(
                "apiVersion: tekton.dev/v1\nkind: Task\nmetadata:\n  name: lint\nspec:\n  description: {}\n",
                step
            )
        };
        fs::write(first.path().join("lint.yaml"), task("first")).unwrap();
        fs::write(second.path().join("lint.yaml"), task("second")).unwrap();

        let doc = find_document(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            "Task",
            "lint",
        )
        .unwrap();
        assert!(doc.contains("first"));
    }

    #[test]
    fn test_unreadable_file_does_not_stop_search() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a-binary.yaml"), [0xff, 0xfe, 0x00, 0x41]).unwrap();
        fs::write(
            dir.path().join("build.yaml"),
            "apiVersion: tekton.dev/v1\nkind: Task\nmetadata:\n  name: build\n",
        )
        .unwrap();

        let doc = find_document(&[dir.path().to_path_buf()], "Task", "build");
        assert!(doc.is_some_and(|d| d.contains("name: build")));
    }
}
