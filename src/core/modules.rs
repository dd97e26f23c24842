/// Module paths — dotted names for sentences and module-scoped macros.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("relative reference '{reference}' from '{current}' ascends beyond the root module")]
    BeyondRoot { current: String, reference: String },
    #[error("no segment named '{segment}' to backtrack to in '{current}'")]
    BacktrackNotFound { current: String, segment: String },
    #[error("cannot read module directory '{}': {message}", path.display())]
    Walk { path: PathBuf, message: String },
}

fn segments(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('.').collect();
    if parts.last() == Some(&"") {
        parts.pop();
    }
    parts
}

/// Resolve `reference` against the module `current`, returning an absolute path.
///
/// An absolute reference is used as-is. A reference starting with `.` is
/// relative: every empty segment ascends one level from `current`, so `.x`
/// names a sibling of `current` and `..x` a sibling of its parent. A `<name`
/// segment backtracks until the innermost segment equals `name`; a bare `<`
/// goes back to the root.
///
/// ```
/// use mika_engine::core::modules::resolve;
///
/// assert_eq!(resolve("a.b.c", ".").unwrap(), "a.b");
/// assert_eq!(resolve("a.b.c", ".x").unwrap(), "a.b.x");
/// assert_eq!(resolve("a.b.c.d", ".<b.e").unwrap(), "a.b.e");
/// assert!(resolve("a", "..x").is_err());
/// ```
pub fn resolve(current: &str, reference: &str) -> Result<String, PathError> {
    let refs = segments(reference);
    let work: Vec<&str> = if refs.first() == Some(&"") {
        segments(current).into_iter().chain(refs).collect()
    } else {
        refs
    };

    let mut stack: Vec<&str> = Vec::with_capacity(work.len());
    for segment in work {
        if segment.is_empty() {
            if stack.pop().is_none() {
                return Err(PathError::BeyondRoot {
                    current: current.to_string(),
                    reference: reference.to_string(),
                });
            }
        } else if let Some(target) = segment.strip_prefix('<') {
            if target.is_empty() {
                stack.clear();
                continue;
            }
            while stack.last() != Some(&target) {
                if stack.pop().is_none() {
                    return Err(PathError::BacktrackNotFound {
                        current: current.to_string(),
                        segment: target.to_string(),
                    });
                }
            }
        } else {
            stack.push(segment);
        }
    }
    Ok(stack.join("."))
}

/// Join a child name onto a package, treating `""` as the root package.
pub fn join(package: &str, name: &str) -> String {
    match (package.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => package.to_string(),
        (false, false) => format!("{package}.{name}"),
    }
}

/// Map every file below `root` to a dotted module name under `root_package`:
/// `dir/sub/file.ron` becomes `root_package.dir.sub.file`.
pub fn walk_modules(root: &Path, root_package: &str) -> Result<BTreeMap<String, PathBuf>, PathError> {
    let mut modules = BTreeMap::new();
    walk_dir(root, root_package, &mut modules)?;
    Ok(modules)
}

fn walk_dir(dir: &Path, package: &str, modules: &mut BTreeMap<String, PathBuf>) -> Result<(), PathError> {
    let walk_err = |e: std::io::Error| PathError::Walk {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };
    for entry in std::fs::read_dir(dir).map_err(walk_err)? {
        let path = entry.map_err(walk_err)?.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.is_dir() {
            walk_dir(&path, &join(package, stem), modules)?;
        } else {
            modules.insert(join(package, stem), path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dot_ascends_one_level() {
        assert_eq!(resolve("a.b.c", ".").unwrap(), "a.b");
    }

    #[test]
    fn relative_names_are_siblings() {
        assert_eq!(resolve("a.b.c", ".x").unwrap(), "a.b.x");
        assert_eq!(resolve("a.b.c", "..x").unwrap(), "a.x");
        assert_eq!(resolve("a.b.c", ".x.y").unwrap(), "a.b.x.y");
    }

    #[test]
    fn absolute_reference_ignores_current() {
        assert_eq!(resolve("a.b.c", "q.r").unwrap(), "q.r");
        assert_eq!(resolve("", "q").unwrap(), "q");
    }

    #[test]
    fn backtrack() {
        assert_eq!(resolve("a.b.c.d", ".<b.e").unwrap(), "a.b.e");
        assert_eq!(resolve("a.b.c", ".<.z").unwrap(), "z");
        assert_eq!(
            resolve("a.b", ".<q"),
            Err(PathError::BacktrackNotFound {
                current: "a.b".to_string(),
                segment: "q".to_string()
            })
        );
    }

    #[test]
    fn ascending_beyond_root_is_an_error() {
        assert!(matches!(resolve("a", "..x"), Err(PathError::BeyondRoot { .. })));
        assert!(matches!(resolve("", "."), Err(PathError::BeyondRoot { .. })));
    }

    #[test]
    fn trailing_dot_is_dropped() {
        assert_eq!(resolve("a.b.", ".x").unwrap(), "a.x");
        assert_eq!(resolve("a", "b.").unwrap(), "b");
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a", "b"), "a.b");
        assert_eq!(join("a", ""), "a");
    }

    #[test]
    fn walk_modules_maps_files_to_dotted_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("chapter")).unwrap();
        std::fs::write(dir.path().join("intro.ron"), "{}").unwrap();
        std::fs::write(dir.path().join("chapter").join("hall.ron"), "{}").unwrap();

        let modules = walk_modules(dir.path(), "game").unwrap();
        let names: Vec<_> = modules.keys().cloned().collect();
        assert_eq!(names, vec!["game.chapter.hall", "game.intro"]);
        assert!(modules["game.intro"].ends_with("intro.ron"));
    }
}
