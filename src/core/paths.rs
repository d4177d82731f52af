//! Shared path manipulation utilities.

use std::env;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    // Try filesystem resolution first (handles symlinks).
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return strip_extended_prefix(&canonical);
    }

    // Fallback: syntactic normalization.
    normalize_syntactic(&absolute)
}

/// Remove the Windows `\\?\` verbatim prefix that `canonicalize` adds.
///
/// Comparisons and diagnostics use the plain form; the scanner re-applies the
/// extended-length prefix when it builds native path buffers.
pub fn strip_extended_prefix(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let raw = path.as_os_str().to_string_lossy();
        if let Some(rest) = raw.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{rest}"));
        }
        if let Some(rest) = raw.strip_prefix(r"\\?\") {
            return PathBuf::from(rest);
        }
    }
    path.to_path_buf()
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Case-fold one path component for platform comparison.
///
/// Windows filesystems compare case-insensitively; everywhere else the
/// component is used as-is.
#[must_use]
pub fn fold_component(component: &OsStr) -> String {
    let raw = component.to_string_lossy();
    if cfg!(windows) {
        raw.to_lowercase()
    } else {
        raw.into_owned()
    }
}

/// Split a path into case-folded components for prefix comparison.
///
/// Prefix and root components are folded too so that `c:\` and `C:\` compare
/// equal on Windows.
#[must_use]
pub fn folded_components(path: &Path) -> Vec<String> {
    path.components()
        .map(|c| fold_component(c.as_os_str()))
        .collect()
}

/// Whether `candidate` equals `base` or lies strictly inside it, using
/// platform case sensitivity.
#[must_use]
pub fn is_same_or_descendant(candidate: &Path, base: &Path) -> bool {
    let candidate = folded_components(candidate);
    let base = folded_components(base);
    candidate.len() >= base.len() && candidate[..base.len()] == base[..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_path_canonically() {
        let cwd = env::current_dir().unwrap();
        let resolved = resolve_absolute_path(Path::new("."));
        assert_eq!(
            resolved,
            strip_extended_prefix(&std::fs::canonicalize(&cwd).unwrap())
        );
    }

    #[test]
    fn normalizes_nonexistent_path_syntactically() {
        // /nonexistent/foo/../bar -> /nonexistent/bar
        #[cfg(unix)]
        let root = Path::new("/");
        #[cfg(windows)]
        let root = Path::new("C:\\");

        let input = root.join("nonexistent").join("foo").join("..").join("bar");
        let expected = root.join("nonexistent").join("bar");

        assert!(std::fs::canonicalize(&input).is_err());

        let resolved = resolve_absolute_path(&input);
        assert_eq!(resolved, expected);
    }

    #[test]
    fn handles_parent_at_root() {
        #[cfg(unix)]
        {
            let input = Path::new("/../foo");
            let resolved = normalize_syntactic(input);
            assert_eq!(resolved, Path::new("/foo"));
        }
    }

    #[test]
    fn descendant_check_matches_exact_and_nested() {
        let base = Path::new("/data/projects");
        assert!(is_same_or_descendant(Path::new("/data/projects"), base));
        assert!(is_same_or_descendant(
            Path::new("/data/projects/app/src"),
            base
        ));
        assert!(!is_same_or_descendant(Path::new("/data/project"), base));
        assert!(!is_same_or_descendant(Path::new("/data"), base));
    }

    #[cfg(windows)]
    #[test]
    fn descendant_check_folds_case_on_windows() {
        let base = Path::new(r"C:\Windows");
        assert!(is_same_or_descendant(Path::new(r"c:\windows\system32"), base));
    }

    #[cfg(windows)]
    #[test]
    fn strips_verbatim_prefix() {
        assert_eq!(
            strip_extended_prefix(Path::new(r"\\?\C:\Temp\x")),
            PathBuf::from(r"C:\Temp\x")
        );
        assert_eq!(
            strip_extended_prefix(Path::new(r"\\?\UNC\srv\share\x")),
            PathBuf::from(r"\\srv\share\x")
        );
    }
}
