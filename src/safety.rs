//! Target safety validation: protected-path rejection and interactive confirmation.
//!
//! Classification runs on canonical absolute paths. A target is refused when
//! it does not exist, resolves to a drive root, or touches the protected set
//! in either direction (the target sits inside a protected tree, or a
//! protected tree sits inside the target). Windows comparisons fold case and
//! normalize separators.

use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};

use crate::core::paths::{is_same_or_descendant, resolve_absolute_path};

/// Outcome of classifying a deletion target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    /// Target may be scanned and deleted.
    Safe,
    /// Target must be refused; reason is shown to the user.
    Unsafe {
        /// Human-readable refusal reason.
        reason: String,
    },
}

impl SafetyVerdict {
    /// Convenience predicate.
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

/// The minimum protected set for the build platform.
#[must_use]
pub fn protected_paths() -> Vec<PathBuf> {
    if cfg!(windows) {
        [
            r"C:\Windows",
            r"C:\Program Files",
            r"C:\Program Files (x86)",
            r"C:\Users",
            r"C:\ProgramData",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    } else {
        [
            "/", "/bin", "/etc", "/usr", "/var", "/home", "/root", "/boot", "/sys", "/proc",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    }
}

/// Whether a canonical path is a filesystem root (`/` or `X:\`).
#[must_use]
pub fn is_drive_root(path: &Path) -> bool {
    let mut components = path.components();
    match components.next() {
        Some(Component::RootDir) => components.next().is_none(),
        Some(Component::Prefix(_)) => {
            matches!(components.next(), Some(Component::RootDir)) && components.next().is_none()
        }
        _ => false,
    }
}

/// Classify a deletion target. Rules apply in order; first match wins.
#[must_use]
pub fn classify(path: &Path) -> SafetyVerdict {
    if !path.exists() {
        return SafetyVerdict::Unsafe {
            reason: "path does not exist".to_string(),
        };
    }

    let canonical = resolve_absolute_path(path);

    if is_drive_root(&canonical) {
        return SafetyVerdict::Unsafe {
            reason: "drive root".to_string(),
        };
    }

    for protected in protected_paths() {
        if is_same_or_descendant(&canonical, &protected)
            || is_same_or_descendant(&protected, &canonical)
        {
            return SafetyVerdict::Unsafe {
                reason: format!("protected path ({})", protected.display()),
            };
        }
    }

    SafetyVerdict::Safe
}

/// Ask the user to confirm a deletion.
///
/// `force=true` returns `true` without reading input. Otherwise the prompt
/// shows the canonical target and entry count (and a critical warning when
/// the target is a drive root), and only an explicit `yes` confirms.
/// Dry-runs still prompt. Reader and writer are injected so tests never
/// touch a real terminal.
pub fn confirm(
    path: &Path,
    entry_count: u64,
    dry_run: bool,
    force: bool,
    reader: &mut impl BufRead,
    writer: &mut impl Write,
) -> bool {
    if force {
        return true;
    }

    let canonical = resolve_absolute_path(path);

    if is_drive_root(&canonical) {
        let _ = writeln!(
            writer,
            "CRITICAL: target {} is a drive root. Everything on the volume would be destroyed.",
            canonical.display()
        );
    }

    let mode = if dry_run { " (dry-run)" } else { "" };
    let _ = writeln!(
        writer,
        "About to delete{mode}: {} ({entry_count} entries)",
        canonical.display()
    );
    let _ = write!(writer, "Type 'yes' to continue: ");
    let _ = writer.flush();

    let mut answer = String::new();
    if reader.read_line(&mut answer).is_err() {
        return false;
    }
    answer.trim().eq_ignore_ascii_case("yes")
}
