//! Property tests over generated trees: plan ordering, uniqueness, and age
//! filter soundness/completeness.

mod common;

use std::collections::HashSet;
use std::fs;
use std::time::SystemTime;

use proptest::prelude::*;

use fastpurge::prelude::*;

use common::{TestTree, days};

/// A generated tree shape: directory chains plus files placed at depths.
#[derive(Debug, Clone)]
struct TreeShape {
    dirs: Vec<Vec<u8>>,
    files: Vec<(Vec<u8>, u64)>, // (directory chain, age in days)
}

fn chain_to_rel(chain: &[u8]) -> String {
    let mut rel = String::from("victim");
    for seg in chain {
        rel.push_str(&format!("/d{seg}"));
    }
    rel
}

fn tree_shape() -> impl Strategy<Value = TreeShape> {
    let chain = proptest::collection::vec(0u8..3, 0..4);
    let dirs = proptest::collection::vec(chain.clone(), 0..12);
    let files = proptest::collection::vec((chain, 0u64..20), 0..24);
    (dirs, files).prop_map(|(dirs, files)| TreeShape { dirs, files })
}

fn build(shape: &TreeShape) -> (TestTree, std::path::PathBuf) {
    let tree = TestTree::new();
    let target = tree.create_dir("victim");
    for chain in &shape.dirs {
        tree.create_dir(&chain_to_rel(chain));
    }
    for (i, (chain, age)) in shape.files.iter().enumerate() {
        let rel = format!("{}/file_{i}.dat", chain_to_rel(chain));
        tree.create_file(&rel, b"payload", days(*age));
    }
    (tree, target)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Invariant: every child entry strictly precedes its parent directory.
    #[test]
    fn plans_are_bottom_up(shape in tree_shape()) {
        let (_tree, target) = build(&shape);
        let plan = scan(&target, &ScanOptions::default(), &LoggerHandle::disabled()).unwrap();

        for (parent_idx, parent) in plan.entries.iter().enumerate() {
            if !parent.is_dir {
                continue;
            }
            for (child_idx, child) in plan.entries.iter().enumerate() {
                if child_idx != parent_idx && child.path.starts_with(&parent.path) {
                    prop_assert!(
                        child_idx < parent_idx,
                        "{} at {} does not precede {} at {}",
                        child.path.display(), child_idx,
                        parent.path.display(), parent_idx
                    );
                }
            }
        }
        prop_assert!(plan.includes_root);
        prop_assert!(plan.entries.last().unwrap().depth == 0);
    }

    /// Invariant: no duplicate paths in any plan.
    #[test]
    fn plans_have_no_duplicates(shape in tree_shape()) {
        let (_tree, target) = build(&shape);
        let plan = scan(&target, &ScanOptions::default(), &LoggerHandle::disabled()).unwrap();

        let unique: HashSet<_> = plan.entries.iter().map(|e| &e.path).collect();
        prop_assert_eq!(unique.len(), plan.entries.len());
    }

    /// Age filter: planned files are old enough (soundness) and every
    /// old-enough file is planned (completeness).
    #[test]
    fn age_filter_is_sound_and_complete(shape in tree_shape(), keep_days in 1u64..15) {
        let (_tree, target) = build(&shape);
        let scan_start = SystemTime::now();
        let plan = scan(
            &target,
            &ScanOptions { keep_days: Some(keep_days), ..ScanOptions::default() },
            &LoggerHandle::disabled(),
        ).unwrap();

        let cutoff = scan_start - days(keep_days);
        // Sub-second tolerance for the gap between building and scanning.
        let tolerance = std::time::Duration::from_secs(5);

        let planned: HashSet<_> = plan.entries.iter().map(|e| e.path.clone()).collect();

        let mut stack = vec![target.clone()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let entry = entry.unwrap();
                let path = entry.path();
                if entry.file_type().unwrap().is_dir() {
                    // Directories are never planned under an age filter.
                    prop_assert!(!planned.contains(&path));
                    stack.push(path);
                    continue;
                }
                let mtime = entry.metadata().unwrap().modified().unwrap();
                if planned.contains(&path) {
                    // Soundness: planned implies older than the cutoff.
                    prop_assert!(
                        mtime <= cutoff + tolerance,
                        "young file {} was planned", path.display()
                    );
                } else {
                    // Completeness: unplanned implies young.
                    prop_assert!(
                        mtime + tolerance >= cutoff,
                        "old file {} was missed", path.display()
                    );
                }
            }
        }

        prop_assert!(!plan.includes_root);
    }

    /// Running any generated plan empties the tree completely.
    #[test]
    fn generated_trees_delete_cleanly(shape in tree_shape()) {
        let (_tree, target) = build(&shape);
        let plan = scan(&target, &ScanOptions::default(), &LoggerHandle::disabled()).unwrap();
        let to_delete = plan.totals.to_delete;

        let engine = Engine::new(
            Backend::new(DeletionMethod::Auto, true),
            LoggerHandle::disabled(),
        );
        let result = engine
            .run(plan, &EngineOptions::default(), &CancelToken::new(), &mut |_| {})
            .unwrap();

        prop_assert_eq!(result.failed, 0, "errors: {:?}", result.errors);
        prop_assert_eq!(result.deleted, to_delete);
        prop_assert!(!target.exists());
    }
}
