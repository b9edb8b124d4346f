//! Set difference between the installed snapshot and a resolved pack.

use crate::types::{PackFile, Updates};
use std::cmp::Ordering;

/// Splits two lists into `(added, removed, unchanged)` with a sorted merge walk.
///
/// `cmp` orders elements; `Equal` means unchanged. Inputs are not mutated.
/// When both inputs are empty, all three outputs are empty; when one is,
/// the other side is returned as a clone.
pub fn diff_by<T, F>(old: &[T], new: &[T], cmp: F) -> (Vec<T>, Vec<T>, Vec<T>)
where
    T: Clone,
    F: Fn(&T, &T) -> Ordering,
{
    if old.is_empty() {
        return (new.to_vec(), Vec::new(), Vec::new());
    }
    if new.is_empty() {
        return (Vec::new(), old.to_vec(), Vec::new());
    }

    let mut old = old.to_vec();
    let mut new = new.to_vec();
    old.sort_by(&cmp);
    new.sort_by(&cmp);

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut unchanged = Vec::new();

    let mut old_iter = old.into_iter().peekable();
    let mut new_iter = new.into_iter().peekable();

    while let (Some(o), Some(n)) = (old_iter.peek(), new_iter.peek()) {
        match cmp(o, n) {
            Ordering::Less => removed.extend(old_iter.next()),
            Ordering::Greater => added.extend(new_iter.next()),
            Ordering::Equal => {
                old_iter.next();
                unchanged.extend(new_iter.next());
            }
        }
    }
    removed.extend(old_iter);
    added.extend(new_iter);

    (added, removed, unchanged)
}

/// Orders files by path. A path present on both sides with a different hash
/// sorts the old entry first, so it lands in removed and the new one in added.
fn compare_files(old: &PackFile, new: &PackFile) -> Ordering {
    match old.path.cmp(&new.path) {
        Ordering::Equal if old.hash != new.hash => Ordering::Less,
        ordering => ordering,
    }
}

/// Computes what must change to go from `old` to `new`.
pub fn diff(old: &[PackFile], new: &[PackFile]) -> Updates {
    let (added, removed, unchanged) = diff_by(old, new, compare_files);
    Updates {
        added,
        removed,
        unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Download, Side};
    use std::collections::BTreeSet;

    fn file(path: &str, hash: &str) -> PackFile {
        PackFile {
            path: path.to_string(),
            hash: hash.to_string(),
            hash_format: "sha1".to_string(),
            side: Side::Both,
            download: Download::Url {
                url: format!("https://pack.test/{}", path),
            },
        }
    }

    fn keys(files: &[PackFile]) -> BTreeSet<(String, String)> {
        files
            .iter()
            .map(|f| (f.path.clone(), f.hash.clone()))
            .collect()
    }

    #[test]
    fn test_diff_by_cases() {
        let cases: &[(&str, &[i32], &[i32], &[i32], &[i32])] = &[
            ("all-removed", &[1, 2, 3], &[], &[], &[1, 2, 3]),
            ("all-added", &[], &[1, 2, 3], &[1, 2, 3], &[]),
            ("old-pivot", &[2], &[0, 1, 3, 4], &[0, 1, 3, 4], &[2]),
            ("old-pivot2", &[2], &[0, 1, 2, 3, 4], &[0, 1, 3, 4], &[]),
            ("new-pivot", &[0, 1, 3, 4], &[2], &[2], &[0, 1, 3, 4]),
            ("new-pivot2", &[0, 1, 2, 3, 4], &[2], &[], &[0, 1, 3, 4]),
            ("W", &[1, 2, 3, 4, 5, 6], &[2, 5], &[], &[1, 3, 4, 6]),
            ("M", &[2, 5], &[1, 2, 3, 4, 5, 6], &[1, 3, 4, 6], &[]),
            ("unsorted", &[5, 1, 3], &[3, 4, 1], &[4], &[5]),
        ];

        for (name, old, new, want_added, want_removed) in cases {
            let (added, removed, _) = diff_by(old, new, i32::cmp);
            assert_eq!(added, *want_added, "{}: added", name);
            assert_eq!(removed, *want_removed, "{}: removed", name);
        }
    }

    #[test]
    fn test_diff_does_not_mutate_inputs() {
        let old = vec![3, 1, 2];
        let new = vec![2, 9, 0];
        let _ = diff_by(&old, &new, i32::cmp);
        assert_eq!(old, [3, 1, 2]);
        assert_eq!(new, [2, 9, 0]);
    }

    #[test]
    fn test_diff_identical_lists() {
        let list = vec![file("mods/b.jar", "2"), file("mods/a.jar", "1")];
        let updates = diff(&list, &list);
        assert!(updates.added.is_empty());
        assert!(updates.removed.is_empty());
        assert_eq!(keys(&updates.unchanged), keys(&list));
    }

    #[test]
    fn test_diff_against_empty() {
        let list = vec![file("mods/a.jar", "1"), file("mods/b.jar", "2")];

        let first_install = diff(&[], &list);
        assert_eq!(first_install.added, list);
        assert!(first_install.removed.is_empty() && first_install.unchanged.is_empty());

        let uninstall = diff(&list, &[]);
        assert_eq!(uninstall.removed, list);
        assert!(uninstall.added.is_empty() && uninstall.unchanged.is_empty());

        assert!(diff(&[], &[]).is_empty());
    }

    #[test]
    fn test_changed_hash_is_removed_then_added() {
        let old = vec![file("mods/a.jar", "1"), file("mods/b.jar", "2")];
        let new = vec![file("mods/a.jar", "1"), file("mods/b.jar", "3")];

        let updates = diff(&old, &new);
        assert_eq!(keys(&updates.unchanged), keys(&[file("mods/a.jar", "1")]));
        assert_eq!(keys(&updates.removed), keys(&[file("mods/b.jar", "2")]));
        assert_eq!(keys(&updates.added), keys(&[file("mods/b.jar", "3")]));
    }

    #[test]
    fn test_partitions_are_disjoint_and_cover_inputs() {
        let old = vec![
            file("a", "1"),
            file("b", "1"),
            file("c", "1"),
            file("e", "1"),
        ];
        let new = vec![
            file("b", "1"),
            file("c", "2"),
            file("d", "1"),
            file("e", "1"),
        ];
        let updates = diff(&old, &new);

        let added = keys(&updates.added);
        let removed = keys(&updates.removed);
        let unchanged = keys(&updates.unchanged);
        assert!(added.is_disjoint(&removed));
        assert!(added.is_disjoint(&unchanged));
        assert!(removed.is_disjoint(&unchanged));

        let new_side: BTreeSet<_> = added.union(&unchanged).cloned().collect();
        let old_side: BTreeSet<_> = removed.union(&unchanged).cloned().collect();
        assert_eq!(new_side, keys(&new));
        assert_eq!(old_side, keys(&old));
    }
}
