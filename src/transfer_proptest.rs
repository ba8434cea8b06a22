//! Property-based tests for directory flatten/merge.
//!
//! Trees are generated from disjoint name sets for files (`*.txt`) and
//! directories (`d*`), so any generated set of paths is a valid tree.

#[cfg(test)]
mod proptest_tests {
    use crate::transfer::flatten_merge;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn tree() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
        let path = (
            prop::collection::vec("d[0-2]", 0..3),
            "f[0-3]\\.txt",
        )
            .prop_map(|(dirs, file)| {
                let mut parts = dirs;
                parts.push(file);
                parts.join("/")
            });
        prop::collection::btree_map(path, prop::collection::vec(any::<u8>(), 0..64), 0..12)
    }

    fn write_tree(root: &Path, files: &BTreeMap<String, Vec<u8>>) {
        fs::create_dir_all(root).unwrap();
        for (path, content) in files {
            let target = root.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
    }

    fn top_level(path: &str) -> &str {
        path.split('/').next().unwrap_or(path)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Property: every staged entry lands in the destination intact and
        /// the staging directory is gone
        #[test]
        fn merge_moves_every_entry(staged in tree()) {
            let temp_dir = TempDir::new().unwrap();
            let src = temp_dir.path().join("staging");
            let dst = temp_dir.path().join("dest");
            write_tree(&src, &staged);
            fs::create_dir_all(&dst).unwrap();

            flatten_merge(&src, &dst).unwrap();

            prop_assert!(!src.exists());
            for (path, content) in &staged {
                prop_assert_eq!(&fs::read(dst.join(path)).unwrap(), content);
            }
            let expected: BTreeSet<&str> = staged.keys().map(|p| top_level(p)).collect();
            let actual: BTreeSet<String> = fs::read_dir(&dst)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            prop_assert_eq!(actual.len(), expected.len());
        }

        /// Property: staged entries win over existing ones, and entries with
        /// names not staged are left alone
        #[test]
        fn merge_staged_entries_win(staged in tree(), existing in tree()) {
            let temp_dir = TempDir::new().unwrap();
            let src = temp_dir.path().join("staging");
            let dst = temp_dir.path().join("dest");
            write_tree(&src, &staged);
            write_tree(&dst, &existing);

            flatten_merge(&src, &dst).unwrap();

            let staged_names: BTreeSet<&str> = staged.keys().map(|p| top_level(p)).collect();
            for (path, content) in &staged {
                prop_assert_eq!(&fs::read(dst.join(path)).unwrap(), content);
            }
            for (path, content) in &existing {
                let target = dst.join(path);
                if staged_names.contains(top_level(path)) {
                    if !staged.contains_key(path) {
                        prop_assert!(!target.exists());
                    }
                } else {
                    prop_assert_eq!(&fs::read(&target).unwrap(), content);
                }
            }
        }
    }
}
