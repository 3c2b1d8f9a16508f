use proptest::prelude::*;
use vcs_hash::ObjectId;
use vcs_object::{FileMode, Tree, TreeEntry};

fn entry_strategy() -> impl Strategy<Value = TreeEntry> {
    let name = proptest::collection::vec(
        proptest::char::range('a', 'z').prop_map(|c| c as u8),
        1..12,
    );
    let mode = prop_oneof![
        Just(FileMode::Regular),
        Just(FileMode::Executable),
        Just(FileMode::Symlink),
        Just(FileMode::Gitlink),
        Just(FileMode::Tree),
    ];
    (name, mode, any::<[u8; 20]>()).prop_map(|(name, mode, digest)| TreeEntry {
        mode,
        name: name.into(),
        id: ObjectId::from_bytes(&digest).unwrap(),
    })
}

proptest! {
    #[test]
    fn serialize_parse_roundtrip(entries in proptest::collection::vec(entry_strategy(), 0..20)) {
        // Deduplicate by the canonical comparison; duplicate names are not
        // valid tree content.
        let mut tree = Tree { entries };
        tree.sort();
        tree.entries.dedup_by(|a, b| TreeEntry::cmp_entries(a, b) == std::cmp::Ordering::Equal);

        let bytes = tree.serialize_content();
        let parsed = Tree::parse(&bytes).unwrap();
        prop_assert_eq!(parsed.entries, tree.entries);
    }

    #[test]
    fn serialized_entries_are_strictly_ordered(entries in proptest::collection::vec(entry_strategy(), 2..20)) {
        let tree = Tree { entries };
        let bytes = tree.serialize_content();
        if let Ok(parsed) = Tree::parse(&bytes) {
            for pair in parsed.entries.windows(2) {
                prop_assert_eq!(
                    TreeEntry::cmp_entries(&pair[0], &pair[1]),
                    std::cmp::Ordering::Less
                );
            }
        }
        // Parse may fail only when random entries collide on a name; that
        // rejection is itself the contract.
    }
}
