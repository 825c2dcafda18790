//! Reads against the append-only trees (note hashes, L1-to-L2 messages).
//!
//! These categories have no pending counterpart: the claimed value must sit
//! in the settled tree, at the claimed index, under the recorded root.

use merkle_forest::hashing::{root_from_sibling_path, SiblingPath};

use crate::{
    validation::{requests::TreeLeafReadRequest, ReadRequestKind, ValidationError},
    world::TreeSnapshot,
};

pub(crate) fn validate_tree_leaf_reads(
    category: ReadRequestKind,
    requests: &[TreeLeafReadRequest],
    hints: &[SiblingPath],
    snapshot: TreeSnapshot,
) -> Result<(), ValidationError> {
    for (index, request) in requests.iter().enumerate() {
        let path = hints
            .get(index)
            .ok_or(ValidationError::MissingHint { category, index })?;
        if root_from_sibling_path(request.value, request.leaf_index, path) != snapshot.root {
            return Err(ValidationError::BadMembershipProof { category, index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ethereum_types::H256;
    use merkle_forest::append_tree::AppendOnlyTree;

    use super::*;

    fn tree_with_leaves(values: &[u64]) -> (AppendOnlyTree, TreeSnapshot) {
        let mut tree = AppendOnlyTree::new(4);
        tree.extend(values.iter().map(|v| H256::from_low_u64_be(*v)))
            .unwrap();
        let snapshot = TreeSnapshot {
            root: tree.root(),
            next_available_leaf_index: tree.size(),
        };
        (tree, snapshot)
    }

    #[test]
    fn settled_reads_verify_against_the_root() {
        let (tree, snapshot) = tree_with_leaves(&[10, 20, 30]);
        let requests = vec![
            TreeLeafReadRequest {
                value: H256::from_low_u64_be(20),
                leaf_index: 1,
                counter: 1,
            },
            TreeLeafReadRequest {
                value: H256::from_low_u64_be(30),
                leaf_index: 2,
                counter: 2,
            },
        ];
        let hints = vec![
            tree.sibling_path(1).unwrap(),
            tree.sibling_path(2).unwrap(),
        ];

        assert_eq!(
            validate_tree_leaf_reads(ReadRequestKind::NoteHash, &requests, &hints, snapshot),
            Ok(())
        );
    }

    #[test]
    fn a_wrong_value_or_index_fails_the_proof() {
        let (tree, snapshot) = tree_with_leaves(&[10, 20, 30]);
        let hints = vec![tree.sibling_path(1).unwrap()];

        let wrong_value = vec![TreeLeafReadRequest {
            value: H256::from_low_u64_be(21),
            leaf_index: 1,
            counter: 1,
        }];
        assert_eq!(
            validate_tree_leaf_reads(ReadRequestKind::NoteHash, &wrong_value, &hints, snapshot),
            Err(ValidationError::BadMembershipProof {
                category: ReadRequestKind::NoteHash,
                index: 0,
            })
        );

        let wrong_index = vec![TreeLeafReadRequest {
            value: H256::from_low_u64_be(20),
            leaf_index: 2,
            counter: 1,
        }];
        assert_eq!(
            validate_tree_leaf_reads(
                ReadRequestKind::L1ToL2Message,
                &wrong_index,
                &hints,
                snapshot
            ),
            Err(ValidationError::BadMembershipProof {
                category: ReadRequestKind::L1ToL2Message,
                index: 0,
            })
        );
    }

    #[test]
    fn a_read_without_a_hint_is_rejected() {
        let (_, snapshot) = tree_with_leaves(&[10]);
        let requests = vec![TreeLeafReadRequest {
            value: H256::from_low_u64_be(10),
            leaf_index: 0,
            counter: 1,
        }];

        assert_eq!(
            validate_tree_leaf_reads(ReadRequestKind::NoteHash, &requests, &[], snapshot),
            Err(ValidationError::MissingHint {
                category: ReadRequestKind::NoteHash,
                index: 0,
            })
        );
    }
}
