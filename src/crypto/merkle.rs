//! Merkle tree implementation for transaction verification
//!
//! Builds a binary hash tree over transaction IDs. Leaves and internal
//! nodes are hex strings; a pair combines as SHA-256 over the
//! concatenated hex characters, and an odd level duplicates its last
//! element. Proofs let a light client verify inclusion without the
//! full transaction list.

use super::hash::sha256_hex;

/// Calculate the merkle root of an ordered list of transaction IDs.
/// The root of an empty list is the empty string.
pub fn build_merkle_root(tx_ids: &[String]) -> String {
    if tx_ids.is_empty() {
        return String::new();
    }

    let mut level: Vec<String> = tx_ids.to_vec();

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            let last = level[level.len() - 1].clone();
            level.push(last);
        }

        let mut next_level = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            next_level.push(combine_hashes(&pair[0], &pair[1]));
        }
        level = next_level;
    }

    level.remove(0)
}

/// Hash the concatenation of two hex-string nodes
fn combine_hashes(left: &str, right: &str) -> String {
    let mut combined = String::with_capacity(left.len() + right.len());
    combined.push_str(left);
    combined.push_str(right);
    sha256_hex(combined.as_bytes())
}

/// Generate a merkle proof for the transaction at `index`: the sibling
/// hashes encountered on the path to the root. Returns `None` when the
/// index is out of range.
pub fn generate_merkle_proof(tx_ids: &[String], index: usize) -> Option<Vec<String>> {
    if index >= tx_ids.len() {
        return None;
    }

    let mut proof = Vec::new();
    let mut level: Vec<String> = tx_ids.to_vec();
    let mut current_index = index;

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            let last = level[level.len() - 1].clone();
            level.push(last);
        }

        let sibling_index = if current_index % 2 == 0 {
            current_index + 1
        } else {
            current_index - 1
        };
        proof.push(level[sibling_index].clone());

        let mut next_level = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            next_level.push(combine_hashes(&pair[0], &pair[1]));
        }
        level = next_level;
        current_index /= 2;
    }

    Some(proof)
}

/// Verify that a transaction ID is included under a merkle root.
/// Bit `k` of `index` selects the concatenation side at proof step `k`:
/// zero means the running hash is the left operand.
pub fn verify_inclusion(tx_id: &str, merkle_root: &str, proof: &[String], index: usize) -> bool {
    let mut current = tx_id.to_string();

    for (step, sibling) in proof.iter().enumerate() {
        current = if (index >> step) & 1 == 0 {
            combine_hashes(&current, sibling)
        } else {
            combine_hashes(sibling, &current)
        };
    }

    current == merkle_root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| sha256_hex(format!("tx{i}").as_bytes())).collect()
    }

    #[test]
    fn test_empty_merkle_root() {
        assert_eq!(build_merkle_root(&[]), "");
    }

    #[test]
    fn test_merkle_root_single() {
        let leaves = ids(1);
        assert_eq!(build_merkle_root(&leaves), leaves[0]);
    }

    #[test]
    fn test_merkle_root_two() {
        let leaves = ids(2);
        let expected = sha256_hex(format!("{}{}", leaves[0], leaves[1]).as_bytes());
        assert_eq!(build_merkle_root(&leaves), expected);
    }

    #[test]
    fn test_merkle_root_odd_duplicates_last() {
        // Three leaves behave as if the third were present twice
        let three = ids(3);
        let mut four = three.clone();
        four.push(three[2].clone());
        assert_eq!(build_merkle_root(&three), build_merkle_root(&four));
    }

    #[test]
    fn test_merkle_root_is_order_sensitive() {
        let leaves = ids(4);
        let mut reversed = leaves.clone();
        reversed.reverse();
        assert_ne!(build_merkle_root(&leaves), build_merkle_root(&reversed));
    }

    #[test]
    fn test_proof_verification_all_indexes() {
        for n in [1, 2, 3, 4, 5, 8] {
            let leaves = ids(n);
            let root = build_merkle_root(&leaves);
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = generate_merkle_proof(&leaves, i).unwrap();
                assert!(
                    verify_inclusion(leaf, &root, &proof, i),
                    "proof failed for index {i} of {n}"
                );
            }
        }
    }

    #[test]
    fn test_proof_rejects_wrong_leaf() {
        let leaves = ids(4);
        let root = build_merkle_root(&leaves);
        let proof = generate_merkle_proof(&leaves, 1).unwrap();
        assert!(!verify_inclusion(&leaves[2], &root, &proof, 1));
    }

    #[test]
    fn test_proof_index_out_of_range() {
        let leaves = ids(2);
        assert!(generate_merkle_proof(&leaves, 2).is_none());
    }
}
