//! Merkle tree over hex-encoded leaf hashes, used for the participant
//! allowlist and for batching ballot commitments.
//!
//! Pairs are sorted before hashing at every level, so an inclusion path
//! needs no left/right flags and path verification uses the exact same rule
//! as root computation.

use crate::*;

fn hash_pair(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut payload = String::with_capacity(lo.len() + hi.len());
    payload.push_str(lo);
    payload.push_str(hi);
    sha256_hex(payload.as_bytes())
}

/// Root over already-hashed leaves. The last node of an odd level is paired
/// with itself.
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return sha256_hex(b"");
    }

    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => hash_pair(a, b),
                [a] => hash_pair(a, a),
                _ => unreachable!(),
            })
            .collect();
    }
    level.remove(0)
}

/// Sibling hashes from the leaf at `index` up to the root.
pub fn merkle_path(leaves: &[String], index: usize) -> Option<Vec<String>> {
    if index >= leaves.len() {
        return None;
    }

    let mut path = Vec::new();
    let mut level: Vec<String> = leaves.to_vec();
    let mut position = index;

    while level.len() > 1 {
        let sibling = if position % 2 == 0 {
            level.get(position + 1).unwrap_or(&level[position])
        } else {
            &level[position - 1]
        };
        path.push(sibling.clone());

        level = level
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => hash_pair(a, b),
                [a] => hash_pair(a, a),
                _ => unreachable!(),
            })
            .collect();
        position /= 2;
    }

    Some(path)
}

/// Check an inclusion path against a root.
pub fn verify_merkle_path(leaf: &str, path: &[String], root: &str) -> bool {
    let mut current = leaf.to_string();
    for sibling in path {
        current = hash_pair(&current, sibling);
    }
    current == root
}
