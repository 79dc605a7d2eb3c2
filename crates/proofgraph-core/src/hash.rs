use sha2::{Digest, Sha256};

use crate::types::ChildStatement;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Content hash of an ordered group of children. Length-prefixed framing so
/// `("ab", "c")` and `("a", "bc")` can never collide.
pub fn child_statement_hash(children: &[ChildStatement]) -> String {
    let mut hasher = Sha256::new();
    for child in children {
        hasher.update((child.id.len() as u64).to_le_bytes());
        hasher.update(child.id.as_bytes());
        hasher.update((child.statement.len() as u64).to_le_bytes());
        hasher.update(child.statement.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Deterministic parent node id derived from the group's content hash, so
/// identity never depends on completion order or timestamps.
pub fn parent_id_for(child_hash: &str) -> String {
    format!("p-{}", &child_hash[..16.min(child_hash.len())])
}

/// Stable lexicographic tie-break key for grouping candidate selection.
pub fn id_tiebreak_hash(id: &str) -> String {
    sha256_hex(id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(id: &str, statement: &str) -> ChildStatement {
        ChildStatement {
            id: id.to_string(),
            statement: statement.to_string(),
        }
    }

    #[test]
    fn hash_is_order_sensitive() {
        let a = child_statement_hash(&[child("l1", "A"), child("l2", "B")]);
        let b = child_statement_hash(&[child("l2", "B"), child("l1", "A")]);
        assert_ne!(a, b);
    }

    #[test]
    fn framing_prevents_boundary_collisions() {
        let a = child_statement_hash(&[child("ab", "c")]);
        let b = child_statement_hash(&[child("a", "bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn parent_id_is_stable() {
        let hash = child_statement_hash(&[child("l1", "A")]);
        assert_eq!(parent_id_for(&hash), parent_id_for(&hash));
        assert!(parent_id_for(&hash).starts_with("p-"));
        assert_eq!(parent_id_for(&hash).len(), 18);
    }
}
