//! Structure hashing (SPEC_FULL.md §3, §4.1.c): hex SHA-256 over
//! `col1:type1,col2:type2,…` in declaration order.

use sha2::{Digest, Sha256};

/// Compute the structure hash for an ordered list of `(column, type)` pairs.
///
/// Invariant under whitespace and constraint reordering because only column
/// names and type names feed the digest; changes whenever a name or type
/// name changes.
pub fn structure_hash<'a, I>(columns: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let body = columns
        .into_iter()
        .map(|(name, ty)| format!("{name}:{ty}"))
        .collect::<Vec<_>>()
        .join(",");

    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let cols = [("id", "int8"), ("name", "text")];
        assert_eq!(structure_hash(cols), structure_hash(cols));
    }

    #[test]
    fn hash_changes_when_a_type_changes() {
        let a = structure_hash([("id", "int8"), ("name", "text")]);
        let b = structure_hash([("id", "int8"), ("name", "varchar")]);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_changes_when_a_column_name_changes() {
        let a = structure_hash([("id", "int8")]);
        let b = structure_hash([("identifier", "int8")]);
        assert_ne!(a, b);
    }
}
