//! Content hashing over the canonical JSON encoding.

use dhtsim_env::{HashType, HoloHash};
use serde::Serialize;

/// Hashes any serializable value.
///
/// Struct fields serialize in declaration order and JSON objects keep their
/// keys sorted, so equal values always produce equal hashes.
pub fn hash_of<T: Serialize + ?Sized>(
    hash_type: HashType,
    content: &T,
) -> Result<HoloHash, serde_json::Error> {
    let bytes = serde_json::to_vec(content)?;
    Ok(HoloHash::digest(hash_type, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_key_order_independent() {
        let a = hash_of(HashType::Entry, &json!({"a": 1, "b": 2})).unwrap();
        let b = hash_of(HashType::Entry, &json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_differs_by_content() {
        let a = hash_of(HashType::Entry, &json!({"content": "hi"})).unwrap();
        let b = hash_of(HashType::Entry, &json!({"content": "ho"})).unwrap();
        assert_ne!(a, b);
    }
}
