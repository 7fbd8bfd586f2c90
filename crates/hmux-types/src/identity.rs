use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A routing key.
///
/// Hashes should be SHORT and UNIQUE: the string is used verbatim as the
/// distributed lock key and, behind a prefix, as the mapping key in the
/// coordination store. Equality is exact string equality and no structure is
/// ever parsed out of it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    /// Wrap any string as a hash.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Wrap a string, rejecting the empty string.
    pub fn try_new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TypeError::EmptyHash);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key for this hash under `prefix`.
    pub fn key_with_prefix(&self, prefix: &str) -> String {
        let mut key = String::with_capacity(prefix.len() + self.0.len());
        key.push_str(prefix);
        key.push_str(&self.0);
        key
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({:?})", self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Hash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Hash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable identifier of a backend store, usually its `host:port` address.
///
/// This is the value persisted in mapping records, so it must stay the same
/// across process restarts for existing assignments to keep resolving.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(addr: impl Into<String>) -> Result<Self, TypeError> {
        let addr = addr.into();
        if addr.is_empty() {
            return Err(TypeError::EmptyBackendId);
        }
        Ok(Self(addr))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendId({})", self.0)
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BackendId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BackendId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn key_with_prefix_concatenates() {
        let hash = Hash::new("some_hash");
        assert_eq!(hash.key_with_prefix("hmk-"), "hmk-some_hash");
        assert_eq!(hash.key_with_prefix(""), "some_hash");
    }

    #[test]
    fn display_is_the_raw_string() {
        let hash = Hash::from("user:42");
        assert_eq!(hash.to_string(), "user:42");
        assert_eq!(format!("{hash:?}"), "Hash(\"user:42\")");
    }

    #[test]
    fn try_new_rejects_empty() {
        assert_eq!(Hash::try_new(""), Err(TypeError::EmptyHash));
        assert!(Hash::try_new("x").is_ok());
    }

    #[test]
    fn backend_id_rejects_empty() {
        assert_eq!(BackendId::new(""), Err(TypeError::EmptyBackendId));
        let id = BackendId::new("localhost:6379").unwrap();
        assert_eq!(id.as_str(), "localhost:6379");
    }

    #[test]
    fn backend_id_borrows_as_str_for_map_lookups() {
        let mut map = HashMap::new();
        map.insert(BackendId::new("10.0.0.1:6379").unwrap(), 1);
        assert_eq!(map.get("10.0.0.1:6379"), Some(&1));
        assert_eq!(map.get("10.0.0.2:6379"), None);
    }

    #[test]
    fn serde_is_transparent() {
        let hash = Hash::new("abc");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    proptest::proptest! {
        #[test]
        fn prefixed_key_strips_back_to_hash(prefix in "[a-z-]{0,8}", raw in "[a-zA-Z0-9_:]{1,24}") {
            let hash = Hash::new(raw.clone());
            let key = hash.key_with_prefix(&prefix);
            proptest::prop_assert_eq!(key.strip_prefix(prefix.as_str()), Some(raw.as_str()));
        }
    }
}
