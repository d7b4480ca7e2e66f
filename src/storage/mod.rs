//! Keyed persistent collections.
//!
//! Tracks, tiles and regions each live in their own [`Collection`]. There are
//! no transactions across collections; every write replaces one record.

pub mod dir;
#[cfg(test)]
mod flaky;
pub mod memory;

use async_trait::async_trait;

use crate::Result;

pub use dir::DirCollection;
#[cfg(test)]
pub(crate) use flaky::FlakyCollection;
pub use memory::MemoryCollection;

/// A flat key/value collection of opaque records.
///
/// Keys are short ASCII identifiers (`[A-Za-z0-9_-]`); implementations may
/// reject anything else.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Get a record by key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace a record
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove a record; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// All keys currently stored, in no particular order
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove every record
    async fn clear(&self) -> Result<()>;

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(crate::Error::Storage(format!("invalid record key {key:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("12-1194-1551").is_ok());
        assert!(validate_key("track_1700000000000").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a b").is_err());
    }
}
