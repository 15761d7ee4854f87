//! In-memory cache of identifier mappings and etags.
//!
//! The cache is owned by a single [crate::CatalogClient] and lives as long as it.
//! Entries never expire.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("key '{0}' not found in cache")]
    KeyNotFound(String),
}

/// Maps `uid -> mongo_id` and `mongo_id -> etag`.
///
/// The two mappings are independent.
/// A `uid` maps to at most one `mongo_id`, later inserts replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct IdentifierCache {
    mongo_ids: HashMap<String, String>,
    etags: HashMap<String, String>,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mongo_id(&mut self, uid: impl Into<String>, mongo_id: impl Into<String>) {
        let uid = uid.into();
        let mongo_id = mongo_id.into();
        debug!(%uid, %mongo_id, "caching mongo_id");
        self.mongo_ids.insert(uid, mongo_id);
    }

    pub fn get_mongo_id(&self, uid: &str) -> Result<&str, CacheError> {
        self.mongo_ids
            .get(uid)
            .map(String::as_str)
            .ok_or_else(|| CacheError::KeyNotFound(uid.to_string()))
    }

    pub fn has_mongo_id(&self, uid: &str) -> bool {
        self.mongo_ids.contains_key(uid)
    }

    /// Remove every uid mapping that points at `mongo_id`.
    ///
    /// Does nothing if no uid maps to it.
    pub fn delete_mongo_id_by_mongo_id(&mut self, mongo_id: &str) {
        self.mongo_ids.retain(|uid, mapped| {
            let matches = mapped == mongo_id;
            if matches {
                debug!(%uid, %mongo_id, "evicting mongo_id");
            }
            !matches
        });
    }

    pub fn set_etag(&mut self, mongo_id: impl Into<String>, etag: impl Into<String>) {
        let mongo_id = mongo_id.into();
        let etag = etag.into();
        debug!(%mongo_id, %etag, "caching etag");
        self.etags.insert(mongo_id, etag);
    }

    pub fn get_etag(&self, mongo_id: &str) -> Result<&str, CacheError> {
        self.etags
            .get(mongo_id)
            .map(String::as_str)
            .ok_or_else(|| CacheError::KeyNotFound(mongo_id.to_string()))
    }

    pub fn has_etag(&self, mongo_id: &str) -> bool {
        self.etags.contains_key(mongo_id)
    }

    /// Remove the etag cached for `mongo_id`.
    ///
    /// Fails if there is none, check [Self::has_etag] first.
    pub fn delete_etag(&mut self, mongo_id: &str) -> Result<(), CacheError> {
        match self.etags.remove(mongo_id) {
            Some(_) => {
                debug!(%mongo_id, "evicting etag");
                Ok(())
            },
            None => Err(CacheError::KeyNotFound(mongo_id.to_string())),
        }
    }

    /// Remove everything connected to `mongo_id`.
    pub fn clear_by_mongo_id(&mut self, mongo_id: &str) {
        if self.has_etag(mongo_id) {
            // cannot fail after the check above
            let _ = self.delete_etag(mongo_id);
        }
        self.delete_mongo_id_by_mongo_id(mongo_id);
    }

    /// Drop all cached entries.
    pub fn clear(&mut self) {
        self.mongo_ids.clear();
        self.etags.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.mongo_ids.is_empty() && self.etags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn mongo_id_last_write_wins() {
        let mut cache = IdentifierCache::new();
        cache.set_mongo_id("abc", "m1");
        cache.set_mongo_id("abc", "m2");

        assert!(cache.has_mongo_id("abc"));
        assert_eq!(cache.get_mongo_id("abc"), Ok("m2"));
    }

    #[test]
    fn missing_keys_fail() {
        let mut cache = IdentifierCache::new();

        assert!(!cache.has_mongo_id("abc"));
        assert_eq!(
            cache.get_mongo_id("abc"),
            Err(CacheError::KeyNotFound("abc".to_string()))
        );
        assert!(!cache.has_etag("m1"));
        assert_eq!(
            cache.get_etag("m1"),
            Err(CacheError::KeyNotFound("m1".to_string()))
        );
        assert_eq!(
            cache.delete_etag("m1"),
            Err(CacheError::KeyNotFound("m1".to_string()))
        );
    }

    #[test]
    fn etag_set_get_delete() {
        let mut cache = IdentifierCache::new();
        cache.set_etag("m1", "e1");
        cache.set_etag("m1", "e2");
        assert_eq!(cache.get_etag("m1"), Ok("e2"));

        cache.delete_etag("m1").unwrap();
        assert!(!cache.has_etag("m1"));
    }

    #[test]
    fn delete_by_mongo_id_removes_all_matching_uids() {
        let mut cache = IdentifierCache::new();
        cache.set_mongo_id("a", "m1");
        cache.set_mongo_id("b", "m1");
        cache.set_mongo_id("c", "m2");

        cache.delete_mongo_id_by_mongo_id("m1");

        assert!(!cache.has_mongo_id("a"));
        assert!(!cache.has_mongo_id("b"));
        assert_eq!(cache.get_mongo_id("c"), Ok("m2"));

        // unknown mongo_id is a no-op
        cache.delete_mongo_id_by_mongo_id("m3");
        assert_eq!(cache.get_mongo_id("c"), Ok("m2"));
    }

    #[test]
    fn clear_by_mongo_id_removes_both_mappings() {
        let mut cache = IdentifierCache::new();
        cache.set_mongo_id("a", "m1");
        cache.set_etag("m1", "e1");
        cache.set_mongo_id("b", "m2");
        cache.set_etag("m2", "e2");

        cache.clear_by_mongo_id("m1");

        assert!(!cache.has_mongo_id("a"));
        assert!(!cache.has_etag("m1"));
        assert_eq!(cache.get_mongo_id("b"), Ok("m2"));
        assert_eq!(cache.get_etag("m2"), Ok("e2"));
    }

    #[test]
    fn clear_by_mongo_id_without_entries_never_fails() {
        let mut cache = IdentifierCache::new();
        cache.clear_by_mongo_id("m1");

        // only one of the two mappings present
        cache.set_mongo_id("a", "m1");
        cache.clear_by_mongo_id("m1");
        cache.set_etag("m1", "e1");
        cache.clear_by_mongo_id("m1");

        assert!(cache.is_empty());
    }
}
