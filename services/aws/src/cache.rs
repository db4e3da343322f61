// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::{CacheKey, CredentialHandle};
use dsauth_core::time::{now, DateTime};
use std::collections::HashMap;
use std::sync::RwLock;

/// A credentials handle together with the instant it stops being served.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    credentials: CredentialHandle,
    expiration: Option<DateTime>,
}

impl CachedEntry {
    /// Create a new entry. `None` means the entry never expires.
    pub fn new(credentials: CredentialHandle, expiration: Option<DateTime>) -> Self {
        Self {
            credentials,
            expiration,
        }
    }

    /// The cached handle.
    pub fn credentials(&self) -> &CredentialHandle {
        &self.credentials
    }

    /// When the entry stops being served.
    pub fn expiration(&self) -> Option<DateTime> {
        self.expiration
    }

    /// Whether the entry may still be served.
    pub fn is_valid(&self) -> bool {
        match self.expiration {
            Some(t) => t > now(),
            None => true,
        }
    }
}

/// Process wide cache of credential handles keyed by [`CacheKey`].
///
/// Reads take a shared lock, writes an exclusive one. Two concurrent misses
/// for the same key may both build a handle; the last write wins.
#[derive(Debug, Default)]
pub struct CredentialCache {
    entries: RwLock<HashMap<CacheKey, CachedEntry>>,
}

impl CredentialCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle for `key` if present and not expired.
    ///
    /// Expired entries are left in place and overwritten by the next `put`.
    pub fn get(&self, key: &CacheKey) -> Option<CredentialHandle> {
        let entries = self.entries.read().expect("lock poisoned");
        entries
            .get(key)
            .filter(|entry| entry.is_valid())
            .map(|entry| entry.credentials.clone())
    }

    /// Insert or replace the entry for `key`. `None` never expires.
    pub fn put(
        &self,
        key: CacheKey,
        credentials: CredentialHandle,
        expiration: Option<DateTime>,
    ) {
        let mut entries = self.entries.write().expect("lock poisoned");
        entries.insert(key, CachedEntry::new(credentials, expiration));
    }

    /// Return the entry for `key` regardless of its expiration.
    pub fn peek(&self, key: &CacheKey) -> Option<CachedEntry> {
        self.entries.read().expect("lock poisoned").get(key).cloned()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuthType, DatasourceSettings, ProviderChain};
    use dsauth_core::time::delta;
    use dsauth_core::{Context, Credentials};
    use std::sync::Arc;
    use std::time::Duration;

    fn key(profile: &str) -> CacheKey {
        DatasourceSettings {
            auth_type: AuthType::Profile,
            profile: profile.to_string(),
            ..Default::default()
        }
        .cache_key()
    }

    fn handle() -> CredentialHandle {
        Credentials::new(Context::new(), ProviderChain::new())
    }

    #[test]
    fn test_get_returns_same_handle() {
        let cache = CredentialCache::new();
        let h = handle();
        cache.put(key("a"), h.clone(), None);

        let got = cache.get(&key("a")).unwrap();
        assert!(got.ptr_eq(&h));
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn test_expired_entry_is_not_served() {
        let cache = CredentialCache::new();
        let past = now() - delta(Duration::from_secs(1));
        cache.put(key("a"), handle(), Some(past));

        assert!(cache.get(&key("a")).is_none());
        assert_eq!(Some(past), cache.peek(&key("a")).unwrap().expiration());
        assert_eq!(1, cache.len());
    }

    #[test]
    fn test_put_replaces_entry() {
        let cache = CredentialCache::new();
        let first = handle();
        let second = handle();
        cache.put(key("a"), first.clone(), None);
        cache.put(key("a"), second.clone(), None);

        let got = cache.get(&key("a")).unwrap();
        assert!(got.ptr_eq(&second));
        assert!(!got.ptr_eq(&first));
        assert_eq!(1, cache.len());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(CredentialCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let k = key(&format!("p{}", i % 2));
                    cache.put(k.clone(), handle(), None);
                    assert!(cache.get(&k).is_some());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(2, cache.len());
    }
}
