// Copyright 2024-Present Rillflow, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::RwLock;

use lru::LruCache;

/// Ordered, de-duplicated set of the vertex keys (`namespace/name`)
/// currently eligible for autoscaling.
///
/// The dispatcher rotates the front entry to the back on every dispatch, so
/// under a steady watch set every key is visited with equal frequency. An
/// unbounded [`LruCache`] is a linked hash map, which gives O(1)
/// push-to-back, pop-from-front and removal by key; recency order doubles as
/// rotation order as long as entries are never touched by plain lookups
/// (`contains`/`peek` leave the order alone).
pub(crate) struct WatchList {
    inner: RwLock<LruCache<String, ()>>,
}

impl WatchList {
    pub fn new() -> Self {
        WatchList {
            inner: RwLock::new(LruCache::unbounded()),
        }
    }

    /// Idempotently appends `key` to the back of the rotation order.
    pub fn start_watching(&self, key: &str) {
        let mut inner = self.inner.write().unwrap();
        if !inner.contains(key) {
            inner.put(key.to_string(), ());
        }
    }

    /// Removes `key` if present; idempotent.
    pub fn stop_watching(&self, key: &str) {
        self.inner.write().unwrap().pop(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().unwrap().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }

    /// Atomically moves the front entry to the back and returns its key, or
    /// `None` when the list is empty.
    pub fn rotate_front(&self) -> Option<String> {
        let mut inner = self.inner.write().unwrap();
        let (key, ()) = inner.pop_lru()?;
        inner.put(key.clone(), ());
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::WatchList;

    #[test]
    fn test_start_watching_is_idempotent() {
        let watch_list = WatchList::new();
        watch_list.start_watching("default/my-pipeline-cat");
        watch_list.start_watching("default/my-pipeline-cat");
        assert_eq!(watch_list.len(), 1);
        assert!(watch_list.contains("default/my-pipeline-cat"));
    }

    #[test]
    fn test_stop_watching_is_idempotent() {
        let watch_list = WatchList::new();
        watch_list.start_watching("default/my-pipeline-cat");
        watch_list.stop_watching("default/my-pipeline-cat");
        watch_list.stop_watching("default/my-pipeline-cat");
        assert_eq!(watch_list.len(), 0);
        assert!(!watch_list.contains("default/my-pipeline-cat"));
        assert!(watch_list.is_empty());
    }

    #[test]
    fn test_rotation_is_fair() {
        let watch_list = WatchList::new();
        watch_list.start_watching("ns/a");
        watch_list.start_watching("ns/b");
        watch_list.start_watching("ns/c");

        // Two full revolutions preserve insertion order.
        let rotated: Vec<String> = (0..6)
            .map(|_| watch_list.rotate_front().unwrap())
            .collect();
        assert_eq!(rotated, ["ns/a", "ns/b", "ns/c", "ns/a", "ns/b", "ns/c"]);
        assert_eq!(watch_list.len(), 3);
    }

    #[test]
    fn test_re_adding_a_watched_key_does_not_reorder() {
        let watch_list = WatchList::new();
        watch_list.start_watching("ns/a");
        watch_list.start_watching("ns/b");
        watch_list.start_watching("ns/a");
        assert_eq!(watch_list.rotate_front().unwrap(), "ns/a");
        assert_eq!(watch_list.rotate_front().unwrap(), "ns/b");
    }

    #[test]
    fn test_new_keys_join_the_back() {
        let watch_list = WatchList::new();
        watch_list.start_watching("ns/a");
        watch_list.start_watching("ns/b");
        assert_eq!(watch_list.rotate_front().unwrap(), "ns/a");
        watch_list.start_watching("ns/c");
        // Remaining order: b, a (rotated), c (new).
        assert_eq!(watch_list.rotate_front().unwrap(), "ns/b");
        assert_eq!(watch_list.rotate_front().unwrap(), "ns/a");
        assert_eq!(watch_list.rotate_front().unwrap(), "ns/c");
    }

    #[test]
    fn test_rotate_front_on_empty_list() {
        let watch_list = WatchList::new();
        assert!(watch_list.rotate_front().is_none());
    }
}
