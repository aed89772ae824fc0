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

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

const METRICS_CACHE_CAPACITY: usize = 10_000;

const PENDING_KEY_SUFFIX: &str = "/pending";
const BUFFER_LENGTH_KEY_SUFFIX: &str = "/length";

/// Cross-vertex shared view of the latest aggregated pending count and
/// effective buffer length per vertex key, written by each evaluation and
/// read by sibling evaluations to classify downstream back pressure.
///
/// Entry freshness is bounded by the scheduler's rotation interval. Stale or
/// missing reads merely disable the back-pressure optimization for an edge;
/// no coordination happens here beyond the interior lock.
pub(crate) struct VertexMetricsCache {
    inner: Mutex<LruCache<String, i64>>,
}

impl VertexMetricsCache {
    pub fn new() -> Self {
        VertexMetricsCache {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(METRICS_CACHE_CAPACITY).unwrap(),
            )),
        }
    }

    pub fn record_pending(&self, vertex_key: &str, pending: i64) {
        self.inner
            .lock()
            .unwrap()
            .put(format!("{vertex_key}{PENDING_KEY_SUFFIX}"), pending);
    }

    pub fn pending(&self, vertex_key: &str) -> Option<i64> {
        self.inner
            .lock()
            .unwrap()
            .get(&format!("{vertex_key}{PENDING_KEY_SUFFIX}"))
            .copied()
    }

    pub fn record_buffer_length(&self, vertex_key: &str, buffer_length: i64) {
        self.inner
            .lock()
            .unwrap()
            .put(format!("{vertex_key}{BUFFER_LENGTH_KEY_SUFFIX}"), buffer_length);
    }

    pub fn buffer_length(&self, vertex_key: &str) -> Option<i64> {
        self.inner
            .lock()
            .unwrap()
            .get(&format!("{vertex_key}{BUFFER_LENGTH_KEY_SUFFIX}"))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read_back() {
        let cache = VertexMetricsCache::new();
        assert_eq!(cache.pending("ns/v"), None);
        assert_eq!(cache.buffer_length("ns/v"), None);

        cache.record_pending("ns/v", 42);
        cache.record_buffer_length("ns/v", 800);
        assert_eq!(cache.pending("ns/v"), Some(42));
        assert_eq!(cache.buffer_length("ns/v"), Some(800));

        // The two entries of a vertex do not collide.
        cache.record_pending("ns/v", 7);
        assert_eq!(cache.pending("ns/v"), Some(7));
        assert_eq!(cache.buffer_length("ns/v"), Some(800));
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = VertexMetricsCache::new();
        cache.record_pending("ns/evicted", 1);
        for i in 0..METRICS_CACHE_CAPACITY {
            cache.record_pending(&format!("ns/v{i}"), i as i64);
        }
        assert_eq!(cache.pending("ns/evicted"), None);
        assert_eq!(
            cache.pending(&format!("ns/v{}", METRICS_CACHE_CAPACITY - 1)),
            Some(METRICS_CACHE_CAPACITY as i64 - 1)
        );
    }
}
