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
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::daemon::DaemonClient;

/// LRU pool of daemon clients keyed by daemon service URL.
///
/// An entry leaving the pool (capacity eviction, replacement by a same-key
/// insert, or a shutdown purge) is closed exactly once, after the pool lock
/// is released. Two evaluations racing on a cold URL may both construct a
/// client; the pool keeps whichever insertion lands last and closes the
/// other. In-flight RPCs hold their own `Arc`, so an evicted client stays
/// usable until they resolve.
pub(crate) struct DaemonClientPool {
    inner: Mutex<LruCache<String, Arc<dyn DaemonClient>>>,
}

impl DaemonClientPool {
    pub fn with_capacity(capacity: usize) -> Self {
        DaemonClientPool {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    pub fn get(&self, url: &str) -> Option<Arc<dyn DaemonClient>> {
        self.inner.lock().unwrap().get(url).cloned()
    }

    pub async fn insert(&self, url: String, client: Arc<dyn DaemonClient>) {
        let evicted = self.inner.lock().unwrap().push(url, client);
        if let Some((_, evicted_client)) = evicted {
            evicted_client.close().await;
        }
    }

    /// Drains the pool, closing every client. Called on scheduler shutdown.
    pub async fn purge(&self) {
        let drained: Vec<Arc<dyn DaemonClient>> = {
            let mut inner = self.inner.lock().unwrap();
            let mut drained = Vec::with_capacity(inner.len());
            while let Some((_, client)) = inner.pop_lru() {
                drained.push(client);
            }
            drained
        };
        for client in drained {
            client.close().await;
        }
    }
}
