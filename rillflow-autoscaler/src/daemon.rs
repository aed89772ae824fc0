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

use std::sync::Arc;

use async_trait::async_trait;
use rillflow_types::{BufferInfo, VertexMetrics};

/// Client of a pipeline's daemon service, the RPC source of per-vertex,
/// per-partition runtime metrics and per-buffer occupancy.
///
/// Implementations should bound each call with a deadline no longer than the
/// scaler's rotation interval; a call outliving it would only produce a
/// value the next rotation recomputes anyway.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait DaemonClient: Send + Sync + 'static {
    /// Metrics for all partitions of a vertex, identified by its logical
    /// name within the pipeline.
    async fn get_vertex_metrics(
        &self,
        pipeline: &str,
        vertex: &str,
    ) -> anyhow::Result<Vec<VertexMetrics>>;

    async fn get_pipeline_buffer(
        &self,
        pipeline: &str,
        buffer: &str,
    ) -> anyhow::Result<BufferInfo>;

    /// Tears down the underlying connection. The client pool calls this
    /// exactly once per client, on eviction or purge.
    async fn close(&self);
}

/// Constructor for daemon clients, provided by the hosting binary.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait DaemonClientFactory: Send + Sync + 'static {
    async fn new_daemon_client(&self, url: &str) -> anyhow::Result<Arc<dyn DaemonClient>>;
}
