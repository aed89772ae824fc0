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

use async_trait::async_trait;
use rillflow_types::{Pipeline, Vertex};
use thiserror::Error;

/// Cluster API error kinds.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} `{namespace}/{name}` does not exist")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Any other error returned by the cluster API server.
    #[error("internal error: `{message}` cause: `{cause}`")]
    Internal {
        message: String,
        cause: anyhow::Error,
    },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Read/patch access to the cluster objects the autoscaler acts on.
///
/// Implementations are provided by the hosting controller binary and are
/// assumed to be thread-safe. Not-found must be reported as
/// [`ClusterError::NotFound`] so the autoscaler can distinguish a deleted
/// object from a transient failure.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    async fn get_vertex(&self, namespace: &str, name: &str) -> ClusterResult<Vertex>;

    async fn get_pipeline(&self, namespace: &str, name: &str) -> ClusterResult<Pipeline>;

    /// Applies a JSON merge patch to the vertex object.
    async fn patch_vertex(
        &self,
        namespace: &str,
        name: &str,
        merge_patch: serde_json::Value,
    ) -> ClusterResult<()>;
}
