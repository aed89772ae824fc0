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

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const DEFAULT_MIN_REPLICAS: i32 = 0;
const DEFAULT_MAX_REPLICAS: i32 = 50;
const DEFAULT_COOLDOWN_SECONDS: u32 = 90;
const DEFAULT_ZERO_REPLICA_SLEEP_SECONDS: u32 = 120;
const DEFAULT_TARGET_PROCESSING_SECONDS: u32 = 20;
const DEFAULT_TARGET_BUFFER_AVAILABILITY: u32 = 50;
const DEFAULT_REPLICAS_PER_SCALE: u32 = 2;

/// Object metadata shared by all cluster objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub namespace: String,
    pub name: String,
    /// A non-`None` deletion timestamp means the object is terminating.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deletion_timestamp: Option<OffsetDateTime>,
}

/// A single processing stage of a pipeline.
///
/// A vertex owns zero or more input buffers (zero if it is a source) and
/// produces to the buffers of its downstream vertices. The object name is
/// `<pipeline>-<logical name>`; `spec.name` holds the logical name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub metadata: Metadata,
    pub spec: VertexSpec,
    #[serde(default)]
    pub status: VertexStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexSpec {
    pub pipeline_name: String,
    /// Logical name of the vertex within its pipeline.
    pub name: String,
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub partitions: Option<i32>,
    #[serde(default)]
    pub scale: Scale,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udf: Option<UdfSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpSource>,
}

/// An in-process HTTP source. Such a source serves requests from within the
/// vertex pods themselves and cannot be scaled by replica count alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSource {
    #[serde(default)]
    pub service: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkSpec {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdfSpec {
    /// Present on reduce UDFs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBy {
    #[serde(default)]
    pub keyed: bool,
}

/// Autoscaling settings of a vertex. All fields are optional; the getters
/// apply the platform defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scale {
    /// Disables autoscaling for this vertex entirely.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub min: Option<i32>,
    #[serde(default)]
    pub max: Option<i32>,
    /// Minimum wall-clock gap between two scale actions on the same vertex.
    #[serde(default)]
    pub cooldown_seconds: Option<u32>,
    /// How long a zero-replica vertex sleeps before being scaled up to one
    /// replica to peek for new work.
    #[serde(default)]
    pub zero_replica_sleep_seconds: Option<u32>,
    /// For sources: the time window within which pending messages should be
    /// drained at the current processing rate.
    #[serde(default)]
    pub target_processing_seconds: Option<u32>,
    /// For non-sources: the percentage of buffer length to keep free.
    #[serde(default)]
    pub target_buffer_availability: Option<u32>,
    /// Maximum replica count change applied by one scaling operation.
    #[serde(default)]
    pub replicas_per_scale: Option<u32>,
}

impl Scale {
    pub fn get_min_replicas(&self) -> i32 {
        self.min.unwrap_or(DEFAULT_MIN_REPLICAS).max(0)
    }

    /// Never below [`Scale::get_min_replicas`].
    pub fn get_max_replicas(&self) -> i32 {
        self.max
            .unwrap_or(DEFAULT_MAX_REPLICAS)
            .max(self.get_min_replicas())
    }

    pub fn get_cooldown_seconds(&self) -> u32 {
        self.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECONDS)
    }

    pub fn get_zero_replica_sleep_seconds(&self) -> u32 {
        self.zero_replica_sleep_seconds
            .unwrap_or(DEFAULT_ZERO_REPLICA_SLEEP_SECONDS)
    }

    pub fn get_target_processing_seconds(&self) -> u32 {
        self.target_processing_seconds
            .unwrap_or(DEFAULT_TARGET_PROCESSING_SECONDS)
    }

    pub fn get_target_buffer_availability(&self) -> u32 {
        self.target_buffer_availability
            .unwrap_or(DEFAULT_TARGET_BUFFER_AVAILABILITY)
    }

    pub fn get_replicas_per_scale(&self) -> u32 {
        self.replicas_per_scale
            .unwrap_or(DEFAULT_REPLICAS_PER_SCALE)
            .max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexPhase {
    #[default]
    Unknown,
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexStatus {
    #[serde(default)]
    pub phase: VertexPhase,
    /// Observed replica count, trailing `spec.replicas` while a scale
    /// operation is being applied.
    #[serde(default)]
    pub replicas: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_scaled_at: Option<OffsetDateTime>,
}

impl Vertex {
    /// The unique `<namespace>/<name>` key of this vertex.
    pub fn key(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Desired replica count from the spec, defaulting to 1.
    pub fn get_replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }

    pub fn is_a_source(&self) -> bool {
        self.spec.source.is_some()
    }

    pub fn is_a_sink(&self) -> bool {
        self.spec.sink.is_some()
    }

    pub fn is_udf(&self) -> bool {
        self.spec.udf.is_some()
    }

    pub fn is_reduce_udf(&self) -> bool {
        self.spec
            .udf
            .as_ref()
            .map_or(false, |udf| udf.group_by.is_some())
    }

    fn has_http_source(&self) -> bool {
        self.spec
            .source
            .as_ref()
            .map_or(false, |source| source.http.is_some())
    }

    /// Whether the autoscaler may act on this vertex. An HTTP source serves
    /// in-process requests, so adding replicas would not drain its backlog.
    pub fn scalable(&self) -> bool {
        if self.spec.scale.disabled {
            return false;
        }
        self.is_udf() || self.is_a_sink() || (self.is_a_source() && !self.has_http_source())
    }

    pub fn get_partition_count(&self) -> usize {
        self.spec.partitions.unwrap_or(1).max(1) as usize
    }

    /// Names of the input buffers owned by this vertex, one per partition.
    /// Sources read from the outside world and own no buffers.
    pub fn owned_buffers(&self) -> Vec<String> {
        if self.is_a_source() {
            return Vec::new();
        }
        (0..self.get_partition_count())
            .map(|partition| {
                format!(
                    "{}-{}-{}-{}",
                    self.metadata.namespace, self.spec.pipeline_name, self.spec.name, partition
                )
            })
            .collect()
    }
}
