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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Label under which the daemon reports the smoothed rate and pending values
/// used for autoscaling. Other labels carry per-lookback-window variants.
pub const DEFAULT_METRICS_LABEL: &str = "default";

/// Reported when the buffer implementation cannot compute a pending count.
pub const PENDING_NOT_AVAILABLE: i64 = i64::MIN;

/// Reported when the daemon has not accumulated enough samples for a rate.
pub const RATE_NOT_AVAILABLE: f64 = f64::MIN;

/// Runtime metrics of one partition of a vertex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexMetrics {
    /// Exponentially-smoothed throughput per label, messages/second.
    #[serde(default)]
    pub processing_rates: HashMap<String, f64>,
    /// Messages visible to the vertex but not yet acknowledged, per label.
    #[serde(default)]
    pub pendings: HashMap<String, i64>,
}

/// Occupancy information of one inter-step buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferInfo {
    /// Physical capacity of the buffer.
    #[serde(default)]
    pub buffer_length: Option<i64>,
    /// Fraction of the capacity the system is willing to use, in [0, 1].
    #[serde(default)]
    pub buffer_usage_limit: Option<f64>,
}
