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

//! Vertex autoscaling for Rillflow pipelines.
//!
//! The [`Scaler`] owns a watch set of vertex keys fed by external
//! reconcilers. A dispatcher task rotates the set at an adaptive cadence and
//! hands each key to a fixed pool of workers over a rendezvous channel; each
//! worker re-evaluates its vertex against the live metrics served by the
//! owning pipeline's daemon service and patches the replica count through
//! the cluster API.
//!
//! Sources are sized to drain their pending backlog within a target number
//! of seconds. UDFs and sinks are sized to keep the free headroom of their
//! input buffers at a target level. Scale-ups are gated on back pressure in
//! the downstream vertices, observed through a shared cache of the latest
//! evaluation results, and both directions are bounded by per-vertex
//! min/max/step settings and a cooldown.
//!
//! The hosting binary provides the [`ClusterClient`] and
//! [`DaemonClientFactory`] implementations; this crate never talks to the
//! network itself.

mod back_pressure;
mod client_pool;
pub mod cluster;
pub mod daemon;
pub mod metrics;
mod metrics_cache;
mod scaler;
mod scaling_arbiter;
mod watch_list;

pub use cluster::{ClusterClient, ClusterError, ClusterResult};
pub use daemon::{DaemonClient, DaemonClientFactory};
pub use scaler::{key_of_vertex, Scaler, ScalerOptions};
