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

//! Shared data model of the Rillflow dataflow platform.
//!
//! A [`Pipeline`] is a DAG of processing stages ([`Vertex`]) connected by
//! directed [`Edge`]s. Each vertex runs one or more worker replicas that read
//! messages from partitioned inter-step buffers, process them, and write to
//! the buffers of downstream vertices. The types in this crate are read-only
//! snapshots of the cluster objects, plus the wire types served by each
//! pipeline's daemon service.

mod daemon;
mod pipeline;
mod vertex;

pub use daemon::{
    BufferInfo, VertexMetrics, DEFAULT_METRICS_LABEL, PENDING_NOT_AVAILABLE, RATE_NOT_AVAILABLE,
};
pub use pipeline::{
    Edge, Lifecycle, Pipeline, PipelinePhase, PipelineSpec, DAEMON_SERVICE_PORT,
};
pub use vertex::{
    GroupBy, HttpSource, Metadata, Scale, SinkSpec, SourceSpec, UdfSpec, Vertex, VertexPhase,
    VertexSpec, VertexStatus,
};
