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

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::Metadata;

/// Port of the per-pipeline daemon service.
pub const DAEMON_SERVICE_PORT: u16 = 4327;

/// A directed edge between two vertices, identified by their logical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    #[default]
    Unknown,
    Running,
    Paused,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    #[serde(default)]
    pub desired_phase: Option<PipelinePhase>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

/// A DAG of vertices. Each pipeline exposes one daemon service serving
/// runtime metrics for its vertices and buffers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub metadata: Metadata,
    pub spec: PipelineSpec,
}

impl Pipeline {
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn get_desired_phase(&self) -> PipelinePhase {
        self.spec
            .lifecycle
            .desired_phase
            .unwrap_or(PipelinePhase::Running)
    }

    pub fn get_daemon_service_url(&self) -> String {
        format!(
            "{}-daemon-svc.{}.svc:{}",
            self.metadata.name, self.metadata.namespace, DAEMON_SERVICE_PORT
        )
    }

    /// Cluster object name of a member vertex, from its logical name.
    pub fn vertex_object_name(&self, vertex_name: &str) -> String {
        format!("{}-{}", self.metadata.name, vertex_name)
    }

    /// All edges transitively reachable downstream of the given vertex.
    /// Edges whose `from` is the vertex itself are its direct edges.
    pub fn get_downstream_edges(&self, vertex_name: &str) -> Vec<Edge> {
        let mut downstream_edges = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier = vec![vertex_name];
        while let Some(from) = frontier.pop() {
            if !visited.insert(from) {
                continue;
            }
            for edge in &self.spec.edges {
                if edge.from == from {
                    downstream_edges.push(edge.clone());
                    frontier.push(&edge.to);
                }
            }
        }
        downstream_edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(edges: &[(&str, &str)]) -> Pipeline {
        Pipeline {
            metadata: Metadata {
                namespace: "default".to_string(),
                name: "my-pipeline".to_string(),
                deletion_timestamp: None,
            },
            spec: PipelineSpec {
                edges: edges
                    .iter()
                    .map(|(from, to)| Edge {
                        from: from.to_string(),
                        to: to.to_string(),
                    })
                    .collect(),
                lifecycle: Lifecycle::default(),
            },
        }
    }

    #[test]
    fn test_desired_phase_defaults_to_running() {
        let pipeline = pipeline(&[]);
        assert_eq!(pipeline.get_desired_phase(), PipelinePhase::Running);
    }

    #[test]
    fn test_daemon_service_url() {
        let pipeline = pipeline(&[]);
        assert_eq!(
            pipeline.get_daemon_service_url(),
            "my-pipeline-daemon-svc.default.svc:4327"
        );
    }

    #[test]
    fn test_vertex_object_name() {
        let pipeline = pipeline(&[]);
        assert_eq!(pipeline.vertex_object_name("cat"), "my-pipeline-cat");
    }

    #[test]
    fn test_downstream_edges() {
        // in -> cat -> out
        //         \-> audit
        let pipeline = pipeline(&[("in", "cat"), ("cat", "out"), ("cat", "audit")]);

        let from_in = pipeline.get_downstream_edges("in");
        assert_eq!(from_in.len(), 3);
        assert_eq!(from_in[0].from, "in");

        let from_cat = pipeline.get_downstream_edges("cat");
        assert_eq!(from_cat.len(), 2);
        assert!(from_cat.iter().all(|edge| edge.from == "cat"));

        assert!(pipeline.get_downstream_edges("out").is_empty());
        assert!(pipeline.get_downstream_edges("no-such-vertex").is_empty());
    }

    #[test]
    fn test_downstream_edges_terminates_on_cycle() {
        let pipeline = pipeline(&[("a", "b"), ("b", "a")]);
        let edges = pipeline.get_downstream_edges("a");
        assert_eq!(edges.len(), 2);
    }
}
