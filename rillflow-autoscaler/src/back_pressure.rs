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

use rillflow_types::{Pipeline, Vertex};

use crate::metrics_cache::VertexMetricsCache;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BackPressure {
    /// A directly connected downstream vertex is under pressure.
    pub direct: bool,
    /// Some vertex further downstream is under pressure.
    pub downstream: bool,
}

/// Classifies downstream buffer pressure for a vertex from the pending and
/// buffer length values cached by sibling evaluations.
///
/// An edge whose destination has no cached values yet is skipped: the cache
/// is an eventually consistent optimization hint, not a correctness gate.
pub(crate) fn detect(
    cache: &VertexMetricsCache,
    threshold: f64,
    pipeline: &Pipeline,
    vertex: &Vertex,
) -> BackPressure {
    let mut back_pressure = BackPressure::default();
    for edge in pipeline.get_downstream_edges(&vertex.spec.name) {
        let vertex_key = format!(
            "{}/{}",
            pipeline.metadata.namespace,
            pipeline.vertex_object_name(&edge.to)
        );
        let Some(pending) = cache.pending(&vertex_key) else {
            continue;
        };
        let Some(buffer_length) = cache.buffer_length(&vertex_key) else {
            continue;
        };
        if pending as f64 / buffer_length as f64 >= threshold {
            back_pressure.downstream = true;
            if edge.from == vertex.spec.name {
                back_pressure.direct = true;
                break;
            }
        }
    }
    back_pressure
}

#[cfg(test)]
mod tests {
    use rillflow_types::{Edge, Metadata, Pipeline, PipelineSpec, UdfSpec, Vertex, VertexSpec};

    use super::*;

    // in -> cat -> out
    fn pipeline() -> Pipeline {
        Pipeline {
            metadata: Metadata {
                namespace: "default".to_string(),
                name: "my-pipeline".to_string(),
                deletion_timestamp: None,
            },
            spec: PipelineSpec {
                edges: vec![
                    Edge {
                        from: "in".to_string(),
                        to: "cat".to_string(),
                    },
                    Edge {
                        from: "cat".to_string(),
                        to: "out".to_string(),
                    },
                ],
                ..Default::default()
            },
        }
    }

    fn udf_vertex(name: &str) -> Vertex {
        Vertex {
            metadata: Metadata {
                namespace: "default".to_string(),
                name: format!("my-pipeline-{name}"),
                deletion_timestamp: None,
            },
            spec: VertexSpec {
                pipeline_name: "my-pipeline".to_string(),
                name: name.to_string(),
                udf: Some(UdfSpec::default()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_no_pressure_without_cached_values() {
        let cache = VertexMetricsCache::new();
        let back_pressure = detect(&cache, 0.9, &pipeline(), &udf_vertex("in"));
        assert_eq!(back_pressure, BackPressure::default());
    }

    #[test]
    fn test_direct_pressure_on_connected_vertex() {
        let cache = VertexMetricsCache::new();
        cache.record_pending("default/my-pipeline-cat", 950);
        cache.record_buffer_length("default/my-pipeline-cat", 1000);
        let back_pressure = detect(&cache, 0.9, &pipeline(), &udf_vertex("in"));
        assert!(back_pressure.direct);
        assert!(back_pressure.downstream);
    }

    #[test]
    fn test_downstream_pressure_on_distant_vertex() {
        let cache = VertexMetricsCache::new();
        cache.record_pending("default/my-pipeline-out", 950);
        cache.record_buffer_length("default/my-pipeline-out", 1000);
        let back_pressure = detect(&cache, 0.9, &pipeline(), &udf_vertex("in"));
        assert!(!back_pressure.direct);
        assert!(back_pressure.downstream);
    }

    #[test]
    fn test_fill_ratio_below_threshold() {
        let cache = VertexMetricsCache::new();
        cache.record_pending("default/my-pipeline-cat", 899);
        cache.record_buffer_length("default/my-pipeline-cat", 1000);
        let back_pressure = detect(&cache, 0.9, &pipeline(), &udf_vertex("in"));
        assert_eq!(back_pressure, BackPressure::default());
    }

    #[test]
    fn test_partially_cached_vertex_is_skipped() {
        let cache = VertexMetricsCache::new();
        cache.record_pending("default/my-pipeline-cat", 950);
        let back_pressure = detect(&cache, 0.9, &pipeline(), &udf_vertex("in"));
        assert_eq!(back_pressure, BackPressure::default());
    }
}
