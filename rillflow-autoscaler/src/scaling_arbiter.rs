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

use rillflow_types::Vertex;

/// Computes the desired replica count of a vertex from its per-partition
/// metrics. The four slices are aligned by partition index; the buffer
/// slices are empty for sources, which own no input buffers.
///
/// For sources, each partition's candidate is the replica count that would
/// drain its pending backlog within `target_processing_seconds` at the
/// observed per-replica rate:
///
///   `d = round(pending / rate / target_processing_seconds × current)`
///
/// For UDFs and sinks, the available room of the partition's buffer is
/// attributed evenly to the current replicas, and the candidate is the
/// replica count that would keep the free headroom at its target level:
///
///   `contribution = (buffer_length − pending) / current`
///   `d = round(available_buffer_length / contribution)`
///
/// A partition whose pending count meets or exceeds its effective buffer
/// length is saturated; the proportional model breaks down there, so the
/// candidate is a single step above the current replica count instead.
///
/// The result is the maximum candidate across partitions, never less than 1
/// and never more than a partition's pending count. Scaling all the way to
/// zero is decided by the caller from the aggregated totals, not here.
///
/// `current` is the observed `status.replicas`, not the spec replicas; the
/// caller only evaluates vertices whose two counts agree.
pub(crate) fn compute_desired_replicas(
    vertex: &Vertex,
    partition_rates: &[f64],
    partition_pendings: &[i64],
    partition_buffer_lengths: &[i64],
    partition_available_buffer_lengths: &[i64],
) -> i32 {
    let current_replicas = vertex.status.replicas as i32;
    let mut max_desired = 1i32;

    for (partition, &pending) in partition_pendings.iter().enumerate() {
        let rate = partition_rates[partition];
        if pending == 0 || rate == 0.0 {
            // Pending includes unacknowledged in-flight work, so rate and
            // pending are either both zero or both positive; a lone zero
            // carries no signal about how many replicas are needed.
            continue;
        }
        let mut desired = if vertex.is_a_source() {
            ((pending as f64 / rate)
                / vertex.spec.scale.get_target_processing_seconds() as f64
                * current_replicas as f64)
                .round() as i32
        } else if pending >= partition_buffer_lengths[partition] {
            current_replicas + vertex.spec.scale.get_replicas_per_scale() as i32
        } else {
            let single_replica_contribution =
                (partition_buffer_lengths[partition] - pending) as f64 / current_replicas as f64;
            (partition_available_buffer_lengths[partition] as f64 / single_replica_contribution)
                .round() as i32
        };
        if desired == 0 {
            desired = 1;
        }
        if desired as i64 > pending {
            // Never provision more replicas than there are messages to work on.
            desired = pending as i32;
        }
        max_desired = max_desired.max(desired);
    }
    max_desired
}

#[cfg(test)]
mod tests {
    use rillflow_types::{Scale, SinkSpec, SourceSpec, Vertex, VertexSpec, VertexStatus};

    use super::compute_desired_replicas;

    fn source_vertex(current_replicas: u32, scale: Scale) -> Vertex {
        Vertex {
            spec: VertexSpec {
                pipeline_name: "p".to_string(),
                name: "src".to_string(),
                scale,
                source: Some(SourceSpec::default()),
                ..Default::default()
            },
            status: VertexStatus {
                replicas: current_replicas,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn sink_vertex(current_replicas: u32, scale: Scale) -> Vertex {
        Vertex {
            spec: VertexSpec {
                pipeline_name: "p".to_string(),
                name: "out".to_string(),
                scale,
                sink: Some(SinkSpec::default()),
                ..Default::default()
            },
            status: VertexStatus {
                replicas: current_replicas,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_source_scales_by_time_to_drain() {
        let vertex = source_vertex(
            2,
            Scale {
                target_processing_seconds: Some(20),
                ..Default::default()
            },
        );
        // Per partition: round((4000 / 100) / 20 * 2) = 4.
        let desired =
            compute_desired_replicas(&vertex, &[100.0, 100.0], &[4000, 4000], &[], &[]);
        assert_eq!(desired, 4);
    }

    #[test]
    fn test_idle_partitions_contribute_no_candidate() {
        let vertex = source_vertex(5, Scale::default());
        assert_eq!(compute_desired_replicas(&vertex, &[0.0, 0.0], &[0, 0], &[], &[]), 1);
        // A lone zero (rate without pending or vice versa) is skipped too.
        assert_eq!(
            compute_desired_replicas(&vertex, &[120.0, 0.0], &[0, 350], &[], &[]),
            1
        );
    }

    #[test]
    fn test_non_source_keeps_buffer_headroom_at_target() {
        let vertex = sink_vertex(2, Scale::default());
        // contribution = (800 - 400) / 2 = 200; round(250 / 200) = 1.
        let desired = compute_desired_replicas(&vertex, &[50.0], &[400], &[800], &[250]);
        assert_eq!(desired, 1);
        // contribution = (800 - 700) / 2 = 50; round(250 / 50) = 5.
        let desired = compute_desired_replicas(&vertex, &[50.0], &[700], &[800], &[250]);
        assert_eq!(desired, 5);
    }

    #[test]
    fn test_saturated_buffer_adds_one_step() {
        let vertex = sink_vertex(
            1,
            Scale {
                replicas_per_scale: Some(2),
                ..Default::default()
            },
        );
        // pending(900) >= effective buffer length(800): escape the
        // proportional model and add one step.
        let desired = compute_desired_replicas(&vertex, &[100.0], &[900], &[800], &[250]);
        assert_eq!(desired, 3);
    }

    #[test]
    fn test_desired_is_clamped_to_pending() {
        let vertex = source_vertex(
            10,
            Scale {
                target_processing_seconds: Some(20),
                ..Default::default()
            },
        );
        // round((2 / 0.1) / 20 * 10) = 10, but only 2 messages are pending.
        let desired = compute_desired_replicas(&vertex, &[0.1], &[2], &[], &[]);
        assert_eq!(desired, 2);
    }

    #[test]
    fn test_rounded_down_candidate_is_floored_at_one() {
        let vertex = source_vertex(1, Scale::default());
        // round((10 / 100) / 20 * 1) = 0 -> floored to 1.
        let desired = compute_desired_replicas(&vertex, &[100.0], &[10], &[], &[]);
        assert_eq!(desired, 1);
    }

    #[test]
    fn test_max_across_partitions_wins() {
        let vertex = sink_vertex(2, Scale::default());
        // Partition 0 wants 1, partition 1 wants 5.
        let desired = compute_desired_replicas(
            &vertex,
            &[50.0, 50.0],
            &[400, 700],
            &[800, 800],
            &[250, 250],
        );
        assert_eq!(desired, 5);
    }
}
