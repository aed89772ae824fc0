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

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::FutureExt;
use rillflow_types::{
    PipelinePhase, Vertex, VertexPhase, DEFAULT_METRICS_LABEL, PENDING_NOT_AVAILABLE,
};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::back_pressure;
use crate::client_pool::DaemonClientPool;
use crate::cluster::ClusterClient;
use crate::daemon::DaemonClientFactory;
use crate::metrics::AUTOSCALER_METRICS;
use crate::metrics_cache::VertexMetricsCache;
use crate::scaling_arbiter::compute_desired_replicas;
use crate::watch_list::WatchList;

/// Constructor options of the [`Scaler`].
#[derive(Debug, Clone)]
pub struct ScalerOptions {
    /// Number of evaluation workers.
    pub workers: usize,
    /// Target revisit interval of each watched vertex, in milliseconds. The
    /// dispatcher divides it by the watch-set size, so every vertex is
    /// re-evaluated roughly once per interval regardless of how many are
    /// watched.
    pub task_interval_ms: u64,
    /// Capacity of the daemon client pool.
    pub clients_cache_size: usize,
    /// Downstream buffer fill ratio at or above which an edge counts as
    /// being under back pressure.
    pub back_pressure_threshold: f64,
}

impl Default for ScalerOptions {
    fn default() -> Self {
        ScalerOptions {
            workers: 20,
            task_interval_ms: 30_000,
            clients_cache_size: 100,
            back_pressure_threshold: 0.9,
        }
    }
}

/// The unique `<namespace>/<name>` key of a vertex, as used by
/// [`Scaler::start_watching`] and [`Scaler::stop_watching`].
pub fn key_of_vertex(vertex: &Vertex) -> String {
    vertex.key()
}

/// The autoscaling control loop.
///
/// External reconcilers register vertices with [`Scaler::start_watching`];
/// [`Scaler::run`] then revisits every watched vertex at a steady cadence,
/// pulls live per-partition metrics from the owning pipeline's daemon
/// service, computes the desired replica count, and patches it back through
/// the cluster client. Evaluations of sibling vertices share their latest
/// pending/buffer-length view through an internal cache, which feeds the
/// back-pressure gate applied before any scale-up.
pub struct Scaler {
    cluster_client: Arc<dyn ClusterClient>,
    daemon_client_factory: Arc<dyn DaemonClientFactory>,
    watch_list: WatchList,
    vertex_metrics_cache: VertexMetricsCache,
    daemon_client_pool: DaemonClientPool,
    options: ScalerOptions,
}

impl Scaler {
    pub fn new(
        cluster_client: Arc<dyn ClusterClient>,
        daemon_client_factory: Arc<dyn DaemonClientFactory>,
        options: ScalerOptions,
    ) -> Scaler {
        Scaler {
            cluster_client,
            daemon_client_factory,
            watch_list: WatchList::new(),
            vertex_metrics_cache: VertexMetricsCache::new(),
            daemon_client_pool: DaemonClientPool::with_capacity(options.clients_cache_size),
            options,
        }
    }

    /// Registers a vertex key (`namespace/name`) for autoscaling; idempotent.
    pub fn start_watching(&self, key: &str) {
        self.watch_list.start_watching(key);
    }

    /// Unregisters a vertex key; idempotent.
    pub fn stop_watching(&self, key: &str) {
        self.watch_list.stop_watching(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.watch_list.contains(key)
    }

    /// How many vertices are currently watched for autoscaling.
    pub fn len(&self) -> usize {
        self.watch_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watch_list.is_empty()
    }

    /// Runs the autoscaling worker group until `shutdown` is cancelled.
    ///
    /// A single dispatcher rotates the watch list and hands each key to one
    /// of the workers over a rendezvous channel. The blocking hand-off is
    /// the autoscaler's own load shedding: the dispatcher cannot outrun the
    /// slowest worker, and no task is ever spawned per evaluation.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(workers = self.options.workers, "starting autoscaler");
        let (key_tx, key_rx) = flume::bounded::<String>(0);
        for worker_id in 0..self.options.workers {
            tokio::spawn(self.clone().worker_loop(
                worker_id,
                key_rx.clone(),
                shutdown.clone(),
            ));
        }
        drop(key_rx);

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if let Some(key) = self.watch_list.rotate_front() {
                tokio::select! {
                    send_result = key_tx.send_async(key) => {
                        if send_result.is_err() {
                            // All workers are gone; only happens on shutdown.
                            break;
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
            AUTOSCALER_METRICS
                .watched_vertices
                .set(self.watch_list.len() as i64);
            tokio::select! {
                _ = tokio::time::sleep(self.dispatch_pause()) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        drop(key_tx);
        info!("shutting down autoscaler");
        self.daemon_client_pool.purge().await;
        Ok(())
    }

    /// Pause between two dispatches. Dividing the task interval by the
    /// watch-set size keeps the per-vertex revisit cadence constant.
    fn dispatch_pause(&self) -> Duration {
        let num_watched = self.watch_list.len().max(1) as u64;
        Duration::from_millis((self.options.task_interval_ms / num_watched).max(1))
    }

    async fn worker_loop(
        self: Arc<Self>,
        worker_id: usize,
        key_rx: flume::Receiver<String>,
        shutdown: CancellationToken,
    ) {
        debug!(worker_id, "started autoscaling worker");
        loop {
            let key = tokio::select! {
                _ = shutdown.cancelled() => break,
                recv_result = key_rx.recv_async() => match recv_result {
                    Ok(key) => key,
                    // The dispatcher dropped the channel.
                    Err(_) => break,
                },
            };
            AUTOSCALER_METRICS.evaluated_total.inc();
            let evaluation = AssertUnwindSafe(self.scale_one_vertex(&key)).catch_unwind();
            match evaluation.await {
                Ok(Ok(())) => {}
                Ok(Err(evaluation_error)) => {
                    AUTOSCALER_METRICS.evaluation_errors_total.inc();
                    warn!(vertex = %key, error = ?evaluation_error, "failed to scale vertex");
                }
                Err(_panic) => {
                    AUTOSCALER_METRICS.evaluation_errors_total.inc();
                    error!(vertex = %key, "vertex scaling evaluation panicked");
                }
            }
        }
        debug!(worker_id, "stopped autoscaling worker");
    }

    /// Evaluates one vertex and patches its replica count if needed.
    ///
    /// Sources are scaled by the time needed to drain their pending backlog;
    /// UDFs and sinks are scaled to keep the free headroom of their input
    /// buffers at the target level. When scaling up, back pressure in the
    /// downstream vertices holds or reverts the increase.
    async fn scale_one_vertex(&self, key: &str) -> anyhow::Result<()> {
        let (namespace, vertex_full_name) = match key.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                (namespace, name)
            }
            _ => anyhow::bail!("invalid vertex key `{key}`"),
        };
        let vertex = match self.cluster_client.get_vertex(namespace, vertex_full_name).await {
            Ok(vertex) => vertex,
            Err(error) if error.is_not_found() => {
                self.stop_watching(key);
                info!(vertex = %key, "no corresponding vertex found, stopped watching");
                return Ok(());
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to query vertex object of key `{key}`"));
            }
        };
        if vertex.is_being_deleted() {
            self.stop_watching(key);
            debug!(vertex = %key, "vertex being deleted");
            return Ok(());
        }
        if !vertex.scalable() {
            // Not scalable, such as an HTTP source, or autoscaling disabled.
            // Remove it in case it is watched.
            self.stop_watching(key);
            return Ok(());
        }
        let seconds_since_last_scaled = seconds_since(vertex.status.last_scaled_at);
        if seconds_since_last_scaled < vertex.spec.scale.get_cooldown_seconds() as f64 {
            debug!(vertex = %key, "cooldown period, skip scaling");
            return Ok(());
        }
        if vertex.status.phase != VertexPhase::Running {
            debug!(vertex = %key, "vertex not in Running phase");
            return Ok(());
        }
        let pipeline = match self
            .cluster_client
            .get_pipeline(namespace, &vertex.spec.pipeline_name)
            .await
        {
            Ok(pipeline) => pipeline,
            Err(error) if error.is_not_found() => {
                self.stop_watching(key);
                info!(vertex = %key, "no corresponding pipeline found, stopped watching");
                return Ok(());
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to query pipeline object of key `{key}`"));
            }
        };
        if pipeline.is_being_deleted() {
            self.stop_watching(key);
            debug!(vertex = %key, "corresponding pipeline being deleted");
            return Ok(());
        }
        if pipeline.get_desired_phase() != PipelinePhase::Running {
            debug!(vertex = %key, "corresponding pipeline not in Running state");
            return Ok(());
        }
        if i64::from(vertex.status.replicas) != i64::from(vertex.get_replicas()) {
            // A previous scale operation is still being applied.
            debug!(vertex = %key, "replicas mismatch, vertex might be under processing");
            return Ok(());
        }
        if vertex.status.replicas == 0 {
            // Was scaled to zero. The peek is the only scale-up without a
            // metric signal: with no replicas there is nobody to report one.
            let sleep_seconds = vertex.spec.scale.get_zero_replica_sleep_seconds();
            if seconds_since_last_scaled >= sleep_seconds as f64 {
                debug!(
                    vertex = %key,
                    slept_seconds = seconds_since_last_scaled,
                    "scaling up to peek",
                );
                return self.patch_vertex_replicas(&vertex, 1).await;
            }
            debug!(
                vertex = %key,
                slept_seconds = seconds_since_last_scaled,
                "zero replica sleep period not over yet",
            );
            return Ok(());
        }

        let daemon_service_url = pipeline.get_daemon_service_url();
        let daemon_client = match self.daemon_client_pool.get(&daemon_service_url) {
            Some(daemon_client) => daemon_client,
            None => {
                let daemon_client = self
                    .daemon_client_factory
                    .new_daemon_client(&daemon_service_url)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to get daemon service client for pipeline `{}`",
                            pipeline.metadata.name
                        )
                    })?;
                self.daemon_client_pool
                    .insert(daemon_service_url, daemon_client.clone())
                    .await;
                daemon_client
            }
        };
        let vertex_metrics = daemon_client
            .get_vertex_metrics(&pipeline.metadata.name, &vertex.spec.name)
            .await
            .with_context(|| format!("failed to get metrics of vertex key `{key}`"))?;

        // Partition values drive the per-partition desired replica
        // computation; the aggregated totals drive the scale-to-zero
        // decision and the cached view used for back-pressure checks. If any
        // partition lacks a rate or pending value, this cycle carries no
        // signal.
        let mut partition_rates = Vec::with_capacity(vertex_metrics.len());
        let mut partition_pendings = Vec::with_capacity(vertex_metrics.len());
        let mut total_rate = 0f64;
        let mut total_pending = 0i64;
        for partition_metrics in &vertex_metrics {
            let rate = partition_metrics
                .processing_rates
                .get(DEFAULT_METRICS_LABEL)
                .copied();
            let Some(rate) = rate.filter(|rate| *rate >= 0.0) else {
                debug!(vertex = %key, "vertex has no rate information, skip scaling");
                return Ok(());
            };
            partition_rates.push(rate);
            total_rate += rate;

            let pending = partition_metrics.pendings.get(DEFAULT_METRICS_LABEL).copied();
            let Some(pending) =
                pending.filter(|pending| *pending >= 0 && *pending != PENDING_NOT_AVAILABLE)
            else {
                debug!(vertex = %key, "vertex has no pending messages information, skip scaling");
                return Ok(());
            };
            partition_pendings.push(pending);
            total_pending += pending;
        }
        // Back pressure affects all partitions of the downstream vertex, so
        // only the total is shared.
        self.vertex_metrics_cache.record_pending(key, total_pending);

        let mut partition_buffer_lengths = Vec::new();
        let mut partition_available_buffer_lengths = Vec::new();
        let mut total_buffer_length = 0i64;
        if !vertex.is_a_source() {
            // Only non-source vertices read from buffers.
            let target_buffer_availability =
                vertex.spec.scale.get_target_buffer_availability() as f64;
            for buffer_name in vertex.owned_buffers() {
                let buffer_info = daemon_client
                    .get_pipeline_buffer(&pipeline.metadata.name, &buffer_name)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to get the read buffer information of vertex `{}`",
                            vertex.spec.name
                        )
                    })?;
                let (Some(buffer_length), Some(buffer_usage_limit)) =
                    (buffer_info.buffer_length, buffer_info.buffer_usage_limit)
                else {
                    anyhow::bail!(
                        "invalid read buffer information of vertex `{}`, length or usage limit \
                         is missing",
                        vertex.spec.name
                    );
                };
                let effective_length = (buffer_length as f64 * buffer_usage_limit) as i64;
                partition_buffer_lengths.push(effective_length);
                partition_available_buffer_lengths
                    .push((buffer_length as f64 * target_buffer_availability / 100.0) as i64);
                total_buffer_length += effective_length;
            }
            self.vertex_metrics_cache
                .record_buffer_length(key, total_buffer_length);
        }

        let current = vertex.get_replicas();
        let desired = if total_pending == 0 && total_rate == 0.0 {
            // Pending includes unacknowledged in-flight work, so both totals
            // at zero really means idle.
            0
        } else {
            compute_desired_replicas(
                &vertex,
                &partition_rates,
                &partition_pendings,
                &partition_buffer_lengths,
                &partition_available_buffer_lengths,
            )
        };
        debug!(vertex = %key, desired, "calculated desired replica count");
        let min_replicas = vertex.spec.scale.get_min_replicas();
        let max_replicas = vertex.spec.scale.get_max_replicas();
        let desired = desired.clamp(min_replicas, max_replicas);
        if current > max_replicas || current < min_replicas {
            // Someone manually scaled the vertex outside its bounds; jump
            // straight to the computed value.
            return self.patch_vertex_replicas(&vertex, desired).await;
        }
        let max_step = vertex.spec.scale.get_replicas_per_scale() as i32;
        if desired < current {
            // Scale down gradually.
            let diff = (current - desired).min(max_step);
            return self.patch_vertex_replicas(&vertex, current - diff).await;
        }
        if desired > current {
            let back_pressure = back_pressure::detect(
                &self.vertex_metrics_cache,
                self.options.back_pressure_threshold,
                &pipeline,
                &vertex,
            );
            if back_pressure.direct {
                if current > 1 {
                    debug!(
                        vertex = %key,
                        "direct back pressure from connected vertices, decreasing one replica",
                    );
                    return self.patch_vertex_replicas(&vertex, current - 1).await;
                }
                debug!(vertex = %key, "direct back pressure from connected vertices, skip scaling");
                return Ok(());
            }
            if back_pressure.downstream {
                debug!(vertex = %key, "back pressure in downstream vertices, skip scaling");
                return Ok(());
            }
            // Scale up gradually.
            let diff = (desired - current).min(max_step);
            return self.patch_vertex_replicas(&vertex, current + diff).await;
        }
        Ok(())
    }

    async fn patch_vertex_replicas(
        &self,
        vertex: &Vertex,
        desired_replicas: i32,
    ) -> anyhow::Result<()> {
        let merge_patch = serde_json::json!({ "spec": { "replicas": desired_replicas } });
        match self
            .cluster_client
            .patch_vertex(&vertex.metadata.namespace, &vertex.metadata.name, merge_patch)
            .await
        {
            Ok(()) => {}
            // The vertex was deleted concurrently; nothing left to scale.
            Err(error) if error.is_not_found() => {}
            Err(error) => return Err(error).context("failed to patch vertex replicas"),
        }
        AUTOSCALER_METRICS.patched_total.inc();
        info!(
            pipeline = %vertex.spec.pipeline_name,
            vertex = %vertex.spec.name,
            from = vertex.get_replicas(),
            to = desired_replicas,
            "vertex replicas changed",
        );
        Ok(())
    }
}

fn seconds_since(timestamp: Option<OffsetDateTime>) -> f64 {
    match timestamp {
        Some(timestamp) => (OffsetDateTime::now_utc() - timestamp).as_seconds_f64(),
        None => f64::INFINITY,
    }
}
