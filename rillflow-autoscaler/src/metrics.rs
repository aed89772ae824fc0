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

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Opts};

const NAMESPACE: &str = "rillflow_autoscaler";

pub struct AutoscalerMetrics {
    pub evaluated_total: IntCounter,
    pub patched_total: IntCounter,
    pub evaluation_errors_total: IntCounter,
    pub watched_vertices: IntGauge,
}

impl Default for AutoscalerMetrics {
    fn default() -> Self {
        AutoscalerMetrics {
            evaluated_total: new_counter(
                "evaluated_total",
                "Number of vertex scaling evaluations.",
            ),
            patched_total: new_counter(
                "patched_total",
                "Number of replica count patches issued.",
            ),
            evaluation_errors_total: new_counter(
                "evaluation_errors_total",
                "Number of vertex scaling evaluations that failed.",
            ),
            watched_vertices: new_gauge(
                "watched_vertices",
                "Number of vertices currently watched for autoscaling.",
            ),
        }
    }
}

fn new_counter(name: &str, description: &str) -> IntCounter {
    let counter_opts = Opts::new(name, description).namespace(NAMESPACE);
    let counter = IntCounter::with_opts(counter_opts).expect("Failed to create counter");
    prometheus::register(Box::new(counter.clone())).expect("Failed to register counter");
    counter
}

fn new_gauge(name: &str, description: &str) -> IntGauge {
    let gauge_opts = Opts::new(name, description).namespace(NAMESPACE);
    let gauge = IntGauge::with_opts(gauge_opts).expect("Failed to create gauge");
    prometheus::register(Box::new(gauge.clone())).expect("Failed to register gauge");
    gauge
}

pub static AUTOSCALER_METRICS: Lazy<AutoscalerMetrics> = Lazy::new(AutoscalerMetrics::default);
