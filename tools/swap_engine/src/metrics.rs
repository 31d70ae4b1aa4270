use std::time::Duration;

use tracing::info;

use crate::state::Stage;

pub trait SwapMetrics: Send + Sync {
    fn record_transition(&self, from: Stage, to: Stage);
    fn record_latency(&self, stage: &'static str, elapsed: Duration);
}

#[derive(Default, Debug, Clone)]
pub struct NoopMetrics;

impl SwapMetrics for NoopMetrics {
    fn record_transition(&self, _from: Stage, _to: Stage) {}
    fn record_latency(&self, _stage: &'static str, _elapsed: Duration) {}
}

/// Emits metrics as `tracing` events on the `swap_metrics` target.
#[derive(Default, Debug, Clone)]
pub struct TracingMetrics;

impl SwapMetrics for TracingMetrics {
    fn record_transition(&self, from: Stage, to: Stage) {
        info!(target: "swap_metrics", %from, %to, "transition");
    }

    fn record_latency(&self, stage: &'static str, elapsed: Duration) {
        info!(
            target: "swap_metrics",
            stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "latency"
        );
    }
}
