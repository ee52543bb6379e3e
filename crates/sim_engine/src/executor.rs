//! One component invocation inside a tick
//!
//! Runs on a worker task: reads its channels through the batch's bridge
//! view, invokes the sandbox under the timeout budget and retries execution
//! errors per the component's retry policy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    ChannelId, ComponentExecutionResult, ComponentFailure, ComponentId, ComponentInputs,
    ComponentOutput, ComponentSandbox, ExecutionOutcome, FailureKind, Input, RetryPolicy,
    SensorStore, SimError, Timestamp,
};
use sensor_bridge::BridgeView;
use tracing::{debug, instrument, warn};

/// Everything a worker task needs, detached from the engine
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub component_id: ComponentId,
    pub method: String,
    pub stage: usize,
    pub channels: Vec<ChannelId>,
    pub upstream: BTreeMap<ComponentId, Input<ComponentOutput>>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

#[instrument(
    name = "component_execute",
    skip_all,
    fields(component = %job.component_id, at = at, stage = job.stage)
)]
pub(crate) async fn run_component<St, Sb>(
    sandbox: Arc<Sb>,
    view: BridgeView<St>,
    job: Job,
    at: Timestamp,
) -> ComponentExecutionResult
where
    St: SensorStore,
    Sb: ComponentSandbox,
{
    let started = Instant::now();

    let mut inputs = ComponentInputs::new(at);
    for channel in &job.channels {
        let slot = match view.get(channel, at).await {
            Ok(reading) => Input::Available(reading),
            Err(e) => {
                debug!(channel = %channel, error = %e, "channel input missing");
                Input::missing(e.to_string())
            }
        };
        inputs.channels.insert(channel.clone(), slot);
    }
    inputs.upstream = job.upstream;
    let channel_missing = inputs.channels.values().any(Input::is_missing);

    let max_attempts = job.retry.max_attempts.max(1);
    let mut attempts = 0;
    let outcome = loop {
        attempts += 1;
        let call = sandbox.invoke(&job.component_id, &job.method, inputs.clone(), job.timeout);
        let result = match tokio::time::timeout(job.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SimError::component_timeout(
                job.component_id.as_str(),
                job.timeout.as_millis() as u64,
            )),
        };

        match result {
            Ok(output) => break ExecutionOutcome::Completed(output),
            Err(e @ SimError::ComponentExecution { .. })
                if attempts < max_attempts && !channel_missing =>
            {
                debug!(attempt = attempts, error = %e, "retrying component");
                if job.retry.backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(job.retry.backoff_ms)).await;
                }
            }
            Err(e) => break ExecutionOutcome::Failed(classify(&e, channel_missing)),
        }
    };

    if let ExecutionOutcome::Failed(failure) = &outcome {
        warn!(kind = %failure.kind, attempts, message = %failure.message, "component failed");
        metrics::counter!(
            "replay_sim_component_failures_total",
            "component" => job.component_id.to_string(),
            "kind" => failure.kind.as_str()
        )
        .increment(1);
    }

    ComponentExecutionResult {
        component_id: job.component_id,
        stage: job.stage,
        duration_us: started.elapsed().as_micros() as u64,
        attempts,
        outcome,
    }
}

/// Map an invocation error onto a frame slot failure.
///
/// An execution error while one of the component's channels had no data is
/// reported as data unavailability.
fn classify(error: &SimError, channel_missing: bool) -> ComponentFailure {
    let kind = match error {
        SimError::ComponentTimeout { .. } => FailureKind::Timeout,
        SimError::DataUnavailable { .. } => FailureKind::DataUnavailable,
        SimError::ComponentExecution { .. } if channel_missing => FailureKind::DataUnavailable,
        _ => FailureKind::Execution,
    };
    ComponentFailure::new(kind, error.to_string())
}

/// Slot recorded for a due component that never ran.
pub(crate) fn skipped(component_id: ComponentId, stage: usize, reason: &str) -> ComponentExecutionResult {
    ComponentExecutionResult {
        component_id,
        stage,
        duration_us: 0,
        attempts: 0,
        outcome: ExecutionOutcome::Failed(ComponentFailure::new(FailureKind::Skipped, reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let timeout = SimError::component_timeout("a", 10);
        assert_eq!(classify(&timeout, true).kind, FailureKind::Timeout);

        let exec = SimError::component_execution("a", "boom");
        assert_eq!(classify(&exec, false).kind, FailureKind::Execution);
        assert_eq!(classify(&exec, true).kind, FailureKind::DataUnavailable);
    }

    #[test]
    fn test_skipped_slot() {
        let r = skipped("c".into(), 2, "fail-fast");
        assert_eq!(r.attempts, 0);
        assert_eq!(r.failure().map(|f| f.kind), Some(FailureKind::Skipped));
    }
}
