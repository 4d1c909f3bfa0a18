use std::sync::Arc;

use rampload_metrics::Registry;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::{RequestTemplate, RunConfig};
use super::error::Result;
use super::executor::{RequestExecutor, Transport};
use super::metrics::RequestMetrics;
use super::pool::VuPool;
use super::progress::{ProgressFn, ProgressUpdate};
use super::schedule::RunTimeline;
use super::summary::{RunSummary, StopReason};
use super::thresholds::{ThresholdSpec, evaluate_thresholds};

/// Everything one run owns. Independent contexts can run side by side in one process.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub timeline: Arc<RunTimeline>,
    pub config: Arc<RunConfig>,
    pub metrics: Arc<Registry>,
    /// Fires on manual stop.
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(timeline: RunTimeline, config: RunConfig) -> Result<Self> {
        config.validate()?;
        if timeline.max_target() > config.max_vus {
            tracing::warn!(
                max_target = timeline.max_target(),
                max_vus = config.max_vus,
                "stage targets exceed max_vus and will be clamped"
            );
        }
        Ok(Self {
            timeline: Arc::new(timeline),
            config: Arc::new(config),
            metrics: Arc::new(Registry::default()),
            cancel: CancellationToken::new(),
        })
    }
}

/// Drives the VU pool along the timeline until it ends or `ctx.cancel` fires.
///
/// Metrics are summarized and thresholds evaluated only after every worker has exited.
pub async fn run<T: Transport>(
    ctx: &RunContext,
    executor: RequestExecutor<T>,
    template: RequestTemplate,
    thresholds: &[ThresholdSpec],
    progress: Option<ProgressFn>,
) -> Result<RunSummary> {
    ctx.config.validate()?;

    let request_metrics = RequestMetrics::register(&ctx.metrics)?;
    let workers = ctx.cancel.child_token();
    let mut pool = VuPool::new(
        executor,
        Arc::new(template),
        request_metrics.clone(),
        &ctx.config,
        workers.clone(),
    );

    let started = Instant::now();
    let end = started + ctx.timeline.total_duration();
    let mut interval = tokio::time::interval(ctx.config.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick: u64 = 0;
    let mut stage = 0;
    let mut last_requests = 0;
    let mut last_tick_at = started;

    let stop_reason = loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break StopReason::Cancelled,
            _ = tokio::time::sleep_until(end) => break StopReason::Completed,
            _ = interval.tick() => {}
        }

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(started);
        if ctx.timeline.is_done(elapsed) {
            break StopReason::Completed;
        }

        let desired = ctx.timeline.desired_vus(elapsed);
        let reconciled = pool.reconcile(desired);
        let snapshot = ctx.timeline.stage_snapshot_at(elapsed);
        if snapshot.stage != stage {
            stage = snapshot.stage;
            tracing::debug!(
                stage,
                stages = snapshot.stages,
                start_target = snapshot.start_target,
                end_target = snapshot.end_target,
                "entered stage"
            );
        }

        tick += 1;
        if let Some(progress) = &progress {
            let requests_total = request_metrics.requests_total();
            let dt = now.saturating_duration_since(last_tick_at).as_secs_f64();
            let rps_now = if dt > 0.0 {
                requests_total.saturating_sub(last_requests) as f64 / dt
            } else {
                0.0
            };
            last_requests = requests_total;
            last_tick_at = now;

            progress(ProgressUpdate {
                tick,
                elapsed,
                total_duration: ctx.timeline.total_duration(),
                stage: snapshot,
                desired_vus: reconciled.target,
                live_vus: pool.live(),
                max_vus: pool.max_vus(),
                vu_states: pool.states(),
                requests_total,
                rps_now,
                error_rate: request_metrics.error_rate(),
            });
        }
    };

    tracing::debug!(reason = %stop_reason, live = pool.live(), "stopping run");
    workers.cancel();
    let shutdown = pool.shutdown(ctx.config.graceful_stop).await;
    let elapsed = started.elapsed();

    let metrics = ctx.metrics.summarize();
    let thresholds = evaluate_thresholds(thresholds, &metrics);

    Ok(RunSummary {
        elapsed,
        stop_reason,
        interrupted_vus: shutdown.interrupted,
        metrics,
        thresholds,
    })
}
