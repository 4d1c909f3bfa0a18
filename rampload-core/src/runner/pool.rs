use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::{RequestTemplate, RunConfig, ThinkTime};
use super::executor::{RequestExecutor, Transport};
use super::metrics::RequestMetrics;
use super::vu::{VuId, VuState, VuStateCell, VuWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// Target requested by the timeline.
    pub desired: u64,
    /// Target actually applied after clamping to `max_vus`.
    pub target: u64,
    pub spawned: u64,
    pub retired: u64,
    pub clamped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VuStateCounts {
    pub spawning: u64,
    pub running: u64,
    pub retiring: u64,
    pub terminated: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited on their own.
    pub stopped: u64,
    /// Workers aborted after the grace period with a request still in flight.
    pub interrupted: u64,
}

struct VuHandle {
    id: VuId,
    retire: CancellationToken,
    state: Arc<VuStateCell>,
    task: JoinHandle<()>,
}

/// Owns every virtual user of a run and converges the live count onto a target.
pub struct VuPool<T> {
    executor: RequestExecutor<T>,
    template: Arc<RequestTemplate>,
    metrics: RequestMetrics,
    think_time: ThinkTime,
    max_vus: u64,
    cancel: CancellationToken,
    next_id: u64,
    live: Vec<VuHandle>,
    retiring: Vec<VuHandle>,
    reaped: u64,
    clamping: bool,
    closed: bool,
}

impl<T: Transport> VuPool<T> {
    pub fn new(
        executor: RequestExecutor<T>,
        template: Arc<RequestTemplate>,
        metrics: RequestMetrics,
        config: &RunConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            template,
            metrics,
            think_time: config.think_time,
            max_vus: config.max_vus,
            cancel,
            next_id: 0,
            live: Vec::new(),
            retiring: Vec::new(),
            reaped: 0,
            clamping: false,
            closed: false,
        }
    }

    pub fn max_vus(&self) -> u64 {
        self.max_vus
    }

    /// Workers not yet told to retire.
    pub fn live(&self) -> u64 {
        self.live.len() as u64
    }

    pub fn states(&self) -> VuStateCounts {
        let mut counts = VuStateCounts {
            terminated: self.reaped,
            ..VuStateCounts::default()
        };
        for h in self.live.iter().chain(self.retiring.iter()) {
            match h.state.load() {
                VuState::Spawning => counts.spawning += 1,
                VuState::Running => counts.running += 1,
                VuState::Retiring => counts.retiring += 1,
                VuState::Terminated => counts.terminated += 1,
            }
        }
        counts
    }

    /// Spawns or retires workers until `live()` equals `desired` clamped to `max_vus`.
    ///
    /// Does nothing once the run is cancelled or the pool has been shut down.
    pub fn reconcile(&mut self, desired: u64) -> Reconciled {
        self.reap();

        let clamped = desired > self.max_vus;
        if clamped && !self.clamping {
            tracing::warn!(
                desired,
                max_vus = self.max_vus,
                "desired VUs exceed max_vus; clamping"
            );
        }
        self.clamping = clamped;

        let target = desired.min(self.max_vus);
        let mut out = Reconciled {
            desired,
            target,
            spawned: 0,
            retired: 0,
            clamped,
        };

        if self.closed || self.cancel.is_cancelled() {
            return out;
        }

        while self.live() < target {
            self.spawn();
            out.spawned += 1;
        }
        while self.live() > target {
            self.retire_one();
            out.retired += 1;
        }

        if out.spawned > 0 || out.retired > 0 {
            tracing::debug!(
                target,
                spawned = out.spawned,
                retired = out.retired,
                "reconciled VU pool"
            );
        }
        self.metrics.set_vus(self.live(), self.max_vus);
        out
    }

    fn spawn(&mut self) {
        self.next_id += 1;
        let id = VuId(self.next_id);
        let retire = self.cancel.child_token();
        let state = Arc::new(VuStateCell::new());

        let worker = VuWorker {
            id,
            executor: self.executor.clone(),
            template: self.template.clone(),
            metrics: self.metrics.clone(),
            think_time: self.think_time,
            retire: retire.clone(),
            state: state.clone(),
        };
        let task = tokio::spawn(worker.run());

        self.live.push(VuHandle {
            id,
            retire,
            state,
            task,
        });
    }

    // Most recently spawned first.
    fn retire_one(&mut self) {
        if let Some(h) = self.live.pop() {
            tracing::debug!(id = %h.id, "retiring vu");
            h.state.retire();
            h.retire.cancel();
            self.retiring.push(h);
        }
    }

    /// Drops handles of workers that have exited. Returns how many were reaped.
    pub fn reap(&mut self) -> u64 {
        let before = self.retiring.len() + self.live.len();

        self.retiring.retain(|h| !h.task.is_finished());
        // A live worker only finishes on its own if it panicked or the run was cancelled.
        self.live.retain(|h| {
            let finished = h.task.is_finished();
            if finished && !h.retire.is_cancelled() {
                tracing::warn!(id = %h.id, "vu exited unexpectedly");
            }
            !finished
        });

        let reaped = (before - self.retiring.len() - self.live.len()) as u64;
        self.reaped += reaped;
        reaped
    }

    /// Stops spawning, retires every worker and waits for all of them to exit.
    ///
    /// Workers still running after `grace` are aborted and counted as interrupted.
    pub async fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        self.closed = true;
        while !self.live.is_empty() {
            self.retire_one();
        }
        self.metrics.set_vus(0, self.max_vus);

        let deadline = tokio::time::Instant::now() + grace;
        let mut report = ShutdownReport::default();
        let mut warned = false;

        for mut h in self.retiring.drain(..) {
            match tokio::time::timeout_at(deadline, &mut h.task).await {
                Ok(Ok(())) => report.stopped += 1,
                Ok(Err(err)) => {
                    tracing::warn!(id = %h.id, error = %err, "vu task failed");
                    report.stopped += 1;
                }
                Err(_) => {
                    if !warned {
                        tracing::warn!(?grace, "graceful stop expired; aborting remaining VUs");
                        warned = true;
                    }
                    h.task.abort();
                    let _ = (&mut h.task).await;
                    h.state.terminate();
                    report.interrupted += 1;
                }
            }
        }

        self.reaped += report.stopped + report.interrupted;
        report
    }
}

impl<T> Drop for VuPool<T> {
    fn drop(&mut self) {
        for h in self.live.iter().chain(self.retiring.iter()) {
            h.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::executor::TransportError;
    use rampload_metrics::Registry;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Sleepy {
        delay: Duration,
        sent: AtomicU64,
    }

    impl Transport for Sleepy {
        async fn send(&self, _req: &RequestTemplate) -> std::result::Result<u16, TransportError> {
            self.sent.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.delay).await;
            Ok(200)
        }
    }

    fn pool(max_vus: u64, delay: Duration) -> (VuPool<Sleepy>, Arc<Sleepy>, CancellationToken) {
        let transport = Arc::new(Sleepy {
            delay,
            sent: AtomicU64::new(0),
        });
        let registry = Registry::default();
        let metrics = RequestMetrics::register(&registry).unwrap_or_else(|e| panic!("{e}"));
        let config = RunConfig {
            max_vus,
            think_time: ThinkTime::none(),
            ..RunConfig::default()
        };
        let cancel = CancellationToken::new();
        let pool = VuPool::new(
            RequestExecutor::new(transport.clone()),
            Arc::new(RequestTemplate::get("http://x/").with_timeout(Duration::from_secs(600))),
            metrics,
            &config,
            cancel.clone(),
        );
        (pool, transport, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_spawns_and_retires_lifo() {
        let (mut pool, _t, _c) = pool(10, Duration::from_millis(10));

        let r = pool.reconcile(4);
        assert_eq!((r.spawned, r.retired), (4, 0));
        assert_eq!(pool.live(), 4);

        let r = pool.reconcile(1);
        assert_eq!((r.spawned, r.retired), (0, 3));
        assert_eq!(pool.live(), 1);
        // The oldest worker survives.
        assert_eq!(pool.live[0].id, VuId(1));

        let r = pool.reconcile(1);
        assert_eq!((r.spawned, r.retired), (0, 0));

        let report = pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.interrupted, 0);
        assert_eq!(pool.states().terminated, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_clamps_to_max_vus() {
        let (mut pool, _t, _c) = pool(3, Duration::from_millis(10));
        let r = pool.reconcile(8);
        assert!(r.clamped);
        assert_eq!(r.target, 3);
        assert_eq!(pool.live(), 3);

        let r = pool.reconcile(2);
        assert!(!r.clamped);
        assert_eq!(pool.live(), 2);
        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn retired_worker_finishes_in_flight_request() {
        let (mut pool, transport, _c) = pool(1, Duration::from_secs(5));
        pool.reconcile(1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pool.states().running, 1);

        pool.reconcile(0);
        assert_eq!(pool.states().retiring, 1);

        let report = pool.shutdown(Duration::from_secs(10)).await;
        assert_eq!(report, ShutdownReport { stopped: 1, interrupted: 0 });
        assert_eq!(transport.sent.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_after_grace() {
        let (mut pool, _t, _c) = pool(2, Duration::from_secs(60));
        pool.reconcile(2);
        tokio::time::sleep(Duration::from_millis(1)).await;

        let report = pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report, ShutdownReport { stopped: 0, interrupted: 2 });
        assert_eq!(pool.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_spawns_after_cancel() {
        let (mut pool, _t, cancel) = pool(5, Duration::from_millis(10));
        pool.reconcile(2);
        cancel.cancel();

        let r = pool.reconcile(5);
        assert_eq!(r.spawned, 0);
        assert_eq!(pool.live(), 2);
        pool.shutdown(Duration::from_secs(1)).await;
    }
}
