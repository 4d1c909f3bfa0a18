use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

use super::config::{RequestTemplate, ThinkTime};
use super::executor::{RequestExecutor, Transport};
use super::metrics::RequestMetrics;

/// Opaque, monotonically assigned virtual user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VuId(pub(crate) u64);

impl VuId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vu-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum VuState {
    Spawning = 0,
    Running = 1,
    Retiring = 2,
    Terminated = 3,
}

impl VuState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Spawning,
            1 => Self::Running,
            2 => Self::Retiring,
            _ => Self::Terminated,
        }
    }
}

/// Lifecycle state shared between a worker and the pool.
#[derive(Debug)]
pub(crate) struct VuStateCell(AtomicU8);

impl VuStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(VuState::Spawning as u8))
    }

    pub(crate) fn load(&self) -> VuState {
        VuState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from -> to`; returns false if the state was something else.
    pub(crate) fn transition(&self, from: VuState, to: VuState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Marks the worker as retiring unless it already terminated.
    pub(crate) fn retire(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != VuState::Terminated as u8).then_some(VuState::Retiring as u8)
            });
    }

    pub(crate) fn terminate(&self) {
        self.0.store(VuState::Terminated as u8, Ordering::Release);
    }
}

pub(crate) struct VuWorker<T> {
    pub(crate) id: VuId,
    pub(crate) executor: RequestExecutor<T>,
    pub(crate) template: Arc<RequestTemplate>,
    pub(crate) metrics: RequestMetrics,
    pub(crate) think_time: ThinkTime,
    pub(crate) retire: CancellationToken,
    pub(crate) state: Arc<VuStateCell>,
}

impl<T: Transport> VuWorker<T> {
    /// Request loop. Exits only when retired or cancelled, never on a failed request.
    pub(crate) async fn run(self) {
        let Self {
            id,
            executor,
            template,
            metrics,
            think_time,
            retire,
            state,
        } = self;

        state.transition(VuState::Spawning, VuState::Running);
        tracing::debug!(%id, "vu started");

        while !retire.is_cancelled() {
            // An in-flight request always completes; retirement is observed between requests.
            let outcome = executor.execute(&template).await;
            metrics.record(&outcome);

            tokio::select! {
                biased;
                _ = retire.cancelled() => break,
                _ = tokio::time::sleep(think_time.sample()) => {}
            }
        }

        state.terminate();
        tracing::debug!(%id, "vu stopped");
    }
}
