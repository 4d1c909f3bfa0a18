use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rampload_core::{
    MetricValues, ProgressFn, ProgressUpdate, RequestExecutor, RequestTemplate, RunConfig,
    RunContext, RunTimeline, Stage, StopReason, ThinkTime, ThresholdSpec, Transport,
    TransportError, names, run,
};

/// Fake transport with fixed latency that tracks concurrency.
struct Fake {
    delay: Duration,
    fail: bool,
    sent: AtomicU64,
    completed: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl Fake {
    fn new(delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail,
            sent: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
        })
    }
}

impl Transport for Fake {
    async fn send(&self, _req: &RequestTemplate) -> Result<u16, TransportError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(TransportError::new("connect", "connection refused"))
        } else {
            Ok(200)
        }
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn context(stages: &[(u64, u64)], config: RunConfig) -> RunContext {
    let timeline = RunTimeline::new(stages.iter().map(|&(d, t)| Stage::new(secs(d), t)).collect())
        .unwrap_or_else(|e| panic!("{e}"));
    RunContext::new(timeline, config).unwrap_or_else(|e| panic!("{e}"))
}

fn config(max_vus: u64) -> RunConfig {
    RunConfig {
        max_vus,
        think_time: ThinkTime::none(),
        graceful_stop: secs(30),
        ..RunConfig::default()
    }
}

fn counter(summary: &rampload_core::RunSummary, name: &str) -> u64 {
    match summary.metric(name).map(|m| &m.values) {
        Some(MetricValues::Counter { total }) => *total,
        other => panic!("unexpected {name}: {other:?}"),
    }
}

fn collect_progress() -> (ProgressFn, Arc<Mutex<Vec<ProgressUpdate>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let f: ProgressFn = Arc::new(move |u| {
        if let Ok(mut v) = sink.lock() {
            v.push(u);
        }
    });
    (f, seen)
}

#[tokio::test(start_paused = true)]
async fn follows_timeline_and_completes() {
    let ctx = context(&[(30, 10), (60, 10), (10, 0)], config(50));
    let transport = Fake::new(Duration::from_millis(250), false);
    let (progress, seen) = collect_progress();
    let thresholds = [
        ThresholdSpec::parse("http_req_duration", "p(95)<5000").unwrap_or_else(|e| panic!("{e}")),
        ThresholdSpec::parse("errors", "rate<0.5").unwrap_or_else(|e| panic!("{e}")),
    ];

    let summary = run(
        &ctx,
        RequestExecutor::new(transport.clone()),
        RequestTemplate::get("http://target/"),
        &thresholds,
        Some(progress),
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(summary.interrupted_vus, 0);
    assert!(summary.thresholds_passed());
    assert!(summary.elapsed >= secs(100));

    let updates = seen.lock().unwrap_or_else(|e| panic!("{e}")).clone();
    assert!(!updates.is_empty());
    for u in &updates {
        assert_eq!(u.desired_vus, ctx.timeline.desired_vus(u.elapsed));
        assert_eq!(u.live_vus, u.desired_vus);
    }
    let at = |s: u64| updates.iter().find(|u| u.elapsed >= secs(s)).map(|u| u.live_vus);
    assert_eq!(at(15), Some(5));
    assert_eq!(at(60), Some(10));
    assert_eq!(at(95), Some(5));

    // Every request finished before the summary was taken.
    assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(
        counter(&summary, names::HTTP_REQS),
        transport.completed.load(Ordering::SeqCst)
    );
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_max_vus() {
    let ctx = context(&[(5, 40), (5, 40)], config(7));
    let transport = Fake::new(Duration::from_millis(100), false);

    let summary = run(
        &ctx,
        RequestExecutor::new(transport.clone()),
        RequestTemplate::get("http://target/"),
        &[],
        None,
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 7);
    match summary.metric(names::VUS).map(|m| &m.values) {
        Some(MetricValues::Gauge { max, .. }) => assert_eq!(*max, 7.0),
        other => panic!("unexpected: {other:?}"),
    }
    match summary.metric(names::VUS_MAX).map(|m| &m.values) {
        Some(MetricValues::Gauge { value, .. }) => assert_eq!(*value, 7.0),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn failing_requests_do_not_stop_workers() {
    let ctx = context(&[(1, 1), (9, 1)], config(5));
    let transport = Fake::new(Duration::from_millis(100), true);
    let (progress, seen) = collect_progress();
    let thresholds =
        [ThresholdSpec::parse("errors", "rate<0.5").unwrap_or_else(|e| panic!("{e}"))];

    let summary = run(
        &ctx,
        RequestExecutor::new(transport.clone()),
        RequestTemplate::get("http://target/"),
        &thresholds,
        Some(progress),
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    // One worker, ~9 s of back-to-back 100 ms failures.
    assert!(transport.completed.load(Ordering::SeqCst) >= 80);
    let updates = seen.lock().unwrap_or_else(|e| panic!("{e}")).clone();
    assert!(updates.iter().filter(|u| u.elapsed >= secs(1)).all(|u| u.live_vus == 1));
    assert!(updates.iter().all(|u| u.vu_states.terminated == 0));

    assert!(!summary.thresholds_passed());
    assert_eq!(summary.thresholds.outcomes[0].observed, Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_spawning_and_waits_for_in_flight() {
    let ctx = context(&[(10, 20), (600, 20)], config(50));
    let transport = Fake::new(Duration::from_millis(700), false);
    let (progress, seen) = collect_progress();

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_300)).await;
        cancel.cancel();
    });

    let summary = run(
        &ctx,
        RequestExecutor::new(transport.clone()),
        RequestTemplate::get("http://target/"),
        &[],
        Some(progress),
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(summary.interrupted_vus, 0);
    // Bounded by one in-flight request after the stop.
    assert!(summary.elapsed <= Duration::from_millis(3_300 + 700));

    // No ticks after the stop.
    let updates = seen.lock().unwrap_or_else(|e| panic!("{e}")).clone();
    assert!(updates.iter().all(|u| u.elapsed <= secs(3)));
    let peak = updates.iter().map(|u| u.live_vus).max().unwrap_or(0);

    let sent = transport.sent.load(Ordering::SeqCst);
    assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(sent, transport.completed.load(Ordering::SeqCst));
    assert_eq!(counter(&summary, names::HTTP_REQS), sent);

    // Nothing runs once the summary exists.
    tokio::time::sleep(secs(5)).await;
    assert_eq!(transport.sent.load(Ordering::SeqCst), sent);
    assert_eq!(peak, 6);
}

#[tokio::test(start_paused = true)]
async fn contexts_are_independent() {
    let a = context(&[(2, 2)], config(5));
    let b = context(&[(2, 4)], config(5));
    let ta = Fake::new(Duration::from_millis(100), false);
    let tb = Fake::new(Duration::from_millis(100), true);

    let (sa, sb) = tokio::join!(
        run(
            &a,
            RequestExecutor::new(ta.clone()),
            RequestTemplate::get("http://a/"),
            &[],
            None
        ),
        run(
            &b,
            RequestExecutor::new(tb.clone()),
            RequestTemplate::get("http://b/"),
            &[],
            None
        ),
    );
    let sa = sa.unwrap_or_else(|e| panic!("{e}"));
    let sb = sb.unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(counter(&sa, names::HTTP_REQS), ta.completed.load(Ordering::SeqCst));
    assert_eq!(counter(&sb, names::HTTP_REQS), tb.completed.load(Ordering::SeqCst));
    match sa.metric(names::ERRORS).map(|m| &m.values) {
        Some(MetricValues::Rate { hits, .. }) => assert_eq!(*hits, 0),
        other => panic!("unexpected: {other:?}"),
    }
}
