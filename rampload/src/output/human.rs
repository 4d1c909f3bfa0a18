use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_duration, format_percent, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;
use crate::run::RunPlan;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan: &RunPlan) {
        let timeline = &plan.ctx.timeline;
        println!("target: {} {}", plan.template.method, plan.template.url);
        println!(
            "max_vus: {} duration: {}",
            plan.ctx.config.max_vus,
            format_duration(timeline.total_duration())
        );
        for (i, s) in timeline.stages().iter().enumerate() {
            println!(
                "stage {}: {} -> {} vus",
                i + 1,
                format_duration(s.duration),
                s.target
            );
        }
        for t in &plan.thresholds {
            println!("threshold: {}: {}", t.metric, t.expression);
        }
        println!();
    }

    fn progress(&self) -> Option<rampload_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let message = format!(
                "stage={}/{} vus={}/{} target={} reqs={} rps={} errors={} elapsed={}",
                u.stage.stage,
                u.stage.stages,
                u.live_vus,
                u.max_vus,
                u.desired_vus,
                u.requests_total,
                format_rate(u.rps_now),
                format_percent(u.error_rate),
                format_duration(u.elapsed),
            );
            progress.update(u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, summary: &rampload_core::RunSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));

        let failed: Vec<_> = summary.thresholds.failed().collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed: {}", failed.len());
        }

        Ok(())
    }
}
