use crate::cli::OutputFormat;
use crate::run::RunPlan;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, plan: &RunPlan);
    fn progress(&self) -> Option<rampload_core::ProgressFn>;
    fn print_summary(&self, summary: &rampload_core::RunSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
