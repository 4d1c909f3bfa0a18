use anyhow::Context as _;
use std::sync::Arc;

use rampload_core::{
    HttpClientConfig, HttpTransport, RequestExecutor, RequestTemplate, RunConfig, RunContext,
    RunTimeline, ThresholdSpec,
};
use tokio_util::sync::CancellationToken;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

/// Validated, ready-to-run configuration.
pub(crate) struct RunPlan {
    pub ctx: RunContext,
    pub template: RequestTemplate,
    pub thresholds: Vec<ThresholdSpec>,
    pub client: HttpClientConfig,
}

impl RunPlan {
    pub(crate) fn from_args(args: &RunArgs) -> anyhow::Result<Self> {
        check_target_url(&args.target_url)?;

        let timeline = RunTimeline::new(args.stages()).context("invalid stages")?;
        let config = RunConfig {
            max_vus: args.max_vus,
            tick: args.tick,
            think_time: args.think_time,
            graceful_stop: args.graceful_stop,
        };
        let ctx = RunContext::new(timeline, config).context("invalid run configuration")?;

        let thresholds = args
            .thresholds()
            .into_iter()
            .map(|(metric, expr)| ThresholdSpec::parse(metric, expr))
            .collect::<Result<Vec<_>, _>>()
            .context("invalid threshold")?;

        let template = RequestTemplate {
            method: args.method.clone(),
            url: args.target_url.clone(),
            headers: args.headers(),
            body: Default::default(),
            timeout: args.timeout,
        };
        if args.timeout.is_zero() {
            anyhow::bail!("--timeout must be a positive duration");
        }
        for (name, value) in &template.headers {
            http::HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name: {name}"))?;
            http::HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
        }

        let client = HttpClientConfig {
            insecure_skip_tls_verify: args.insecure_skip_tls_verify,
            no_connection_reuse: args.no_connection_reuse,
            user_agent: Some(args.user_agent()),
            ..HttpClientConfig::default()
        };

        Ok(Self {
            ctx,
            template,
            thresholds,
            client,
        })
    }
}

fn check_target_url(url: &str) -> anyhow::Result<()> {
    let uri: http::Uri = url
        .parse()
        .with_context(|| format!("invalid --target-url: {url}"))?;
    match uri.scheme_str() {
        Some("http" | "https") if uri.host().is_some() => Ok(()),
        _ => anyhow::bail!("--target-url must be an absolute http:// or https:// URL: {url}"),
    }
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let plan = RunPlan::from_args(&args).map_err(RunError::InvalidInput)?;
    let transport = HttpTransport::new(plan.client.clone())
        .context("failed to build HTTP client")
        .map_err(RunError::RuntimeError)?;

    out.print_header(&plan);

    let signals = spawn_stop_handler(plan.ctx.cancel.clone());
    let res = rampload_core::run(
        &plan.ctx,
        RequestExecutor::new(Arc::new(transport)),
        plan.template.clone(),
        &plan.thresholds,
        out.progress(),
    )
    .await;
    signals.abort();

    let summary = res
        .context("load test failed")
        .map_err(RunError::RuntimeError)?;
    out.print_summary(&summary)
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_thresholds(summary.thresholds_passed()))
}

/// First Ctrl-C stops the run gracefully, a second one exits right away.
fn spawn_stop_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("stop requested; finishing in-flight requests (Ctrl-C again to exit now)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("aborted");
            std::process::exit(ExitCode::RuntimeError.as_i32());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser as _;

    fn plan(args: &[&str]) -> anyhow::Result<RunPlan> {
        let argv = ["rampload", "run"].into_iter().chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv)?;
        match cli.command {
            Command::Run(args) => RunPlan::from_args(&args),
        }
    }

    #[test]
    fn default_plan_is_valid() {
        let plan = plan(&[]).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(plan.ctx.timeline.total_duration().as_secs(), 120 + 120 + 600 + 60);
        assert_eq!(plan.ctx.config.max_vus, 50);
        assert_eq!(plan.thresholds.len(), 2);
        assert_eq!(plan.template.headers.len(), 2);
        assert!(!plan.client.insecure_skip_tls_verify);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(plan(&["--max-vus", "0"]).is_err());
        assert!(plan(&["--target-url", "ftp://example.com/"]).is_err());
        assert!(plan(&["--target-url", "/relative"]).is_err());
        assert!(plan(&["--threshold", "errors:rate<<1"]).is_err());
        assert!(plan(&["--timeout", "0s"]).is_err());
        assert!(plan(&["--tick", "0s"]).is_err());
        assert!(plan(&["--header", "Bad Name:x"]).is_err());
    }
}
