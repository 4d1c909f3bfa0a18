use clap::{Args, Parser, Subcommand};
use rampload_core::{Stage, ThinkTime};
use std::time::Duration;

pub(crate) const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub(crate) const DEFAULT_ACCEPT_LANGUAGE: &str = "pt-BR,pt;q=0.9,en;q=0.8";

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m): {err}"))
}

/// `DURATION:TARGET`, e.g. `30s:10`.
fn parse_stage(input: &str) -> Result<Stage, String> {
    let (duration, target) = input
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid stage '{input}' (expected DURATION:TARGET, e.g. 30s:10)"))?;
    let duration = parse_duration(duration)?;
    if duration.is_zero() {
        return Err(format!("invalid stage '{input}': duration must be positive"));
    }
    let target: u64 = target
        .trim()
        .parse()
        .map_err(|_| format!("invalid stage '{input}': target must be a non-negative integer"))?;
    Ok(Stage::new(duration, target))
}

/// `MIN..MAX`, e.g. `100ms..600ms`; a single duration means a fixed pause.
fn parse_think_time(input: &str) -> Result<ThinkTime, String> {
    let s = input.trim();
    let (min, max) = match s.split_once("..") {
        Some((min, max)) => (parse_duration(min)?, parse_duration(max)?),
        None => {
            let d = parse_duration(s)?;
            (d, d)
        }
    };
    ThinkTime::new(min, max).map_err(|err| err.to_string())
}

/// `NAME:VALUE`.
fn parse_header(input: &str) -> Result<(String, String), String> {
    let (name, value) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid header '{input}' (expected NAME:VALUE)"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid header '{input}': empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// `METRIC:EXPR`, e.g. `http_req_duration:p(95)<5000`.
fn parse_threshold(input: &str) -> Result<(String, String), String> {
    let (metric, expr) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid threshold '{input}' (expected METRIC:EXPR)"))?;
    Ok((metric.trim().to_string(), expr.trim().to_string()))
}

fn parse_method(input: &str) -> Result<http::Method, String> {
    http::Method::from_bytes(input.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method '{input}'"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a summary object to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "rampload",
    author,
    version,
    about = "Staged HTTP load generator",
    long_about = "rampload drives one target URL with a time-varying number of virtual users.\n\nThe load profile is a list of stages, each ramping linearly to a target VU count. Without `--stage`, a four-stage profile is derived from `--max-vus`, `--ramp-up`, `--duration` and `--ramp-down`.\n\nEvery option can also be set through the environment variable shown in `--help`.",
    after_help = "Examples:\n  rampload run --target-url https://example.com/\n  rampload run --target-url http://127.0.0.1:8080/ --max-vus 20 --duration 1m --ramp-up 10s --ramp-down 10s\n  rampload run --stage 30s:10 --stage 1m:10 --stage 10s:0 --output json\n  TARGET_URL=https://example.com/ MAX_VUS=100 rampload run"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test
    #[command(
        long_about = "Run a staged load test against the target URL and report latency, error rate and threshold results.\n\nPress Ctrl-C once to stop early (metrics are still summarized); press it again to exit immediately."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// URL every virtual user requests
    #[arg(long, env = "TARGET_URL", default_value = "http://127.0.0.1:8080/")]
    pub target_url: String,

    /// Maximum number of concurrent virtual users
    #[arg(long, env = "MAX_VUS", default_value_t = 50)]
    pub max_vus: u64,

    /// Sustained-load duration of the derived profile
    #[arg(long, env = "TEST_DURATION", default_value = "10m", value_parser = parse_duration)]
    pub duration: Duration,

    /// Duration of each of the two ramp-up stages of the derived profile
    #[arg(long, env = "RAMP_UP", default_value = "2m", value_parser = parse_duration)]
    pub ramp_up: Duration,

    /// Duration of the ramp-down stage of the derived profile
    #[arg(long, env = "RAMP_DOWN", default_value = "1m", value_parser = parse_duration)]
    pub ramp_down: Duration,

    /// Explicit stage (repeatable, DURATION:TARGET); replaces the derived profile
    #[arg(
        long = "stage",
        env = "STAGES",
        value_name = "DURATION:TARGET",
        value_delimiter = ',',
        value_parser = parse_stage
    )]
    pub stages: Vec<Stage>,

    /// Per-request timeout
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Accept any TLS certificate
    #[arg(long, env = "INSECURE_SKIP_TLS_VERIFY")]
    pub insecure_skip_tls_verify: bool,

    /// Open a new connection for every request
    #[arg(long, env = "NO_CONNECTION_REUSE")]
    pub no_connection_reuse: bool,

    /// User-Agent header (defaults to rampload/<version>)
    #[arg(long, env = "USER_AGENT")]
    pub user_agent: Option<String>,

    /// Pause between a virtual user's requests (MIN..MAX, uniform)
    #[arg(
        long,
        env = "THINK_TIME",
        value_name = "MIN..MAX",
        default_value = "100ms..600ms",
        value_parser = parse_think_time
    )]
    pub think_time: ThinkTime,

    /// HTTP method
    #[arg(long, env = "HTTP_METHOD", default_value = "GET", value_parser = parse_method)]
    pub method: http::Method,

    /// Request header (repeatable, NAME:VALUE); replaces the default Accept headers
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Threshold (repeatable, METRIC:EXPR); replaces the default thresholds
    #[arg(long = "threshold", value_name = "METRIC:EXPR", value_parser = parse_threshold)]
    pub thresholds: Vec<(String, String)>,

    /// VU reconciliation interval
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub tick: Duration,

    /// How long to wait for in-flight requests after the run stops
    #[arg(long, env = "GRACEFUL_STOP", default_value = "30s", value_parser = parse_duration)]
    pub graceful_stop: Duration,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

impl RunArgs {
    /// Explicit stages, or ramp to 30% and then to max, sustain, ramp down.
    pub fn stages(&self) -> Vec<Stage> {
        if !self.stages.is_empty() {
            return self.stages.clone();
        }
        let warm = self.max_vus / 10 * 3 + self.max_vus % 10 * 3 / 10;
        vec![
            Stage::new(self.ramp_up, warm),
            Stage::new(self.ramp_up, self.max_vus),
            Stage::new(self.duration, self.max_vus),
            Stage::new(self.ramp_down, 0),
        ]
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        if !self.headers.is_empty() {
            return self.headers.clone();
        }
        vec![
            ("Accept".to_string(), DEFAULT_ACCEPT.to_string()),
            (
                "Accept-Language".to_string(),
                DEFAULT_ACCEPT_LANGUAGE.to_string(),
            ),
        ]
    }

    pub fn thresholds(&self) -> Vec<(String, String)> {
        if !self.thresholds.is_empty() {
            return self.thresholds.clone();
        }
        vec![
            ("http_req_duration".to_string(), "p(95)<5000".to_string()),
            ("errors".to_string(), "rate<0.5".to_string()),
        ]
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("rampload/{}", env!("CARGO_PKG_VERSION")))
    }
}
