use std::process::Command;

use anyhow::Context as _;
use rampload_testserver::TestServer;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

async fn run_rampload(args: Vec<String>) -> anyhow::Result<std::process::Output> {
    let exe = env!("CARGO_BIN_EXE_rampload");
    tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .arg("run")
            .args(&args)
            .env_remove("RUST_LOG")
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run rampload binary")
}

fn ensure_code(out: &std::process::Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn short_run(url: &str) -> Vec<String> {
    [
        "--target-url",
        url,
        "--stage",
        "300ms:2",
        "--stage",
        "200ms:0",
        "--tick",
        "50ms",
        "--think-time",
        "1ms..5ms",
        "--output",
        "json",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_rampload");

    let out = Command::new(exe)
        .arg("run")
        .arg("--duration")
        .arg("10x")
        .output()
        .context("run rampload binary")?;

    ensure_code(&out, 30)
}

#[tokio::test]
async fn invalid_threshold_exits_30() -> anyhow::Result<()> {
    let mut args = short_run("http://127.0.0.1:9/");
    args.extend(["--threshold".to_string(), "errors:rate<<1".to_string()]);
    let out = run_rampload(args).await?;
    ensure_code(&out, 30)
}

#[tokio::test]
async fn passing_run_exits_0() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let out = run_rampload(short_run(&server.urls().hello)).await?;
    server.shutdown().await;

    ensure_code(&out, 0)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let summary = stdout
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .find(|v| v["kind"] == "summary")
        .context("summary line")?;
    anyhow::ensure!(summary["thresholds_passed"] == true, "{summary}");
    Ok(())
}

#[tokio::test]
async fn thresholds_failed_exit_11() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let out = run_rampload(short_run(&server.urls().status(503))).await?;
    server.shutdown().await;

    ensure_code(&out, 11)
}
