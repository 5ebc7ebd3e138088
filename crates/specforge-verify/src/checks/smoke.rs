use std::net::{Ipv4Addr, TcpListener};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use reqwest::blocking::Client;
use serde_json::json;
use specforge_config::CheckKind;
use specforge_runner::RunningProcess;
use tracing::debug;

use super::CheckContext;
use crate::environment::tail;
use crate::report::CheckResult;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

enum Outcome {
    Ready,
    Exited(Option<i32>),
    TimedOut(Option<u16>),
}

/// Start the service on a free local port and wait for its health route.
pub(crate) fn check(ctx: &CheckContext<'_>) -> anyhow::Result<CheckResult> {
    if !ctx.path(&ctx.profile.entry_point).is_file() {
        return Ok(CheckResult::fail(
            CheckKind::Smoke,
            format!("Missing {}", ctx.profile.entry_point),
        ));
    }
    let env = ctx.env.context("python environment was not prepared")?;

    let port = free_port().context("reserving a local port")?;
    let client = probe_client().context("building the health probe client")?;
    let cmd = env
        .module_command(ctx.project_dir, "uvicorn")
        .arg(&ctx.profile.asgi_app)
        .args(["--host", "127.0.0.1", "--port"])
        .arg(port.to_string());
    debug!(command = %cmd.display(), "Starting service");

    let mut process = match ctx.runner.start(&cmd) {
        Ok(p) => p,
        Err(e) => {
            return Ok(CheckResult::fail(
                CheckKind::Smoke,
                format!("Could not start the service: {e}"),
            ));
        }
    };

    let outcome = wait_until_ready(
        process.as_mut(),
        &client,
        port,
        &ctx.profile.health_path,
        ctx.timeouts.smoke,
    );
    let output = process.terminate();
    let log_tail = tail(&output.combined(), 10);

    let health = &ctx.profile.health_path;
    let result = match outcome {
        Outcome::Ready => {
            CheckResult::pass(CheckKind::Smoke, format!("GET {health} returned 200"))
        }
        Outcome::Exited(code) => CheckResult::fail(
            CheckKind::Smoke,
            format!(
                "Service exited during startup (exit {}):\n{log_tail}",
                code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            ),
        ),
        Outcome::TimedOut(Some(status)) => CheckResult::fail(
            CheckKind::Smoke,
            format!("GET {health} returned {status}"),
        ),
        Outcome::TimedOut(None) => CheckResult::fail(
            CheckKind::Smoke,
            format!(
                "Service did not answer GET {health} within {}s",
                ctx.timeouts.smoke.as_secs()
            ),
        ),
    };
    Ok(result.with_evidence(json!({ "port": port, "log_tail": log_tail })))
}

fn wait_until_ready(
    process: &mut dyn RunningProcess,
    client: &Client,
    port: u16,
    path: &str,
    timeout: Duration,
) -> Outcome {
    let deadline = Instant::now() + timeout;
    let mut last_status = None;
    loop {
        match process.try_exit_code() {
            Ok(Some(code)) => return Outcome::Exited(code),
            Ok(None) => {}
            Err(e) => {
                debug!(error = %e, "Polling service process failed");
                return Outcome::Exited(None);
            }
        }
        match probe(client, port, path) {
            Some(200) => return Outcome::Ready,
            Some(status) => last_status = Some(status),
            None => {}
        }
        let now = Instant::now();
        if now >= deadline {
            return Outcome::TimedOut(last_status);
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

fn probe_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(PROBE_TIMEOUT)
        .connect_timeout(PROBE_TIMEOUT)
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
}

/// Status code of `GET path`, or `None` while nothing answers.
fn probe(client: &Client, port: u16, path: &str) -> Option<u16> {
    let url = format!("http://127.0.0.1:{port}{path}");
    match client.get(&url).send() {
        Ok(response) => Some(response.status().as_u16()),
        Err(e) => {
            debug!(error = %e, "Health probe got no answer");
            None
        }
    }
}
