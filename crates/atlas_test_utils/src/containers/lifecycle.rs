//! Bring the compose-managed test databases up and wait until they answer.

use crate::config::{DbVersion, TestDbConfig};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// MySQL 8 initialises its data directory on first boot, which is slow.
const STARTUP_DEADLINE: Duration = Duration::from_secs(90);
const READY_CHECK_INTERVAL: Duration = Duration::from_millis(500);
const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

pub fn docker_compose_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("docker")
        .join("docker-compose.yml")
}

fn succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

pub fn is_docker_available() -> bool {
    succeeds("docker", &["info"])
}

/// Run a compose subcommand against our compose file, preferring the
/// `docker compose` plugin over the standalone binary.
fn compose(args: &[&str]) -> Result<Output> {
    let file = docker_compose_path();

    if let Ok(out) = Command::new("docker")
        .arg("compose")
        .arg("-f")
        .arg(&file)
        .args(args)
        .output()
    {
        if out.status.success() {
            return Ok(out);
        }
    }

    Command::new("docker-compose")
        .arg("-f")
        .arg(&file)
        .args(args)
        .output()
        .with_context(|| format!("docker compose {} failed", args.join(" ")))
}

fn compose_checked(args: &[&str]) -> Result<()> {
    let out = compose(args)?;
    if !out.status.success() {
        bail!(
            "docker compose {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr)
        );
    }
    Ok(())
}

pub fn is_container_running(version: DbVersion) -> bool {
    compose(&["ps", "-q", version.service_name()])
        .map(|out| !out.stdout.is_empty())
        .unwrap_or(false)
}

/// Tear down every test database, volumes included.
pub fn stop_all_containers() -> Result<()> {
    info!("Removing test database containers");
    compose_checked(&["down", "-v"])
}

async fn answers_select_one(version: DbVersion) -> bool {
    let url = TestDbConfig::new(version).connection_string();

    let check = async {
        if version.is_postgres() {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(1)
                .connect(&url)
                .await?;
            sqlx::query("SELECT 1").execute(&pool).await.map(|_| ())
        } else {
            let pool = sqlx::mysql::MySqlPoolOptions::new()
                .max_connections(1)
                .connect(&url)
                .await?;
            sqlx::query("SELECT 1").execute(&pool).await.map(|_| ())
        }
    };

    matches!(timeout(READY_CHECK_TIMEOUT, check).await, Ok(Ok(())))
}

/// Poll until the database runs `SELECT 1` or the startup deadline passes.
pub async fn wait_for_healthy(version: DbVersion) -> Result<()> {
    let started = Instant::now();
    info!("Waiting for {} on port {}", version, version.port());

    while !answers_select_one(version).await {
        if started.elapsed() > STARTUP_DEADLINE {
            bail!("{} did not become ready within {:?}", version, STARTUP_DEADLINE);
        }
        sleep(READY_CHECK_INTERVAL).await;
    }

    debug!("{} ready after {:?}", version, started.elapsed());
    Ok(())
}

/// Start the service for `version` unless it is already up, then wait for it.
pub async fn ensure_container_running(version: DbVersion) -> Result<()> {
    if !is_docker_available() {
        bail!("Docker is not available; the docker-tests feature needs a running daemon");
    }

    if !is_container_running(version) {
        info!("Starting {}", version.service_name());
        compose_checked(&["up", "-d", version.service_name()])?;
    }

    wait_for_healthy(version).await
}
