use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use log::{error, info};
use serde::Deserialize;

use bucketfs::cadapter::client::ObjectClient;
use bucketfs::cadapter::s3::{S3Backend, S3Config};
use bucketfs::fuse::fs::FuseFs;
use bucketfs::fuse::mount::mount_unprivileged;
use bucketfs::vfs::Vfs;

/// Mount S3-compatible object storage as a local directory tree.
#[derive(Debug, Parser)]
#[command(name = "bucketfs", version, about)]
struct Cli {
    /// Object store endpoint URL.
    #[arg(long, env = "S3_ENDPOINT", default_value = "http://localhost:4566")]
    endpoint: String,

    /// Region handed to the store client.
    #[arg(long, env = "AWS_REGION", default_value = "ap-northeast-1")]
    region: String,

    /// Mount point; created if missing. Defaults to ~/mount/bucketfs.
    #[arg(long)]
    mountpoint: Option<PathBuf>,

    /// Allow other users to access the mount.
    #[arg(long)]
    allow_other: bool,

    /// Skip the endpoint health probe (for stores without /health).
    #[arg(long)]
    skip_health_check: bool,

    /// Verbose per-operation logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Deserialize)]
struct Health {
    services: HealthServices,
}

#[derive(Debug, Deserialize)]
struct HealthServices {
    s3: Option<String>,
}

/// Probe `<endpoint>/health` and require the s3 service to be up before
/// mounting; a mount over a dead endpoint fails on first access otherwise.
async fn health_check(endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{endpoint}/health");
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("endpoint is not reachable at {url}"))?;
    let status = resp.status();
    let body = resp.text().await.context("read health response body")?;
    let health: Health = serde_json::from_str(&body)
        .with_context(|| format!("health response is invalid, status {status}, body {body}"))?;
    match health.services.s3.as_deref() {
        Some("running") | Some("available") => Ok(()),
        state => bail!("s3 service is not running at {endpoint} (state {state:?})"),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let mountpoint = match cli.mountpoint {
        Some(path) => path,
        None => dirs::home_dir()
            .context("cannot determine home directory for the default mount point")?
            .join("mount")
            .join("bucketfs"),
    };
    std::fs::create_dir_all(&mountpoint)
        .with_context(|| format!("create mount point {}", mountpoint.display()))?;

    if !cli.skip_health_check {
        health_check(&cli.endpoint).await?;
    }

    let backend = S3Backend::new(S3Config {
        endpoint: cli.endpoint,
        region: cli.region,
        ..S3Config::default()
    })
    .await;
    let fs = FuseFs::new(Vfs::new(ObjectClient::new(backend)));

    info!("mount start: {}", mountpoint.display());
    let mut mount_handle = mount_unprivileged(fs, &mountpoint, cli.allow_other)
        .await
        .with_context(|| format!("mount at {}", mountpoint.display()))?;

    let handle = &mut mount_handle;
    tokio::select! {
        res = handle => res.context("fuse session ended unexpectedly")?,
        _ = shutdown_signal() => {
            info!("unmounting {}", mountpoint.display());
            if let Err(err) = mount_handle.unmount().await {
                error!("unmount failed, may be in use by another process: {err}");
                return Err(err.into());
            }
            info!("unmounted");
        }
    }
    Ok(())
}
