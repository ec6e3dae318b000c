use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::NaiveTime;
use clap::Parser;

use boardagenda::app::{AppState, router};
use boardagenda::approval::ApprovalTracker;
use boardagenda::cache::{CacheConfig, DocumentCache};
use boardagenda::pending_store::{LocalFsPendingStore, PendingStore};
use boardagenda::schedule::ThirdWednesday;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, env = "BOARDAGENDA_ADDR", default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Directory holding `board_agenda_*.txt`.
    #[arg(long, env = "BOARDAGENDA_AGENDA_DIR")]
    agenda_dir: PathBuf,

    /// Minutes files, plus pending approvals under `pending/`.
    #[arg(long, env = "BOARDAGENDA_WORK_DIR", default_value = "workspace-agenda")]
    work_dir: PathBuf,

    /// Path to `committee-info.txt`.
    #[arg(long)]
    roster: Option<PathBuf>,

    /// UTC time of day meetings start.
    #[arg(long, default_value = "17:30:00")]
    meeting_time: NaiveTime,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    boardagenda::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting boardagenda-app");

    let store: Arc<dyn PendingStore> =
        Arc::new(LocalFsPendingStore::new(args.work_dir.join("pending")));
    let approvals = ApprovalTracker::open(store).context("open approval tracker")?;
    let cache = DocumentCache::new(CacheConfig {
        minutes_dir: Some(args.work_dir.clone()),
    });

    let state = AppState {
        agenda_dir: args.agenda_dir,
        work_dir: args.work_dir,
        roster: args.roster,
        cache: Arc::new(cache),
        approvals: Arc::new(approvals),
        schedule: Arc::new(ThirdWednesday {
            time: args.meeting_time,
        }),
    };

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
