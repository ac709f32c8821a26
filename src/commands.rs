use anyhow::Context;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use lazarus_server::boot::SystemBootId;
use lazarus_server::integrations::{AdapterConfig, TmuxCli};
use lazarus_server::notifications::AlertBook;
use lazarus_server::persistence::{MemoryStore, PgStore, RecoveryStore};
use lazarus_server::{RecoveryDeps, RecoveryService};
use lazarus_utils::event::RecoveryEvent;
use lazarus_utils::recovery::RestoreRequest;

use crate::{CliArgs, Command};

const JOB_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let config = args.recovery_config();
    let store = open_store(args.database_url.as_deref()).await;
    let alerts = Arc::new(AlertBook::new());
    let service = RecoveryService::new(
        config.clone(),
        RecoveryDeps {
            tmux: Arc::new(TmuxCli::new(&AdapterConfig::from_recovery_config(&config))),
            store,
            boot: Arc::new(SystemBootId::new()),
            alerts: Some(alerts.clone()),
            projection: None,
        },
    );

    match args.command {
        Command::Daemon => run_daemon(&service, &alerts, args.shutdown_timeout).await,
        Command::Collect => print_json(&service.collect().await?),
        Command::Overview => print_json(&service.overview().await?),
        Command::Snapshots { session, limit } => {
            print_json(&service.list_snapshots(&session, limit).await?)
        }
        Command::Jobs { limit } => print_json(&service.list_jobs(limit).await?),
        Command::Archive { session } => print_json(&service.archive_session(&session).await?),
        Command::Restore {
            snapshot_id,
            mode,
            conflict,
            target,
        } => {
            let request = RestoreRequest {
                mode,
                conflict_policy: conflict,
                target_session: target,
                triggered_by: "cli".to_string(),
            };
            let job = service.restore_snapshot_async(snapshot_id, &request).await?;
            info!("Lazarus: waiting for restore job {}", job.id);
            let job = loop {
                let job = service.get_job(job.id).await?;
                if job.status.is_terminal() {
                    break job;
                }
                tokio::time::sleep(JOB_POLL_INTERVAL).await;
            };
            service.stop(args.shutdown_timeout).await;
            print_json(&job)
        }
    }
}

async fn open_store(database_url: Option<&str>) -> Arc<dyn RecoveryStore> {
    match database_url {
        Some(url) => match PgStore::connect(url).await {
            Ok(store) => {
                info!("Lazarus: using PostgreSQL store");
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    "Lazarus: PostgreSQL unavailable ({}), state will not survive this process",
                    e
                );
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            warn!("Lazarus: DATABASE_URL not set, state will not survive this process");
            Arc::new(MemoryStore::new())
        }
    }
}

async fn run_daemon(
    service: &RecoveryService,
    alerts: &AlertBook,
    shutdown_timeout: Duration,
) -> anyhow::Result<()> {
    let mut events = service.subscribe();
    let sweep = service.start().await.context("starting recovery service")?;
    info!(
        "Lazarus: daemon up ({} stale job(s) failed, {} session(s) reverted)",
        sweep.failed_jobs, sweep.reverted_sessions
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                break;
            }
            event = events.recv() => match event {
                Ok(RecoveryEvent::RecoveryOverviewChanged { reason, .. }) => {
                    for alert in alerts.open_alerts() {
                        warn!("Lazarus: [{}] {}: {}", reason, alert.title, alert.message);
                    }
                }
                Ok(event) => log::debug!("Lazarus: {}", event.kind()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Lazarus: event log skipped {} event(s)", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    info!("Lazarus: shutting down");
    if !service.stop(shutdown_timeout).await {
        warn!("Lazarus: some work did not finish within {:?}", shutdown_timeout);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
