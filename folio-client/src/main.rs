use std::sync::Arc;

use anyhow::Context;
use env_logger::{Builder, Target};
use folio_client::{ClientConfig, JobEngine, PartitionGenerations};
use log::LevelFilter;

fn init_logger() {
    Builder::new()
        .target(Target::Stdout)
        .filter_level(LevelFilter::Warn)
        .filter_module("folio_client", LevelFilter::Debug)
        .filter_module("folio_jobs", LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        init_logger();
    } else {
        env_logger::init();
    }

    let config = ClientConfig::load();
    config.validate().context("invalid client configuration")?;

    let generations = Arc::new(PartitionGenerations::new());
    let engine = JobEngine::builder(config)
        .invalidator(generations.clone())
        .on_job_failed(|failure| {
            log::error!("Job {} failed: {}", failure.runner_id, failure.message)
        })
        .start()
        .context("failed to start job engine")?;

    let mut jobs = engine.jobs().subscribe();
    let mut connectivity = engine.connectivity().subscribe();
    let mut invalidations = generations.subscribe();

    log::info!("Watching jobs at {}", engine.config().server_url);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
            changed = jobs.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = jobs.borrow_and_update().clone();
                log::info!("{} job(s) tracked", snapshot.len());
                for (runner_id, job) in snapshot.iter() {
                    log::info!(
                        "  {} [{}] {} {}/{} {}",
                        runner_id,
                        job.kind,
                        job.status.as_str(),
                        job.current_task.unwrap_or_default(),
                        job.task_count.unwrap_or_default(),
                        job.message.as_deref().unwrap_or_default()
                    );
                }
            }
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = connectivity.borrow_and_update().clone();
                match (state.is_open, state.last_error) {
                    (true, _) => log::info!("Server reachable"),
                    (false, Some(err)) => {
                        log::warn!("Server unreachable: {}", err)
                    }
                    (false, None) => log::warn!("Server unreachable"),
                }
            }
            changed = invalidations.changed() => {
                if changed.is_err() {
                    break;
                }
                let total = *invalidations.borrow_and_update();
                log::debug!("{} cache invalidation(s) so far", total);
            }
        }
    }

    engine.dispose().await;
    Ok(())
}
