use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

mod bench;
mod config;
mod sim;
use config::HostConfig;

/// Set from the Ctrl-C handler; checked between ramp steps and scenario steps.
static ABORT: AtomicBool = AtomicBool::new(false);

fn init_tracing() -> Result<()> {
    // Default INFO; allow override via RUST_LOG
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install tracing subscriber")?;
    // The engine logs through the `log` facade.
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cfg = HostConfig::load_default()?.unwrap_or_default();
    info!(
        "Motorbank bench (density={:?}, step={:?}, realtime={})",
        cfg.controller.density,
        cfg.controller.ramp_step_delay(),
        cfg.realtime()
    );

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, aborting");
            ABORT.store(true, Ordering::Relaxed);
        }
    });

    // Ramps block between steps; keep them off the async workers.
    let summary = tokio::task::spawn_blocking(move || bench::run(&cfg, &ABORT))
        .await
        .context("Scenario worker panicked")??;

    info!(
        "Ran {} step(s): {} fault report(s), {} PWM write(s), {} bridge(s) driven, duties {:?}{}",
        summary.steps,
        summary.faults,
        summary.pwm_writes,
        summary.driven_bridges,
        summary.duties,
        if summary.aborted { " (aborted)" } else { "" }
    );
    Ok(())
}
