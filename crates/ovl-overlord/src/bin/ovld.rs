// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon entrypoint: load bootstrap configuration, open the state
//! store, build the facade, and run it until told to stop. The control
//! API (HTTP listener, request routing) is an external collaborator not
//! implemented here; this binary is the process that collaborator would
//! be embedded in.

use ovl_core::clock::SystemClock;
use ovl_logs::LogBroker;
use ovl_overlord::{bootid, config::BootConfig, Overlord, RunOutcome};
use ovl_plan::Plan;
use ovl_state::StateStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

fn config_path() -> PathBuf {
    std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("ovld.toml"))
}

fn load_plan(path: &std::path::Path) -> anyhow::Result<Plan> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(RunOutcome::Shutdown) => ExitCode::SUCCESS,
        // A restart request just ends this process cleanly; whatever
        // supervises it (systemd, a wrapper script) is expected to
        // start it again.
        Ok(RunOutcome::Restart) => ExitCode::from(75),
        Err(e) => {
            tracing::error!(error = %e, "overlord exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<RunOutcome> {
    let config = BootConfig::load(&config_path())?;
    std::fs::create_dir_all(&config.state_dir)?;

    let boot_id = bootid::current(&config.state_dir.join("boot-id"));
    let state = Arc::new(StateStore::load(config.state_snapshot_path(), boot_id)?);
    if state.rebooted() {
        tracing::info!("state store recovered from a prior boot");
    }

    let plan = Arc::new(load_plan(&config.plan_path)?);
    let broker = Arc::new(LogBroker::new(config.log_buffer_bytes));

    let overlord = Overlord::new(plan, state, broker, SystemClock, config.daemon_uid);

    let shutdown_overlord = Arc::clone(&overlord);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, shutting down");
            shutdown_overlord.request_shutdown();
        }
    });

    Ok(overlord.run().await)
}
