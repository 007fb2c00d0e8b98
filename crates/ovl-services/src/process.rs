// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process spawn, signal, and reap for a single service instance.
//!
//! Stdout/stderr are piped and forwarded line-by-line into the log broker;
//! the process runs in its own process group so a signal sent to `-pid`
//! reaches any children it spawned too.

use crate::signal::{parse_signal, UnknownSignal};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use ovl_core::Clock;
use ovl_logs::{LogBroker, Stream as LogStream};
use ovl_plan::ServiceConfig;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
    #[error(transparent)]
    UnknownSignal(#[from] UnknownSignal),
    #[error("signal delivery failed: {0}")]
    Kill(#[from] nix::errno::Errno),
}

/// A live child process plus what's needed to signal or reap it later.
pub struct ServiceProcess {
    child: Child,
    pub pid: u32,
}

impl ServiceProcess {
    /// Spawn `cfg.command` under `sh -c` in its own process group, piping
    /// stdout/stderr into `broker` under `service_name`.
    pub fn spawn<C: Clock>(
        service_name: &str,
        cfg: &ServiceConfig,
        broker: &Arc<LogBroker>,
        clock: &C,
    ) -> Result<Self, ProcessError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&cfg.command)
            .process_group(0)
            .envs(cfg.environment.iter().map(|(k, v)| (k.clone(), v.clone())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cfg.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().expect("freshly spawned child always has a pid");

        if let Some(stdout) = child.stdout.take() {
            spawn_log_forwarder(service_name.to_string(), LogStream::Stdout, stdout, Arc::clone(broker), clock.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_log_forwarder(service_name.to_string(), LogStream::Stderr, stderr, Arc::clone(broker), clock.clone());
        }

        Ok(Self { child, pid })
    }

    /// Send a named signal to the whole process group.
    pub fn signal(&self, name: &str) -> Result<(), ProcessError> {
        let signum = parse_signal(name)?;
        let signal = Signal::try_from(signum).unwrap_or(Signal::SIGTERM);
        kill(Pid::from_raw(-(self.pid as i32)), signal)?;
        Ok(())
    }

    /// Block until the process exits, returning its exit code (`None` if
    /// it was terminated by a signal rather than exiting normally).
    pub async fn wait(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(_) => None,
        }
    }

    /// Non-blocking poll, for a reaper loop. `Some(code)` once the process
    /// has exited; `None` while it's still running.
    pub fn try_wait(&mut self) -> Option<Option<i32>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code()),
            _ => None,
        }
    }
}

fn spawn_log_forwarder<C: Clock>(
    service: String,
    stream: LogStream,
    reader: impl AsyncRead + Unpin + Send + 'static,
    broker: Arc<LogBroker>,
    clock: C,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            broker.write(&service, stream, line, clock.epoch_ms());
        }
    });
}
