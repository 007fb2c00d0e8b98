// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec/HTTP/TCP probes: a check is healthy iff its probe returns `Ok(())`
//! within the configured timeout.

use ovl_plan::{ExecProbe, HttpProbe, Probe, TcpProbe};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("exec probe failed: {0}")]
    Exec(String),
    #[error("http probe failed: {0}")]
    Http(String),
    #[error("tcp probe failed: {0}")]
    Tcp(String),
}

pub async fn run_probe(probe: &Probe, timeout: Duration) -> Result<(), ProbeError> {
    match tokio::time::timeout(timeout, run_probe_inner(probe)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

async fn run_probe_inner(probe: &Probe) -> Result<(), ProbeError> {
    match probe {
        Probe::Exec(exec) => run_exec(exec).await,
        Probe::Http(http) => run_http(http).await,
        Probe::Tcp(tcp) => run_tcp(tcp).await,
    }
}

async fn run_exec(exec: &ExecProbe) -> Result<(), ProbeError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&exec.command).envs(exec.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let Some(dir) = &exec.working_dir {
        cmd.current_dir(dir);
    }
    let status = cmd.status().await.map_err(|e| ProbeError::Exec(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(ProbeError::Exec(format!("exited with {status}")))
    }
}

async fn run_http(http: &HttpProbe) -> Result<(), ProbeError> {
    let client = reqwest::Client::new();
    let mut request = client.get(&http.url);
    for (key, value) in &http.headers {
        request = request.header(key, value);
    }
    let response = request.send().await.map_err(|e| ProbeError::Http(e.to_string()))?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(ProbeError::Http(format!("status {}", response.status())))
    }
}

async fn run_tcp(tcp: &TcpProbe) -> Result<(), ProbeError> {
    TcpStream::connect((tcp.host.as_str(), tcp.port)).await.map(|_| ()).map_err(|e| ProbeError::Tcp(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn an_exec_probe_that_exits_zero_succeeds() {
        let probe = Probe::Exec(ExecProbe {
            command: "true".to_string(),
            service_context: None,
            user: None,
            user_id: None,
            group: None,
            group_id: None,
            working_dir: None,
            environment: Default::default(),
        });
        assert!(run_probe(&probe, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn an_exec_probe_that_exits_nonzero_fails() {
        let probe = Probe::Exec(ExecProbe {
            command: "false".to_string(),
            service_context: None,
            user: None,
            user_id: None,
            group: None,
            group_id: None,
            working_dir: None,
            environment: Default::default(),
        });
        assert!(run_probe(&probe, Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn a_slow_exec_probe_times_out() {
        let probe = Probe::Exec(ExecProbe {
            command: "sleep 2".to_string(),
            service_context: None,
            user: None,
            user_id: None,
            group: None,
            group_id: None,
            working_dir: None,
            environment: Default::default(),
        });
        let result = run_probe(&probe, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }

    #[tokio::test]
    async fn tcp_probe_succeeds_against_a_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let probe = Probe::Tcp(TcpProbe { host: addr.ip().to_string(), port: addr.port() });
        assert!(run_probe(&probe, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn tcp_probe_fails_against_a_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let probe = Probe::Tcp(TcpProbe { host: addr.ip().to_string(), port: addr.port() });
        assert!(run_probe(&probe, Duration::from_secs(1)).await.is_err());
    }
}
