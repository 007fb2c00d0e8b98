// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap configuration: the handful of settings the daemon needs
//! before it can even open the state store, read from a small TOML
//! file rather than the plan itself (plan layering/merging is an
//! external collaborator's job; this is just "where do things live").

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parsing {path:?}: {source}")]
    Toml { path: PathBuf, source: toml::de::Error },
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BootConfig {
    /// Where the state store's snapshot and lockfile live.
    pub state_dir: PathBuf,
    /// Path to an already-validated, already-merged plan document.
    pub plan_path: PathBuf,
    #[serde(default = "default_log_buffer_bytes")]
    pub log_buffer_bytes: usize,
    /// The daemon process's own uid, used to grant Unix-socket peers
    /// running as the same user admin access by default.
    #[serde(default = "default_daemon_uid")]
    pub daemon_uid: u32,
}

fn default_log_buffer_bytes() -> usize {
    ovl_logs::DEFAULT_BUFFER_BYTES
}

fn default_daemon_uid() -> u32 {
    0
}

impl BootConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Toml { path: path.to_path_buf(), source })
    }

    pub fn state_snapshot_path(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_minimal_document_with_defaults_filled_in() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"state-dir = "/var/lib/ovl"
plan-path = "/etc/ovl/plan.json""#).unwrap();
        let cfg = BootConfig::load(file.path()).unwrap();
        assert_eq!(cfg.state_dir, PathBuf::from("/var/lib/ovl"));
        assert_eq!(cfg.log_buffer_bytes, ovl_logs::DEFAULT_BUFFER_BYTES);
        assert_eq!(cfg.daemon_uid, 0);
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = BootConfig::load(std::path::Path::new("/no/such/path.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
