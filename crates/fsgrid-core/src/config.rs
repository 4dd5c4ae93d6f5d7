//! Scheduler configuration (`fsgrid.toml`).
//!
//! Every field has a default except `master`; `fsgridd scheduler` flags
//! override whatever the file sets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::period::{Period, TimeUnit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Public URL of the management API; its port is the bind port.
    pub api: String,
    /// Cluster manager URL, e.g. `http://master:5050`.
    pub master: Option<String>,
    pub user: Option<String>,
    pub principal: Option<String>,
    pub secret: Option<String>,

    pub framework_name: String,
    pub framework_role: String,
    pub framework_timeout: Period,

    /// `file:<path>` or `redb:<path>`.
    pub storage: String,

    /// Executor and filesystem distribution served under `/jar/` and `/hadoop/`.
    pub jar: Option<PathBuf>,
    pub hadoop: Option<PathBuf>,

    pub reconcile_delay: Period,
    pub reconcile_max_tries: u32,

    pub executor_command: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            api: "http://0.0.0.0:7000".to_string(),
            master: None,
            user: None,
            principal: None,
            secret: None,
            framework_name: "hdfs".to_string(),
            framework_role: "*".to_string(),
            framework_timeout: Period::new(30, TimeUnit::D),
            storage: "file:fsgrid-state.json".to_string(),
            jar: None,
            hadoop: None,
            reconcile_delay: Period::new(30, TimeUnit::S),
            reconcile_max_tries: 3,
            executor_command: "./fsgrid-executor".to_string(),
        }
    }
}

/// Where the node registry is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    File(PathBuf),
    Redb(PathBuf),
}

impl StorageUri {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.split_once(':') {
            Some(("file", path)) if !path.is_empty() => Ok(StorageUri::File(path.into())),
            Some(("redb", path)) if !path.is_empty() => Ok(StorageUri::Redb(path.into())),
            _ => Err(CoreError::Config(format!("invalid storage: {s}"))),
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the fields the scheduler cannot start without.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.master.as_deref().is_none_or(str::is_empty) {
            return Err(CoreError::Config("master required".to_string()));
        }
        if self.reconcile_max_tries == 0 {
            return Err(CoreError::Config("reconcile_max_tries must be > 0".to_string()));
        }
        self.api_port()?;
        StorageUri::parse(&self.storage)?;
        Ok(())
    }

    /// Port of the `api` URL (80 when absent).
    pub fn api_port(&self) -> Result<u16, CoreError> {
        let invalid = || CoreError::Config(format!("invalid api: {}", self.api));

        let rest = self.api.strip_prefix("http://").ok_or_else(invalid)?;
        let authority = rest.split('/').next().unwrap_or(rest);
        match authority.rsplit_once(':') {
            Some((_, port)) => port.parse().map_err(|_| invalid()),
            None if !authority.is_empty() => Ok(80),
            None => Err(invalid()),
        }
    }

    pub fn storage_uri(&self) -> Result<StorageUri, CoreError> {
        StorageUri::parse(&self.storage)
    }

    /// File name of an artifact path, as it appears in download URLs.
    pub fn artifact_name(path: &Path) -> Option<String> {
        path.file_name().map(|n| n.to_string_lossy().into_owned())
    }
}
