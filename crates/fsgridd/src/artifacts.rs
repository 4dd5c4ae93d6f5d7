//! Locating the executor and filesystem artifacts served to executors.
//!
//! When the config leaves `jar` or `hadoop` unset, the working directory
//! is searched for a file matching the artifact's name mask. With several
//! candidates the lexicographically greatest wins, which picks the newest
//! of versioned names like `hadoop-2.7.2.tar.gz`.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use fsgrid_core::SchedulerConfig;
use regex::Regex;
use tracing::{info, warn};

pub const JAR_MASK: &str = r"^fsgrid-executor.*\.jar$";
pub const HADOOP_MASK: &str = r"^hadoop-.*\.(tar\.gz|tgz)$";

/// Newest file in `dir` whose name matches `mask`.
pub fn find(dir: &Path, mask: &Regex) -> anyhow::Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;

    let mut found: Option<PathBuf> = None;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if !mask.is_match(&name.to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        if found.as_ref().is_none_or(|f| path > *f) {
            found = Some(path);
        }
    }
    Ok(found)
}

/// Fill `jar` and `hadoop` from `dir` when unset; reject configured paths
/// that do not exist.
pub fn resolve(config: &mut SchedulerConfig, dir: &Path) -> anyhow::Result<()> {
    resolve_one("jar", &mut config.jar, dir, JAR_MASK)?;
    resolve_one("hadoop", &mut config.hadoop, dir, HADOOP_MASK)?;
    Ok(())
}

fn resolve_one(name: &str, slot: &mut Option<PathBuf>, dir: &Path, mask: &str) -> anyhow::Result<()> {
    if let Some(path) = slot {
        if !path.is_file() {
            bail!("{name} not found: {}", path.display());
        }
        return Ok(());
    }

    let mask = Regex::new(mask)?;
    match find(dir, &mask)? {
        Some(path) => {
            info!(artifact = name, path = %path.display(), "artifact resolved");
            *slot = Some(path);
        }
        None => warn!(artifact = name, %mask, "artifact not found, tasks will not fetch it"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn finds_newest_match() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "hadoop-1.2.1.tar.gz");
        let newest = touch(dir.path(), "hadoop-2.7.2.tar.gz");
        touch(dir.path(), "hadoop-notes.txt");
        std::fs::create_dir(dir.path().join("hadoop-3.0.0.tgz")).unwrap();

        let mask = Regex::new(HADOOP_MASK).unwrap();
        assert_eq!(find(dir.path(), &mask).unwrap(), Some(newest));
    }

    #[test]
    fn resolves_unset_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let jar = touch(dir.path(), "fsgrid-executor-0.1.0.jar");

        let mut config = SchedulerConfig::default();
        resolve(&mut config, dir.path()).unwrap();
        assert_eq!(config.jar, Some(jar));
        assert_eq!(config.hadoop, None);
    }

    #[test]
    fn configured_artifact_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SchedulerConfig {
            hadoop: Some(dir.path().join("hadoop-2.7.2.tar.gz")),
            ..SchedulerConfig::default()
        };
        let err = resolve(&mut config, dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("hadoop not found"));
    }
}
