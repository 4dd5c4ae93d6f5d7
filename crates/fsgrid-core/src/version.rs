//! Cluster-manager version gate.

use semver::Version;

use crate::error::CoreError;

/// Oldest cluster-manager release the scheduler talks to.
pub const MIN_MASTER_VERSION: Version = Version::new(0, 23, 0);

/// Parse a dotted version, padding `x` and `x.y` to three components.
pub fn parse_version(s: &str) -> Result<Version, CoreError> {
    let s = s.trim();
    let padded = match s.matches('.').count() {
        0 => format!("{s}.0.0"),
        1 => format!("{s}.0"),
        _ => s.to_string(),
    };
    Version::parse(&padded).map_err(|e| CoreError::InvalidVersion(format!("{s}: {e}")))
}

/// Accept `version` if it is present and at least [`MIN_MASTER_VERSION`].
pub fn check_master_version(version: Option<&str>) -> Result<Version, CoreError> {
    let raw = version
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CoreError::InvalidVersion("master version unknown".to_string()))?;

    let version = parse_version(raw)?;
    if version < MIN_MASTER_VERSION {
        return Err(CoreError::InvalidVersion(format!(
            "{version} < {MIN_MASTER_VERSION}"
        )));
    }
    Ok(version)
}
