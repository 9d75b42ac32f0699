//! Prerequisite checker for the launcher
//!
//! Validates that the runtimes listed in the launcher config are on PATH and,
//! where a version requirement is given, reports whether it is met.

use semver::{Version, VersionReq};
use snafu::OptionExt;
use std::path::PathBuf;

use crate::bootstrap::host::Host;
use crate::config::PrerequisiteSpec;
use crate::error::{MissingRuntimeSnafu, Result};

/// Result of checking a single runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryCheck {
    pub name: String,
    pub path: PathBuf,
    pub installed_version: Option<String>,
    pub meets_requirement: bool,
}

/// Resolve one prerequisite, failing with `MissingRuntime` if it is absent
pub fn check_prerequisite(host: &impl Host, spec: &PrerequisiteSpec) -> Result<BinaryCheck> {
    let path = host.which(&spec.name).context(MissingRuntimeSnafu {
        name: &spec.name,
        label: &spec.label,
        hint: &spec.hint,
    })?;
    tracing::debug!("found {} at {}", spec.name, path.display());

    let Some(requirement) = spec.version.as_deref() else {
        return Ok(BinaryCheck {
            name: spec.name.clone(),
            path,
            installed_version: None,
            meets_requirement: true,
        });
    };

    let installed_version = host
        .version_output(&path)
        .as_deref()
        .and_then(extract_version);

    // 🤓 Binary found but version unknown - assume OK
    let meets_requirement = installed_version.as_deref().is_none_or(|installed| {
        version_meets_requirement(installed, requirement).unwrap_or(true)
    });

    if !meets_requirement {
        tracing::warn!(
            "{} {} does not satisfy {}; the server may not start",
            spec.label,
            installed_version.as_deref().unwrap_or("unknown"),
            requirement
        );
    }

    Ok(BinaryCheck {
        name: spec.name.clone(),
        path,
        installed_version,
        meets_requirement,
    })
}

/// Check every prerequisite in order, stopping at the first missing one
pub fn check_prerequisites(
    host: &impl Host,
    specs: &[PrerequisiteSpec],
) -> Result<Vec<BinaryCheck>> {
    specs
        .iter()
        .map(|spec| check_prerequisite(host, spec))
        .collect()
}

/// Extract semantic version from version output
/// Handles various formats:
///   "v20.11.1" -> "20.11.1"
///   "npm 10.2.4" -> "10.2.4"
///   "git version 2.34.1" -> "2.34.1"
fn extract_version(output: &str) -> Option<String> {
    let re = regex::Regex::new(r"v?(\d+\.\d+\.\d+)").ok()?;
    re.captures(output)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Check if installed version meets a requirement like ">=18.0.0"
fn version_meets_requirement(installed: &str, requirement: &str) -> Result<bool, semver::Error> {
    let installed = Version::parse(installed.trim())?;
    let requirement = VersionReq::parse(requirement.trim())?;
    Ok(requirement.matches(&installed))
}
