//! Preflight checks for build validation.
//!
//! Validates that the host system has the required tools before a pipeline
//! run starts. This prevents cryptic failures hours into a conversion.

use anyhow::{bail, Result};

/// Required host tools for a full pipeline run.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("bash", "bash"),
    ("wiminfo", "wimlib"),
    ("mount", "util-linux"),
    ("umount", "util-linux"),
];

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// Returns an error listing every missing tool and the package providing it.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();
    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check that all tools a pipeline run needs are available.
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}
