//! Conversion invocation.
//!
//! Runs the external UUP-to-ISO conversion utility inside the working
//! directory and resolves the disc image it leaves behind. The utility can
//! legitimately run for hours, so its stdout is streamed line-by-line as it
//! is produced and no timeout is applied.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::error::PipelineError;

/// Entry point script shipped inside the conversion package.
pub const CONVERT_SCRIPT: &str = "uup_download_linux.sh";

/// Seam over the external conversion utility so tests can substitute a fake
/// without a subprocess dependency.
pub trait ConversionRunner {
    /// Run the conversion with `work_dir` as the current directory, blocking
    /// until it terminates. Returns the process exit code.
    fn run(&self, work_dir: &Path) -> Result<i32>;
}

/// Production runner: spawns a command and relays its stdout.
pub struct ScriptRunner {
    program: String,
    args: Vec<String>,
}

impl ScriptRunner {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// The standard converter invocation.
    pub fn uup_converter() -> Self {
        Self::new("bash", &[CONVERT_SCRIPT])
    }
}

impl ConversionRunner for ScriptRunner {
    fn run(&self, work_dir: &Path) -> Result<i32> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| {
                format!(
                    "spawning '{}' in '{}'",
                    self.program,
                    work_dir.display()
                )
            })?;

        let stdout = child
            .stdout
            .take()
            .context("capturing converter stdout")?;
        for line in BufReader::new(stdout).lines() {
            let line = line.context("reading converter output")?;
            println!("[convert] {line}");
        }

        let status = child.wait().context("waiting for converter to finish")?;
        // A signal death has no exit code; report it as -1.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Run the conversion and validate its completion status.
pub fn convert<R: ConversionRunner>(runner: &R, work_dir: &Path) -> Result<()> {
    println!("[convert] starting conversion in '{}'", work_dir.display());
    let exit_code = runner.run(work_dir)?;
    if exit_code != 0 {
        return Err(PipelineError::ConversionFailed { exit_code }.into());
    }
    println!("[convert] conversion finished");
    Ok(())
}

/// Resolve the one disc image the converter left in the working directory.
///
/// Zero or multiple matches means the converter broke its contract; fail
/// loudly rather than guess.
pub fn resolve_iso(work_dir: &Path) -> Result<PathBuf> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(work_dir)
        .with_context(|| format!("reading working directory '{}'", work_dir.display()))?
    {
        let entry = entry
            .with_context(|| format!("iterating working directory '{}'", work_dir.display()))?;
        let path = entry.path();
        let is_iso = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("iso"));
        if is_iso && path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    if matches.len() != 1 {
        return Err(PipelineError::IsoResolution {
            count: matches.len(),
        }
        .into());
    }
    Ok(matches.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_script_runner_streams_and_reports_exit_code() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptRunner::new("sh", &["-c", "echo converting; exit 0"]);
        assert_eq!(runner.run(temp.path()).unwrap(), 0);

        let runner = ScriptRunner::new("sh", &["-c", "echo boom; exit 7"]);
        assert_eq!(runner.run(temp.path()).unwrap(), 7);
    }

    #[test]
    fn test_convert_maps_nonzero_exit() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptRunner::new("sh", &["-c", "exit 3"]);
        let err = convert(&runner, temp.path()).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::ConversionFailed { exit_code }) => assert_eq!(*exit_code, 3),
            other => panic!("expected ConversionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_iso_exactly_one() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("22631.4317.ISO"), b"image").unwrap();
        fs::write(temp.path().join("progress.log"), b"log").unwrap();
        let iso = resolve_iso(temp.path()).unwrap();
        assert_eq!(iso.file_name().unwrap(), "22631.4317.ISO");
    }

    #[test]
    fn test_resolve_iso_zero_matches() {
        let temp = TempDir::new().unwrap();
        let err = resolve_iso(temp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::IsoResolution { count: 0 })
        ));
    }

    #[test]
    fn test_resolve_iso_multiple_matches() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.iso"), b"one").unwrap();
        fs::write(temp.path().join("b.iso"), b"two").unwrap();
        let err = resolve_iso(temp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::IsoResolution { count: 2 })
        ));
    }
}
