//! Pipeline orchestration.
//!
//! One target runs start to finish through the five stages: select a build
//! from the catalog, stage the conversion package, run the converter,
//! resolve the disc image, finalize the artifact set. Strictly sequential,
//! no shared state between targets beyond the destination directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::catalog::{CatalogClient, CatalogTransport};
use crate::convert::{self, ConversionRunner};
use crate::finalize::{self, BuildArtifact};
use crate::select;
use crate::stage;
use crate::target::TargetSpec;
use crate::wim::ImageInspector;

/// Working directory for one target, uniquely named after it. Destroyed and
/// recreated at the start of every run.
pub fn work_dir_for(destination: &Path, target: &TargetSpec) -> PathBuf {
    destination.join(".work").join(target.name)
}

/// Build one target end to end and return the finished artifact.
pub fn run_target<T, R, I>(
    client: &CatalogClient<T>,
    runner: &R,
    inspector: &I,
    target: &TargetSpec,
    destination: &Path,
) -> Result<BuildArtifact>
where
    T: CatalogTransport,
    R: ConversionRunner,
    I: ImageInspector,
{
    println!("[pipeline] building target '{}'", target.name);

    let selected = select::select_build(client, target)
        .with_context(|| format!("selecting a build for '{}'", target.name))?;

    let work_dir = work_dir_for(destination, target);
    stage::stage(client, &selected, &work_dir)
        .with_context(|| format!("staging conversion package for '{}'", target.name))?;

    convert::convert(runner, &work_dir)
        .with_context(|| format!("converting build {} for '{}'", selected.build, target.name))?;
    let iso_path = convert::resolve_iso(&work_dir)
        .with_context(|| format!("resolving produced disc image for '{}'", target.name))?;

    finalize::finalize(inspector, &iso_path, &selected, destination)
        .with_context(|| format!("finalizing artifact for '{}'", target.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_dir_is_unique_per_target() {
        let dest = Path::new("/out");
        let a = work_dir_for(dest, &crate::target::TARGETS[0]);
        let b = work_dir_for(dest, &crate::target::TARGETS[1]);
        assert_ne!(a, b);
        assert!(a.starts_with("/out/.work"));
    }
}
