//! Package staging.
//!
//! Downloads the selected build's conversion package, extracts it into a
//! freshly reset working directory and patches the conversion config for
//! unattended operation.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use crate::catalog::{CatalogClient, CatalogTransport, PackageRequest};
use crate::error::PipelineError;
use crate::select::SelectedBuild;

/// Configuration file shipped inside the conversion package.
pub const CONVERT_CONFIG: &str = "ConvertConfig.ini";

/// Remove any pre-existing working directory and recreate it empty, so
/// re-runs never see stale state.
pub fn reset_work_dir(work_dir: &Path) -> Result<()> {
    if work_dir.exists() {
        fs::remove_dir_all(work_dir).with_context(|| {
            format!(
                "removing existing working directory '{}'",
                work_dir.display()
            )
        })?;
    }
    fs::create_dir_all(work_dir)
        .with_context(|| format!("creating working directory '{}'", work_dir.display()))?;
    Ok(())
}

/// Download, extract and patch the conversion package for `selected`.
pub fn stage<T: CatalogTransport>(
    client: &CatalogClient<T>,
    selected: &SelectedBuild,
    work_dir: &Path,
) -> Result<()> {
    reset_work_dir(work_dir)?;

    let request = match selected.virtual_edition.as_deref() {
        Some(edition) => PackageRequest::with_virtual_edition(edition),
        None => PackageRequest::standard(),
    };
    println!(
        "[stage] downloading conversion package for build {} ({})",
        selected.build, selected.id
    );
    let bytes = client
        .download_package(&selected.id, &selected.edition, &request)
        .map_err(|err| {
            anyhow::Error::from(PipelineError::PackageFetchFailed {
                reason: format!("{err:#}"),
            })
        })?;
    println!("[stage] package downloaded ({} bytes)", bytes.len());

    extract_package(&bytes, work_dir)?;
    patch_convert_config(work_dir, selected.virtual_edition.as_deref())?;
    Ok(())
}

/// Extract the package archive into the working directory.
pub fn extract_package(bytes: &[u8], work_dir: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|err| {
        anyhow::Error::from(PipelineError::PackageFetchFailed {
            reason: format!("package is not a readable zip archive: {err}"),
        })
    })?;
    archive.extract(work_dir).map_err(|err| {
        anyhow::Error::from(PipelineError::PackageFetchFailed {
            reason: format!("extracting package into '{}': {err}", work_dir.display()),
        })
    })?;
    println!(
        "[stage] extracted {} entries into '{}'",
        archive.len(),
        work_dir.display()
    );
    Ok(())
}

/// Rewrite the conversion config for unattended operation.
///
/// Each patch is a per-line substitution on an exact, case-sensitive key;
/// every other line (and the file's CRLF/LF convention) is preserved
/// verbatim. Applying the patch twice yields the same file as applying it
/// once.
pub fn patch_convert_config(work_dir: &Path, virtual_edition: Option<&str>) -> Result<()> {
    let path = work_dir.join(CONVERT_CONFIG);
    let raw = fs::read(&path).map_err(|err| {
        anyhow::Error::from(PipelineError::ConfigPatchFailed {
            reason: format!("reading '{}': {err}", path.display()),
        })
    })?;
    if !raw.is_ascii() {
        return Err(PipelineError::ConfigPatchFailed {
            reason: format!("'{}' is not strict ASCII", path.display()),
        }
        .into());
    }
    let text = String::from_utf8(raw).map_err(|err| {
        anyhow::Error::from(PipelineError::ConfigPatchFailed {
            reason: format!("decoding '{}': {err}", path.display()),
        })
    })?;

    let mut patches: Vec<(&str, String)> = vec![
        ("AutoExit", "1".to_string()),
        ("ResetBase", "1".to_string()),
        ("SkipWinRE", "1".to_string()),
    ];
    if let Some(edition) = virtual_edition {
        patches.push(("StartVirtual", "1".to_string()));
        patches.push(("vDeleteSource", "1".to_string()));
        patches.push(("vAutoEditions", edition.to_string()));
    }

    let patched = apply_patches(&text, &patches)?;
    fs::write(&path, patched.as_bytes()).map_err(|err| {
        anyhow::Error::from(PipelineError::ConfigPatchFailed {
            reason: format!("writing '{}': {err}", path.display()),
        })
    })?;
    println!("[stage] patched {} for unattended conversion", CONVERT_CONFIG);
    Ok(())
}

fn apply_patches(text: &str, patches: &[(&str, String)]) -> Result<String> {
    let mut out = text.to_string();
    for (key, value) in patches {
        // [^\r\n]* instead of .* so a trailing \r survives the substitution.
        let pattern = Regex::new(&format!(r"(?m)^{}\s*=[^\r\n]*", regex::escape(key)))
            .with_context(|| format!("compiling patch pattern for key '{key}'"))?;
        out = pattern
            .replace_all(&out, format!("{key}={value}"))
            .into_owned();
    }
    Ok(out)
}
