//! Artifact finalization.
//!
//! Turns the raw converter output into a trustworthy artifact set:
//! `<name>.iso` plus a sha256 sidecar and a metadata sidecar describing the
//! build, its checksum, the embedded OS images and the catalog references
//! it was derived from.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::select::SelectedBuild;
use crate::wim::{ImageInspector, WindowsImageDescriptor};

/// Catalog references recorded in the metadata sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRefs {
    pub id: String,
    #[serde(rename = "apiUrl")]
    pub api_url: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    #[serde(rename = "downloadPackageUrl")]
    pub download_package_url: String,
}

impl CatalogRefs {
    pub fn from_selected(selected: &SelectedBuild) -> Self {
        Self {
            id: selected.id.clone(),
            api_url: selected.api_url.clone(),
            download_url: selected.download_url.clone(),
            download_package_url: selected.download_package_url.clone(),
        }
    }
}

/// The completed artifact set. Immutable once written.
#[derive(Debug)]
pub struct BuildArtifact {
    pub iso_path: PathBuf,
    pub checksum_sha256: String,
    pub images: Vec<WindowsImageDescriptor>,
    pub refs: CatalogRefs,
}

#[derive(Serialize)]
struct Metadata<'a> {
    name: &'a str,
    title: &'a str,
    build: &'a str,
    checksum: &'a str,
    images: &'a [WindowsImageDescriptor],
    #[serde(rename = "uupDump")]
    uup_dump: &'a CatalogRefs,
}

/// SHA-256 over a file's bytes, rendered as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("opening '{}' for hashing", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("reading '{}' for hashing", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Render the metadata sidecar.
///
/// Downstream consumers read the URLs verbatim, so any `&` escape the
/// serializer may emit is rewritten back to a literal `&` before the write.
pub fn render_metadata(
    selected: &SelectedBuild,
    checksum: &str,
    images: &[WindowsImageDescriptor],
    refs: &CatalogRefs,
) -> Result<String> {
    let metadata = Metadata {
        name: &selected.name,
        title: &selected.title,
        build: &selected.build,
        checksum,
        images,
        uup_dump: refs,
    };
    let rendered =
        serde_json::to_string_pretty(&metadata).context("serializing artifact metadata")?;
    Ok(rendered.replace("\\u0026", "&"))
}

/// Verify, describe and relocate the produced disc image.
pub fn finalize<I: ImageInspector>(
    inspector: &I,
    iso_path: &Path,
    selected: &SelectedBuild,
    destination: &Path,
) -> Result<BuildArtifact> {
    fs::create_dir_all(destination).with_context(|| {
        format!(
            "creating destination directory '{}'",
            destination.display()
        )
    })?;

    println!("[finalize] hashing '{}'", iso_path.display());
    let checksum = sha256_file(iso_path)?;
    println!("[finalize] sha256 {checksum}");

    let images = inspector
        .enumerate(iso_path)
        .with_context(|| format!("enumerating OS images in '{}'", iso_path.display()))?;
    for image in &images {
        println!(
            "[finalize] image {}: {} ({})",
            image.index, image.name, image.version
        );
    }

    let refs = CatalogRefs::from_selected(selected);
    let final_iso = destination.join(format!("{}.iso", selected.name));
    let metadata_path = destination.join(format!("{}.iso.json", selected.name));
    let checksum_path = destination.join(format!("{}.iso.sha256.txt", selected.name));

    let metadata = render_metadata(selected, &checksum, &images, &refs)?;
    fs::write(&metadata_path, metadata)
        .with_context(|| format!("writing metadata sidecar '{}'", metadata_path.display()))?;
    // Lowercase hex, no trailing newline.
    fs::write(&checksum_path, checksum.as_bytes())
        .with_context(|| format!("writing checksum sidecar '{}'", checksum_path.display()))?;
    move_file(iso_path, &final_iso)?;
    println!("[finalize] artifact ready at '{}'", final_iso.display());

    Ok(BuildArtifact {
        iso_path: final_iso,
        checksum_sha256: checksum,
        images,
        refs,
    })
}

/// Move a file, overwriting the destination; falls back to copy+remove when
/// rename crosses a filesystem boundary.
fn move_file(source: &Path, target: &Path) -> Result<()> {
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    fs::copy(source, target).with_context(|| {
        format!(
            "copying '{}' to '{}'",
            source.display(),
            target.display()
        )
    })?;
    fs::remove_file(source)
        .with_context(|| format!("removing moved source '{}'", source.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedInspector(Vec<WindowsImageDescriptor>);

    impl ImageInspector for FixedInspector {
        fn enumerate(&self, _iso_path: &Path) -> Result<Vec<WindowsImageDescriptor>> {
            Ok(self.0.clone())
        }
    }

    fn selected() -> SelectedBuild {
        SelectedBuild {
            name: "windows-11".to_string(),
            title: "Windows 11 22631.4317".to_string(),
            build: "22631.4317".to_string(),
            id: "abc-123".to_string(),
            edition: "Professional".to_string(),
            virtual_edition: Some("Enterprise".to_string()),
            api_url: "https://api.uupdump.net/get.php?id=abc-123&lang=en-us&edition=Professional"
                .to_string(),
            download_url:
                "https://uupdump.net/download.php?id=abc-123&pack=en-us&edition=Professional"
                    .to_string(),
            download_package_url:
                "https://uupdump.net/get.php?id=abc-123&pack=en-us&edition=Professional"
                    .to_string(),
        }
    }

    fn pro_image() -> WindowsImageDescriptor {
        WindowsImageDescriptor {
            index: 1,
            name: "Windows 11 Pro".to_string(),
            version: "10.0.22631.4317".to_string(),
        }
    }

    #[test]
    fn test_sha256_known_vector() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("input");
        fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_metadata_keeps_literal_ampersands() {
        let rendered = render_metadata(
            &selected(),
            "deadbeef",
            &[pro_image()],
            &CatalogRefs::from_selected(&selected()),
        )
        .unwrap();
        assert!(rendered.contains("id=abc-123&lang=en-us&edition=Professional"));
        assert!(!rendered.contains("\\u0026"));
        // Quirk guard: even a pre-escaped ampersand comes out literal.
        assert_eq!("a\\u0026b".replace("\\u0026", "&"), "a&b");
    }

    #[test]
    fn test_finalize_writes_complete_artifact_set() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&work).unwrap();
        let raw_iso = work.join("22631.4317.iso");
        fs::write(&raw_iso, b"fake windows image").unwrap();

        let inspector = FixedInspector(vec![pro_image()]);
        let artifact = finalize(&inspector, &raw_iso, &selected(), &dest).unwrap();

        assert_eq!(artifact.iso_path, dest.join("windows-11.iso"));
        assert!(artifact.iso_path.is_file());
        assert!(!raw_iso.exists());

        // Checksum sidecar matches an independent recomputation, byte for byte.
        let sidecar = fs::read_to_string(dest.join("windows-11.iso.sha256.txt")).unwrap();
        assert_eq!(sidecar, sha256_file(&artifact.iso_path).unwrap());
        assert!(!sidecar.ends_with('\n'));

        let metadata: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dest.join("windows-11.iso.json")).unwrap())
                .unwrap();
        assert_eq!(metadata["name"], "windows-11");
        assert_eq!(metadata["build"], "22631.4317");
        assert_eq!(metadata["checksum"], sidecar);
        assert_eq!(metadata["images"][0]["index"], 1);
        assert_eq!(metadata["uupDump"]["id"], "abc-123");
    }

    #[test]
    fn test_finalize_overwrites_existing_artifact() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&work).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("windows-11.iso"), b"stale image").unwrap();
        let raw_iso = work.join("fresh.iso");
        fs::write(&raw_iso, b"fresh image").unwrap();

        let inspector = FixedInspector(vec![pro_image()]);
        finalize(&inspector, &raw_iso, &selected(), &dest).unwrap();
        assert_eq!(
            fs::read(dest.join("windows-11.iso")).unwrap(),
            b"fresh image"
        );
    }
}
