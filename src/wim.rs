//! Embedded Windows image enumeration.
//!
//! A produced disc image carries an installation image container at
//! `sources/install.wim` whose internal index enumerates the embedded OS
//! editions. Enumeration mounts the ISO read-only, runs `wiminfo` (wimlib)
//! against the container and parses the per-image blocks. The mount is a
//! scoped resource: the guard unmounts on every exit path, including
//! failures during enumeration.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use serde::Serialize;

/// Fixed internal path of the installation image container.
pub const INSTALL_WIM: &str = "sources/install.wim";

/// One OS image embedded in the disc image. `index` is 1-based and matches
/// the image's position inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowsImageDescriptor {
    pub index: u32,
    pub name: String,
    pub version: String,
}

/// Seam over image enumeration so tests can avoid mounting anything.
pub trait ImageInspector {
    /// Enumerate the embedded OS images in container-index order.
    fn enumerate(&self, iso_path: &Path) -> Result<Vec<WindowsImageDescriptor>>;
}

/// Production inspector: loopback-mounts the ISO and reads the container.
pub struct MountedIsoInspector;

impl ImageInspector for MountedIsoInspector {
    fn enumerate(&self, iso_path: &Path) -> Result<Vec<WindowsImageDescriptor>> {
        let mount = IsoMount::mount(iso_path)?;
        let images = inspect_wim(&mount.path().join(INSTALL_WIM));
        match images {
            Ok(images) => {
                mount.unmount()?;
                Ok(images)
            }
            // The guard's Drop still unmounts; the enumeration error wins.
            Err(err) => Err(err),
        }
    }
}

/// Scoped read-only loopback mount of a disc image.
pub struct IsoMount {
    mount_point: PathBuf,
    mounted: bool,
}

impl IsoMount {
    pub fn mount(iso_path: &Path) -> Result<Self> {
        let mount_point =
            std::env::temp_dir().join(format!("uup-builder-mnt-{}", std::process::id()));
        fs::create_dir_all(&mount_point)
            .with_context(|| format!("creating mount point '{}'", mount_point.display()))?;

        let output = Command::new("mount")
            .arg("-o")
            .arg("loop,ro")
            .arg(iso_path)
            .arg(&mount_point)
            .output()
            .with_context(|| format!("running mount for '{}'", iso_path.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "mounting '{}' at '{}' failed: {}",
                iso_path.display(),
                mount_point.display(),
                stderr.trim()
            );
        }
        Ok(Self {
            mount_point,
            mounted: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.mount_point
    }

    /// Unmount explicitly, surfacing any failure.
    pub fn unmount(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        self.mounted = false;
        let output = Command::new("umount")
            .arg(&self.mount_point)
            .output()
            .with_context(|| format!("running umount for '{}'", self.mount_point.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "unmounting '{}' failed: {}",
                self.mount_point.display(),
                stderr.trim()
            );
        }
        let _ = fs::remove_dir(&self.mount_point);
        Ok(())
    }
}

impl Drop for IsoMount {
    fn drop(&mut self) {
        // Error path: best-effort unmount so no mounted volume leaks.
        let _ = self.release();
    }
}

/// Run `wiminfo` on the container and parse its image listing.
pub fn inspect_wim(wim_path: &Path) -> Result<Vec<WindowsImageDescriptor>> {
    let output = Command::new("wiminfo")
        .arg(wim_path)
        .output()
        .with_context(|| format!("running wiminfo for '{}'", wim_path.display()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "wiminfo failed for '{}': {}",
            wim_path.display(),
            stderr.trim()
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_wiminfo(&stdout)
}

/// Parse `wiminfo` output into ordered image descriptors.
///
/// Each image block starts at an `Index:` line; the version string is
/// assembled as `major.minor.build.servicePackBuild`, matching the version
/// convention of the installation images themselves.
pub fn parse_wiminfo(output: &str) -> Result<Vec<WindowsImageDescriptor>> {
    struct Block {
        index: u32,
        name: String,
        major: u32,
        minor: u32,
        build: u32,
        sp_build: u32,
    }

    fn finish(block: Block, images: &mut Vec<WindowsImageDescriptor>) {
        images.push(WindowsImageDescriptor {
            index: block.index,
            name: block.name,
            version: format!(
                "{}.{}.{}.{}",
                block.major, block.minor, block.build, block.sp_build
            ),
        });
    }

    let mut images = Vec::new();
    let mut current: Option<Block> = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key == "Index" {
            if let Some(block) = current.take() {
                finish(block, &mut images);
            }
            let index = value
                .parse::<u32>()
                .with_context(|| format!("parsing image index '{value}'"))?;
            current = Some(Block {
                index,
                name: String::new(),
                major: 0,
                minor: 0,
                build: 0,
                sp_build: 0,
            });
            continue;
        }
        let Some(block) = current.as_mut() else {
            // Header fields before the first image block.
            continue;
        };
        match key {
            "Name" => block.name = value.to_string(),
            "Major Version" => block.major = value.parse().unwrap_or(0),
            "Minor Version" => block.minor = value.parse().unwrap_or(0),
            "Build" => block.build = value.parse().unwrap_or(0),
            "Service Pack Build" => block.sp_build = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    if let Some(block) = current.take() {
        finish(block, &mut images);
    }

    if images.is_empty() {
        bail!("no images found in installation image container listing");
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIMINFO_OUTPUT: &str = "\
WIM Information:
----------------
Path:           sources/install.wim
GUID:           0x1122334455667788
Image Count:    2
Compression:    LZX
Boot Index:     0

Available Images:
-----------------
Index:                  1
Name:                   Windows 11 Pro
Description:            Windows 11 Pro
Display Name:           Windows 11 Pro
Directory Count:        12345
File Count:             67890
Major Version:          10
Minor Version:          0
Build:                  22631
Service Pack Build:     4317
Service Pack Level:     0

Index:                  2
Name:                   Windows 11 Enterprise
Description:            Windows 11 Enterprise
Display Name:           Windows 11 Enterprise
Directory Count:        12345
File Count:             67890
Major Version:          10
Minor Version:          0
Build:                  22631
Service Pack Build:     4317
Service Pack Level:     0
";

    #[test]
    fn test_parse_wiminfo_ordered_images() {
        let images = parse_wiminfo(WIMINFO_OUTPUT).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].index, 1);
        assert_eq!(images[0].name, "Windows 11 Pro");
        assert_eq!(images[0].version, "10.0.22631.4317");
        assert_eq!(images[1].index, 2);
        assert_eq!(images[1].name, "Windows 11 Enterprise");
    }

    #[test]
    fn test_parse_wiminfo_ignores_header_fields() {
        // "Image Count" and friends live above the first Index block and
        // must not bleed into a descriptor.
        let images = parse_wiminfo(WIMINFO_OUTPUT).unwrap();
        assert!(images.iter().all(|img| !img.name.is_empty()));
    }

    #[test]
    fn test_parse_wiminfo_empty_listing_fails() {
        let err = parse_wiminfo("WIM Information:\nPath: x.wim\n").unwrap_err();
        assert!(err.to_string().contains("no images"));
    }

    #[test]
    fn test_descriptor_serializes_expected_fields() {
        let descriptor = WindowsImageDescriptor {
            index: 1,
            name: "Windows 11 Pro".to_string(),
            version: "10.0.22631.4317".to_string(),
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        assert_eq!(
            json,
            r#"{"index":1,"name":"Windows 11 Pro","version":"10.0.22631.4317"}"#
        );
    }
}
