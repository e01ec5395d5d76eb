//! Static target table.
//!
//! One entry per supported platform, mapping the target name to the catalog
//! search criteria. The table is immutable for the process lifetime; the
//! pipeline entry point receives a `TargetSpec` reference rather than poking
//! at global state.

use anyhow::{bail, Result};

/// Search criteria for one buildable platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    /// Target name; also the stem of every artifact file (`<name>.iso`).
    pub name: &'static str,
    /// Catalog search query selecting the build line.
    pub search_query: &'static str,
    /// Edition that must be offered by the chosen build.
    pub edition: &'static str,
    /// Post-install edition conversion applied by the conversion utility.
    pub virtual_edition: Option<&'static str>,
}

/// All supported targets, in build order for `build-all`.
pub const TARGETS: &[TargetSpec] = &[
    TargetSpec {
        name: "windows-10",
        search_query: "windows 10 19045 amd64",
        edition: "Professional",
        virtual_edition: Some("Enterprise"),
    },
    TargetSpec {
        name: "windows-11",
        search_query: "windows 11 22631 amd64",
        edition: "Professional",
        virtual_edition: Some("Enterprise"),
    },
];

/// Look up a target by name.
pub fn find_target(name: &str) -> Result<&'static TargetSpec> {
    match TARGETS.iter().find(|t| t.name == name) {
        Some(target) => Ok(target),
        None => {
            let known = TARGETS
                .iter()
                .map(|t| t.name)
                .collect::<Vec<_>>()
                .join(", ");
            bail!("unknown target '{name}'; supported targets: {known}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_target_known() {
        let target = find_target("windows-11").unwrap();
        assert_eq!(target.edition, "Professional");
        assert_eq!(target.virtual_edition, Some("Enterprise"));
    }

    #[test]
    fn test_find_target_unknown() {
        let err = find_target("windows-9").unwrap_err();
        assert!(err.to_string().contains("windows-10"));
    }

    #[test]
    fn test_target_names_are_unique() {
        for (i, a) in TARGETS.iter().enumerate() {
            for b in &TARGETS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
