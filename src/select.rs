//! Build selection.
//!
//! Narrows the catalog's candidate list down to exactly one build for a
//! target, as an ordered filter pipeline. Order matters: cheap title checks
//! run before the per-candidate catalog calls, and each rejection logs why.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;

use crate::catalog::{
    BuildSummary, CatalogClient, CatalogTransport, API_BASE, DOWNLOAD_BASE, LANGUAGE,
};
use crate::error::PipelineError;
use crate::target::TargetSpec;

/// Release channel a build must be on to ship to a production destination.
pub const RETAIL_RING: &str = "RETAIL";

/// The single chosen candidate, enriched with derived URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedBuild {
    pub name: String,
    pub title: String,
    pub build: String,
    pub id: String,
    pub edition: String,
    pub virtual_edition: Option<String>,
    pub api_url: String,
    pub download_url: String,
    pub download_package_url: String,
}

/// Whether a candidate title marks a preview build.
pub fn is_preview(title: &str) -> bool {
    title.to_ascii_lowercase().contains("preview")
}

/// Whether the target's own search query explicitly asks for previews.
pub fn wants_preview(search_query: &str) -> bool {
    search_query.to_ascii_lowercase().contains("preview")
}

/// Final per-candidate filter: retail ring, en-us available, required
/// edition offered.
pub fn passes_final_filter(
    ring: &str,
    languages: &BTreeMap<String, String>,
    editions: &BTreeMap<String, String>,
    required_edition: &str,
) -> bool {
    ring == RETAIL_RING && languages.contains_key(LANGUAGE) && editions.contains_key(required_edition)
}

/// Sanity check that the catalog's build-numbering convention still holds.
pub fn validate_build_version(build: &str) -> Result<()> {
    let pattern = Regex::new(r"^\d+\.\d+$").context("compiling build version pattern")?;
    if pattern.is_match(build) {
        Ok(())
    } else {
        Err(PipelineError::UnexpectedBuildFormat {
            build: build.to_string(),
        }
        .into())
    }
}

/// Pick exactly one build for `target`, in the catalog's original ordering.
pub fn select_build<T: CatalogTransport>(
    client: &CatalogClient<T>,
    target: &TargetSpec,
) -> Result<SelectedBuild> {
    println!("[select] searching catalog for '{}'", target.search_query);
    let candidates = client
        .list_builds(target.search_query)
        .with_context(|| format!("listing builds for '{}'", target.search_query))?;
    println!("[select] {} candidate(s) returned", candidates.len());

    let allow_previews = wants_preview(target.search_query);
    for candidate in candidates {
        if !allow_previews && is_preview(&candidate.title) {
            println!("[select] '{}': preview build, skipped", candidate.title);
            continue;
        }

        let langs = client
            .list_languages(&candidate.uuid)
            .with_context(|| format!("listing languages for build {}", candidate.uuid))?;
        if langs.update_info.build != candidate.build {
            return Err(PipelineError::InconsistentCatalogResponse {
                id: candidate.uuid,
                expected: candidate.build,
                reported: langs.update_info.build,
            }
            .into());
        }

        // A candidate without en-us cannot pass the final filter; leave its
        // edition set empty instead of spending another catalog call on it.
        let editions = if langs.languages.contains_key(LANGUAGE) {
            client
                .list_editions(&candidate.uuid, LANGUAGE)
                .with_context(|| format!("listing editions for build {}", candidate.uuid))?
                .editions
        } else {
            BTreeMap::new()
        };

        let ring = &langs.update_info.ring;
        if !passes_final_filter(ring, &langs.languages, &editions, target.edition) {
            println!(
                "[select] '{}': rejected (ring={}, en-us={}, {}={})",
                candidate.title,
                ring,
                langs.languages.contains_key(LANGUAGE),
                target.edition,
                editions.contains_key(target.edition),
            );
            continue;
        }

        validate_build_version(&candidate.build)?;
        println!(
            "[select] chose '{}' (build {}, id {})",
            candidate.title, candidate.build, candidate.uuid
        );
        return Ok(derive_selected(target, candidate));
    }

    Err(PipelineError::NoMatchingBuild {
        search: target.search_query.to_string(),
        edition: target.edition.to_string(),
    }
    .into())
}

fn derive_selected(target: &TargetSpec, candidate: BuildSummary) -> SelectedBuild {
    let id = &candidate.uuid;
    let edition = target.edition;
    SelectedBuild {
        name: target.name.to_string(),
        title: candidate.title.clone(),
        build: candidate.build.clone(),
        id: id.clone(),
        edition: edition.to_string(),
        virtual_edition: target.virtual_edition.map(str::to_string),
        api_url: format!("{API_BASE}/get.php?id={id}&lang={LANGUAGE}&edition={edition}"),
        download_url: format!("{DOWNLOAD_BASE}/download.php?id={id}&pack={LANGUAGE}&edition={edition}"),
        download_package_url: format!("{DOWNLOAD_BASE}/get.php?id={id}&pack={LANGUAGE}&edition={edition}"),
    }
}
