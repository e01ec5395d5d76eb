//! Error taxonomy for the build pipeline.
//!
//! Every fatal condition the pipeline can hit has a variant here so callers
//! (and tests) can tell them apart. Errors are carried inside `anyhow::Error`
//! throughout the crate; downcast to `PipelineError` to inspect the category.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// All retries of a catalog call were exhausted.
    #[error("catalog unavailable: '{endpoint}' failed after {attempts} attempts")]
    CatalogUnavailable { endpoint: String, attempts: u32 },

    /// Two catalog calls about the same build disagree with each other.
    #[error("inconsistent catalog response for build {id}: listid reported '{expected}' but listlangs reported '{reported}'")]
    InconsistentCatalogResponse {
        id: String,
        expected: String,
        reported: String,
    },

    /// No candidate survived the selection filters.
    #[error("no retail build matching '{search}' offers en-us '{edition}'")]
    NoMatchingBuild { search: String, edition: String },

    /// The selected build's version string does not look like `<major>.<minor>`.
    #[error("unexpected build version format '{build}' (want <major>.<minor>)")]
    UnexpectedBuildFormat { build: String },

    /// Downloading or extracting the conversion package failed.
    #[error("fetching conversion package failed: {reason}")]
    PackageFetchFailed { reason: String },

    /// The extracted build configuration could not be patched.
    #[error("patching conversion config failed: {reason}")]
    ConfigPatchFailed { reason: String },

    /// The external conversion utility exited non-zero.
    #[error("conversion utility exited with status {exit_code}")]
    ConversionFailed { exit_code: i32 },

    /// The working directory did not contain exactly one disc image afterwards.
    #[error("expected exactly one .iso in working directory, found {count}")]
    IsoResolution { count: usize },
}
