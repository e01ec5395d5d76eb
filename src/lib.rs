//! Automated builder for verified Windows installation ISOs.
//!
//! This crate drives the UUP dump catalog end to end for a named target
//! platform (e.g. `windows-11`):
//!
//! - **Catalog client** - Retryable read-only queries against the catalog API
//! - **Build selector** - Deterministically narrows candidates to one build
//! - **Package stager** - Downloads, extracts and patches the conversion package
//! - **Conversion invoker** - Runs the external UUP-to-ISO converter
//! - **Artifact finalizer** - Checksums, describes and relocates the image
//!
//! # Architecture
//!
//! ```text
//! catalog ──> select ──> stage ──> convert ──> finalize
//!    │                     │          │            │
//!    │ listid/listlangs/   │ zip +    │ bash       │ mount + wiminfo,
//!    │ listeditions (GET,  │ config   │ converter  │ sha256, metadata,
//!    │ retried), package   │ patch    │ (streamed) │ final move
//!    │ (POST, not retried) │          │            │
//! ```
//!
//! Each target is one sequential run; fatal errors abort that target only.
//! The external catalog and converter sit behind the
//! [`catalog::CatalogTransport`] and [`convert::ConversionRunner`] seams so
//! tests run without network or subprocess dependencies.

pub mod catalog;
pub mod convert;
pub mod error;
pub mod finalize;
pub mod pipeline;
pub mod preflight;
pub mod select;
pub mod stage;
pub mod target;
pub mod wim;

pub use catalog::{CatalogClient, CatalogTransport, HttpTransport};
pub use convert::{ConversionRunner, ScriptRunner};
pub use error::PipelineError;
pub use finalize::BuildArtifact;
pub use select::SelectedBuild;
pub use target::{find_target, TargetSpec, TARGETS};
pub use wim::{ImageInspector, MountedIsoInspector, WindowsImageDescriptor};
