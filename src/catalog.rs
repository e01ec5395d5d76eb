//! Catalog client for the UUP dump API.
//!
//! All read-only catalog calls go through [`CatalogClient`], which wraps a
//! [`CatalogTransport`] with the retry policy: up to [`MAX_ATTEMPTS`] tries
//! with a fixed delay before each retry. Transport failures, non-success
//! responses and unparseable bodies all count as failed attempts; the first
//! successfully parsed response is returned immediately.
//!
//! The package download (HTTP POST, large binary body) also lives on the
//! client but is deliberately NOT retried.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::PipelineError;

/// Base URL of the read-only catalog API.
pub const API_BASE: &str = "https://api.uupdump.net";

/// Base URL of the interactive site, which also serves the package endpoint.
pub const DOWNLOAD_BASE: &str = "https://uupdump.net";

/// The one language this builder ever requests.
pub const LANGUAGE: &str = "en-us";

/// Total attempts per catalog call (1 initial + 14 retries).
pub const MAX_ATTEMPTS: u32 = 15;

/// Fixed delay inserted before each retry. No backoff.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Autodownload request body for the package endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub autodl: u32,
    pub updates: u32,
    pub cleanup: u32,
    pub virtual_editions: Vec<String>,
}

impl PackageRequest {
    /// Standard request: download updates, clean up superseded files.
    pub fn standard() -> Self {
        Self {
            autodl: 2,
            updates: 1,
            cleanup: 1,
            virtual_editions: Vec::new(),
        }
    }

    /// Request including a post-install virtual edition conversion.
    pub fn with_virtual_edition(edition: &str) -> Self {
        Self {
            autodl: 3,
            updates: 1,
            cleanup: 1,
            virtual_editions: vec![edition.to_string()],
        }
    }

    /// Render as form-encoded key/value pairs.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("autodl".to_string(), self.autodl.to_string()),
            ("updates".to_string(), self.updates.to_string()),
            ("cleanup".to_string(), self.cleanup.to_string()),
        ];
        for edition in &self.virtual_editions {
            pairs.push(("virtualEditions[]".to_string(), edition.clone()));
        }
        pairs
    }
}

/// Narrow seam over the catalog's wire protocol so tests can substitute a
/// fake without any network dependency.
pub trait CatalogTransport {
    /// Issue a GET against `endpoint` with the given query string and return
    /// the response body. Must fail on non-success HTTP status.
    fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<String>;

    /// POST the autodownload request to the package endpoint and return the
    /// raw archive bytes.
    fn download_package(
        &self,
        id: &str,
        edition: &str,
        request: &PackageRequest,
    ) -> Result<Vec<u8>>;
}

/// Production transport over `reqwest::blocking`.
pub struct HttpTransport {
    api_base: String,
    download_base: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_bases(API_BASE, DOWNLOAD_BASE)
    }

    /// Point the transport at alternative hosts (mirrors, local fixtures).
    pub fn with_bases(api_base: &str, download_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            download_base: download_base.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogTransport for HttpTransport {
    fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}/{}", self.api_base, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .with_context(|| format!("requesting '{url}'"))?
            .error_for_status()
            .with_context(|| format!("catalog returned failure status for '{url}'"))?;
        response
            .text()
            .with_context(|| format!("reading catalog response body from '{url}'"))
    }

    fn download_package(
        &self,
        id: &str,
        edition: &str,
        request: &PackageRequest,
    ) -> Result<Vec<u8>> {
        let url = format!("{}/get.php", self.download_base);
        let response = self
            .client
            .post(&url)
            .query(&[("id", id), ("pack", LANGUAGE), ("edition", edition)])
            .form(&request.form_pairs())
            .send()
            .with_context(|| format!("posting package request to '{url}'"))?
            .error_for_status()
            .with_context(|| format!("package endpoint returned failure status for '{url}'"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("reading package body from '{url}'"))?;
        Ok(bytes.to_vec())
    }
}

/// All catalog responses arrive wrapped in a `response` object.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

/// One build summary from `listid.php`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSummary {
    pub uuid: String,
    pub title: String,
    pub build: String,
}

#[derive(Debug, Deserialize)]
struct BuildList {
    #[serde(default)]
    builds: Vec<BuildSummary>,
}

/// Build-level facts reported by `listlangs.php`.
#[derive(Debug, Deserialize)]
pub struct UpdateInfo {
    pub build: String,
    pub ring: String,
}

/// Per-build language catalog.
#[derive(Debug, Deserialize)]
pub struct LanguageCatalog {
    #[serde(rename = "updateInfo")]
    pub update_info: UpdateInfo,
    #[serde(rename = "langFancyNames", default)]
    pub languages: BTreeMap<String, String>,
}

/// Per-build, per-language edition catalog.
#[derive(Debug, Deserialize)]
pub struct EditionCatalog {
    #[serde(rename = "editionFancyNames", default)]
    pub editions: BTreeMap<String, String>,
}

/// Retrying client over a [`CatalogTransport`].
pub struct CatalogClient<T> {
    transport: T,
    retry_delay: Duration,
}

impl<T: CatalogTransport> CatalogClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Override the inter-attempt delay. Tests use a zero delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Access the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// List builds matching a search query, in catalog order.
    pub fn list_builds(&self, search: &str) -> Result<Vec<BuildSummary>> {
        let envelope: Envelope<BuildList> = self.get_json("listid.php", &[("search", search)])?;
        Ok(envelope.response.builds)
    }

    /// Fetch the language catalog (and build-level facts) for one build.
    pub fn list_languages(&self, id: &str) -> Result<LanguageCatalog> {
        let envelope: Envelope<LanguageCatalog> = self.get_json("listlangs.php", &[("id", id)])?;
        Ok(envelope.response)
    }

    /// Fetch the edition catalog for one build and language.
    pub fn list_editions(&self, id: &str, lang: &str) -> Result<EditionCatalog> {
        let envelope: Envelope<EditionCatalog> =
            self.get_json("listeditions.php", &[("id", id), ("lang", lang)])?;
        Ok(envelope.response)
    }

    /// Download the conversion package archive. Not retried: package bodies
    /// are large and a failed transfer is surfaced immediately.
    pub fn download_package(
        &self,
        id: &str,
        edition: &str,
        request: &PackageRequest,
    ) -> Result<Vec<u8>> {
        self.transport.download_package(id, edition, request)
    }

    fn get_json<R: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<R> {
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                println!(
                    "[catalog] '{endpoint}' failed, retrying (attempt {attempt}/{MAX_ATTEMPTS})"
                );
                std::thread::sleep(self.retry_delay);
            }
            let parsed = self.transport.get(endpoint, query).and_then(|body| {
                serde_json::from_str::<R>(&body)
                    .with_context(|| format!("parsing catalog response from '{endpoint}'"))
            });
            match parsed {
                Ok(value) => return Ok(value),
                Err(err) => last_err = Some(err),
            }
        }
        // last_err is always set: MAX_ATTEMPTS >= 1.
        let last = last_err.unwrap_or_else(|| anyhow::anyhow!("catalog call never attempted"));
        Err(last.context(PipelineError::CatalogUnavailable {
            endpoint: endpoint.to_string(),
            attempts: MAX_ATTEMPTS,
        }))
    }
}
