//! One logical retrieval: a builder over a [`FetchSession`] describing the
//! request, its sink, and its skip policy.
//!
//! Sinks come in four shapes: a deserialized object, a list of objects, a
//! file at an exact destination, and a file dropped into a directory under a
//! server-determined name. File sinks can short-circuit without network I/O
//! when the destination already exists or is already current.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::cache::ResponseCache;
use crate::http::{disposition, redact, session::FetchSession};
use crate::{PrepError, Result};

const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Progress reported to the status callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Downloading,
    Downloaded,
    SkippedUpToDate,
}

/// Result of a file or directory sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Written(PathBuf),
    SkippedExisting(PathBuf),
    SkippedUpToDate(PathBuf),
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FetchOutcome::Written(p)
            | FetchOutcome::SkippedExisting(p)
            | FetchOutcome::SkippedUpToDate(p) => p,
        }
    }

    pub fn was_skipped(&self) -> bool {
        !matches!(self, FetchOutcome::Written(_))
    }
}

/// Normalized request identity, used as the cache and log key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchIdentity {
    pub method: String,
    pub url: String,
    pub accept: String,
    /// Digest of the request body, when one is sent. Keeps two POSTs to the
    /// same URL with different bodies from sharing a cache entry.
    pub body_digest: Option<String>,
}

impl FetchIdentity {
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for FetchIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} accept={}", self.method, self.url, self.accept)?;
        if let Some(digest) = &self.body_digest {
            write!(f, " body={digest}")?;
        }
        Ok(())
    }
}

type StatusCallback = Box<dyn Fn(FetchStatus) + Send + Sync>;

pub struct Fetch<'a> {
    session: &'a FetchSession,
    url: String,
    headers: Vec<(String, String)>,
    accept: Vec<String>,
    form: Option<Vec<(String, String)>>,
    checkpoint: Option<String>,
    skip_existing: bool,
    skip_up_to_date: bool,
    on_status: Option<StatusCallback>,
    cache: Option<&'a ResponseCache>,
}

impl<'a> Fetch<'a> {
    pub(crate) fn new(session: &'a FetchSession, url: String) -> Self {
        Self {
            session,
            url,
            headers: Vec::new(),
            accept: Vec::new(),
            form: None,
            checkpoint: None,
            skip_existing: false,
            skip_up_to_date: false,
            on_status: None,
            cache: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add an acceptable response content type. Object sinks fail when the
    /// response does not match one of these (a `charset` suffix is ignored).
    pub fn accept(mut self, content_type: impl Into<String>) -> Self {
        self.accept.push(content_type.into());
        self
    }

    /// Send a form-encoded body; switches the request to POST
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }

    /// Human-readable label attached to errors raised by this operation
    pub fn checkpoint(mut self, label: impl Into<String>) -> Self {
        self.checkpoint = Some(label.into());
        self
    }

    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn skip_up_to_date(mut self, skip: bool) -> Self {
        self.skip_up_to_date = skip;
        self
    }

    pub fn on_status(mut self, callback: impl Fn(FetchStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Box::new(callback));
        self
    }

    /// Consult (and refresh) a response cache before touching the network
    pub fn cached(mut self, cache: &'a ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn identity(&self) -> FetchIdentity {
        let body_digest = self.form.as_ref().map(|fields| {
            let mut hasher = Sha256::new();
            for (name, value) in fields {
                hasher.update(name.as_bytes());
                hasher.update(b"=");
                hasher.update(value.as_bytes());
                hasher.update(b"&");
            }
            format!("{:x}", hasher.finalize())
        });
        FetchIdentity {
            method: if self.form.is_some() { "POST" } else { "GET" }.to_string(),
            url: self.url.clone(),
            accept: self.accept.join(", "),
            body_digest,
        }
    }

    // ---- terminal methods ----

    /// Deserialize the response body into `T`
    pub async fn to_object<T: DeserializeOwned>(self) -> Result<T> {
        let checkpoint = self.checkpoint.clone();
        self.fetch_object()
            .await
            .map_err(|e| e.with_checkpoint(checkpoint.as_deref()))
    }

    /// Like [`Fetch::to_object`], but a 404 is "absent", not an error
    pub async fn to_object_optional<T: DeserializeOwned>(self) -> Result<Option<T>> {
        match self.to_object().await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deserialize the response body into a list of `T`
    pub async fn to_object_list<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.to_object().await
    }

    /// Write the response body to an exact destination path
    pub async fn to_file(self, dest: impl AsRef<Path>) -> Result<FetchOutcome> {
        let checkpoint = self.checkpoint.clone();
        self.fetch_file(dest.as_ref())
            .await
            .map_err(|e| e.with_checkpoint(checkpoint.as_deref()))
    }

    /// Write the response body into a directory under a server-determined
    /// name: `Content-Disposition` first, last URI path segment otherwise
    pub async fn to_dir(self, dir: impl AsRef<Path>) -> Result<FetchOutcome> {
        let checkpoint = self.checkpoint.clone();
        self.fetch_dir(dir.as_ref())
            .await
            .map_err(|e| e.with_checkpoint(checkpoint.as_deref()))
    }

    // ---- internals ----

    async fn fetch_object<T: DeserializeOwned>(mut self) -> Result<T> {
        if self.accept.is_empty() {
            self.accept.push("application/json".to_string());
        }
        let identity = self.identity();

        if let Some(cache) = self.cache {
            if let Some(payload) = cache.read(&identity.cache_key())? {
                return Ok(serde_json::from_slice(&payload)?);
            }
        }

        let response = self.send().await?;
        self.check_content_type(&response)?;
        let payload = response.bytes().await?;

        if let Some(cache) = self.cache {
            if let Err(e) = cache.write(&identity.cache_key(), &self.url, &payload) {
                log::warn!("Failed to cache response for {identity}: {e}");
            }
        }

        Ok(serde_json::from_slice(&payload)?)
    }

    async fn fetch_file(self, dest: &Path) -> Result<FetchOutcome> {
        if self.skip_existing && dest.exists() {
            log::debug!("Skipping {}: destination exists", dest.display());
            return Ok(FetchOutcome::SkippedExisting(dest.to_path_buf()));
        }
        if self.skip_up_to_date && dest.exists() && self.probe_up_to_date(dest).await? {
            log::debug!("Skipping {}: already up to date", dest.display());
            self.notify(FetchStatus::SkippedUpToDate);
            return Ok(FetchOutcome::SkippedUpToDate(dest.to_path_buf()));
        }

        let response = self.send().await?;
        self.write_body(response, dest).await?;
        Ok(FetchOutcome::Written(dest.to_path_buf()))
    }

    async fn fetch_dir(self, dir: &Path) -> Result<FetchOutcome> {
        // The server-chosen name is only known after the response arrives,
        // so pre-flight skips work off the URI-derived fallback name.
        let fallback = disposition::filename_from_url(&self.url);

        if let Some(name) = &fallback {
            let dest = dir.join(name);
            if self.skip_existing && dest.exists() {
                log::debug!("Skipping {}: destination exists", dest.display());
                return Ok(FetchOutcome::SkippedExisting(dest));
            }
            if self.skip_up_to_date && dest.exists() && self.probe_up_to_date(&dest).await? {
                log::debug!("Skipping {}: already up to date", dest.display());
                self.notify(FetchStatus::SkippedUpToDate);
                return Ok(FetchOutcome::SkippedUpToDate(dest));
            }
        }

        let response = self.send().await?;
        let name = disposition::filename_from_headers(response.headers())
            .or(fallback)
            .ok_or_else(|| {
                PrepError::InvalidParameter(format!(
                    "cannot derive a filename for {}",
                    redact::obfuscate_credentials(&self.url)
                ))
            })?;

        let dest = dir.join(name);
        if self.skip_existing && dest.exists() {
            return Ok(FetchOutcome::SkippedExisting(dest));
        }

        self.write_body(response, &dest).await?;
        Ok(FetchOutcome::Written(dest))
    }

    async fn send(&self) -> Result<Response> {
        let method = if self.form.is_some() {
            Method::POST
        } else {
            Method::GET
        };
        let mut request = self.session.request(method, &self.url);
        if !self.accept.is_empty() {
            request = request.header(ACCEPT, self.accept.join(", "));
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(fields) = &self.form {
            request = request.form(fields);
        }

        let response = request.send().await?;
        self.check_status(response)
    }

    fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = redact::obfuscate_credentials(&self.url);

        // Rate limits are surfaced as a distinct error so callers can decide
        // whether to wait or abort; they are never retried here.
        if status.as_u16() == 403 || status.as_u16() == 429 {
            if let Some(reset_at) = response
                .headers()
                .get(RATE_LIMIT_RESET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
                .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0))
            {
                return Err(PrepError::RateLimited { url, reset_at });
            }
        }

        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        Err(PrepError::FailedRequest {
            status: status.as_u16(),
            url,
            headers,
        })
    }

    fn check_content_type(&self, response: &Response) -> Result<()> {
        if self.accept.is_empty() {
            return Ok(());
        }
        let actual = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // "application/json; charset=utf-8" matches "application/json"
        let bare = actual.split(';').next().unwrap_or_default().trim();

        if self.accept.iter().any(|a| a.eq_ignore_ascii_case(bare)) {
            return Ok(());
        }
        Err(PrepError::ContentType {
            url: redact::obfuscate_credentials(&self.url),
            actual: actual.to_string(),
            accepted: self.accept.join(", "),
        })
    }

    /// HEAD probe: the destination is current when the remote size matches
    /// and the remote Last-Modified (when present) is not newer than the
    /// local mtime.
    async fn probe_up_to_date(&self, dest: &Path) -> Result<bool> {
        let response = self
            .session
            .request(Method::HEAD, &self.url)
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(false);
        }

        let metadata = tokio::fs::metadata(dest).await?;
        // A HEAD response has no body, so content_length() would report the
        // empty body; the header carries the real size.
        let Some(remote_len) = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
        else {
            return Ok(false);
        };
        if remote_len != metadata.len() {
            return Ok(false);
        }

        let remote_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok());
        match (remote_modified, metadata.modified()) {
            (Some(remote), Ok(local)) => {
                Ok(remote.with_timezone(&Utc) <= DateTime::<Utc>::from(local))
            }
            // Size match alone decides when either side lacks a timestamp
            _ => Ok(true),
        }
    }

    async fn write_body(&self, response: Response, dest: &Path) -> Result<()> {
        self.notify(FetchStatus::Downloading);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        self.notify(FetchStatus::Downloaded);
        log::debug!("Downloaded {}", dest.display());
        Ok(())
    }

    fn notify(&self, status: FetchStatus) {
        if let Some(callback) = &self.on_status {
            callback(status);
        }
    }
}

/// Fan out independent downloads into one directory on a bounded worker pool.
///
/// Completion order is not guaranteed; `on_complete` fires per finished file
/// and the returned outcomes are in completion order.
pub async fn fetch_all_to_dir<F>(
    session: &FetchSession,
    urls: &[String],
    dir: &Path,
    limit: usize,
    skip_existing: bool,
    skip_up_to_date: bool,
    mut on_complete: F,
) -> Result<Vec<FetchOutcome>>
where
    F: FnMut(&FetchOutcome),
{
    let mut downloads = futures_util::stream::iter(urls.iter().map(|url| {
        session
            .fetch(url.as_str())
            .skip_existing(skip_existing)
            .skip_up_to_date(skip_up_to_date)
            .to_dir(dir)
    }))
    .buffer_unordered(limit.max(1));

    let mut outcomes = Vec::with_capacity(urls.len());
    while let Some(result) = downloads.next().await {
        let outcome = result?;
        on_complete(&outcome);
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
