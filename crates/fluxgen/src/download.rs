//! Streaming artifact downloads with explicit redirect validation.
//!
//! The HTTP client never follows redirects on its own: each hop's
//! `Location` target is validated against the URL policy before it is
//! fetched, and a rejected hop aborts the download and removes the partial
//! file.

use crate::validation::{UrlError, UrlPolicy};
use futures::StreamExt;
use reqwest::{header, redirect, StatusCode, Url};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Maximum redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 5;

/// Errors from a single download.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    UnsafeUrl(#[from] UrlError),

    #[error("redirect to an untrusted target: {0}")]
    UnsafeRedirect(String),

    #[error("redirect without a Location header")]
    MissingLocation,

    #[error("too many redirects (limit {MAX_REDIRECTS})")]
    TooManyRedirects,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// Downloads generated artifacts from the content-delivery network.
#[derive(Debug)]
pub struct Downloader {
    client: reqwest::Client,
    policy: UrlPolicy,
}

impl Downloader {
    pub fn new(policy: UrlPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, policy })
    }

    /// Fetch `url` into `dest`, overwriting any existing file.
    ///
    /// On any failure the partial destination file is removed; there are no
    /// retries.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let target = self.policy.validate(url)?;
        let file = fs::File::create(dest).await?;

        match self.stream_to_file(target, file).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(rm) = fs::remove_file(dest).await {
                    log::warn!("failed to remove partial file {}: {}", dest.display(), rm);
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, mut target: Url, mut file: fs::File) -> Result<()> {
        for _ in 0..=MAX_REDIRECTS {
            let response = self.client.get(target.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(DownloadError::MissingLocation)?;
                // relative Location resolves against the current target
                let next = target
                    .join(location)
                    .map_err(|e| DownloadError::UnsafeRedirect(e.to_string()))?;
                target = self
                    .policy
                    .validate(next.as_str())
                    .map_err(|e| DownloadError::UnsafeRedirect(e.to_string()))?;
                log::debug!("following redirect to {target}");
                continue;
            }

            if !status.is_success() {
                return Err(DownloadError::Status(status));
            }

            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
            return Ok(());
        }
        Err(DownloadError::TooManyRedirects)
    }
}
