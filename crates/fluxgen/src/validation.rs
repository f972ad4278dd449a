//! Boundary validation for filesystem targets and remote URLs.
//!
//! Every caller-supplied download path and every artifact URL (including
//! redirect targets) passes through here before any I/O happens.

use reqwest::Url;
use std::path::{Component, Path, PathBuf};

/// Hostname suffix of the Replicate content-delivery network.
pub const CDN_HOST_SUFFIX: &str = "replicate.delivery";

/// Errors from download-path validation.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error(
        "download path must be within the home directory, the system temp \
         directory, or the project downloads folder: {0}"
    )]
    OutsideAllowedRoots(PathBuf),

    #[error("cannot determine the home directory")]
    NoHomeDir,

    #[error("cannot determine the working directory")]
    NoWorkingDir,
}

/// Errors from remote-URL validation.
#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Parse(String),

    #[error("only HTTPS URLs are allowed, got scheme '{0}'")]
    InsecureScheme(String),

    #[error("host '{0}' is not part of the allowed content-delivery domain")]
    ForbiddenHost(String),

    #[error("URL has no host")]
    MissingHost,
}

/// Allowlisted roots for generated-file downloads.
#[derive(Debug, Clone)]
pub struct DownloadRoots {
    roots: Vec<PathBuf>,
}

impl DownloadRoots {
    /// The standard allowlist: the home directory, the system temp
    /// directory, and `downloads/` under the current working directory.
    pub fn standard() -> Result<Self, PathError> {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
        let cwd = std::env::current_dir().map_err(|_| PathError::NoWorkingDir)?;
        Ok(Self::new(vec![
            home,
            std::env::temp_dir(),
            cwd.join("downloads"),
        ]))
    }

    /// Allowlist over explicit roots.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let roots = roots.iter().map(|r| normalize(r)).collect();
        Self { roots }
    }

    /// Expand, absolutize, and lexically normalize `raw`, then require the
    /// result to be contained in one of the allowed roots.
    ///
    /// Normalization never touches the filesystem, so the target does not
    /// have to exist yet.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathError> {
        let expanded = expand_tilde(raw)?;
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            let cwd = std::env::current_dir().map_err(|_| PathError::NoWorkingDir)?;
            cwd.join(expanded)
        };
        let resolved = normalize(&absolute);

        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            Err(PathError::OutsideAllowedRoots(resolved))
        }
    }
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(raw: &str) -> Result<PathBuf, PathError> {
    if raw == "~" {
        return dirs::home_dir().ok_or(PathError::NoHomeDir);
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(raw))
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// URL acceptance policy for artifact downloads.
///
/// Applied to the initial download URL and to every redirect target.
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    host_suffix: String,
    https_only: bool,
}

impl UrlPolicy {
    /// The production policy: HTTPS only, Replicate CDN hosts only.
    pub fn replicate_cdn() -> Self {
        Self::for_host(CDN_HOST_SUFFIX, true)
    }

    /// Policy over an arbitrary host suffix.
    pub fn for_host(host_suffix: &str, https_only: bool) -> Self {
        Self {
            host_suffix: host_suffix.to_string(),
            https_only,
        }
    }

    /// Validate a download or redirect target.
    pub fn validate(&self, url: &str) -> Result<Url, UrlError> {
        let parsed = Url::parse(url).map_err(|e| UrlError::Parse(e.to_string()))?;
        if self.https_only && parsed.scheme() != "https" {
            return Err(UrlError::InsecureScheme(parsed.scheme().to_string()));
        }
        let host = parsed.host_str().ok_or(UrlError::MissingHost)?;
        if !host_matches(host, &self.host_suffix) {
            return Err(UrlError::ForbiddenHost(host.to_string()));
        }
        Ok(parsed)
    }
}

/// Exact-label suffix match: the host is the suffix itself or ends with
/// `.` + suffix. A plain substring or `ends_with` check would accept
/// confusable hosts like `notreplicate.delivery`.
fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Reject `http://` image or mask sources.
///
/// Local paths and HTTPS URLs pass through untouched; the upstream service
/// fetches and validates them itself.
pub fn reject_insecure_url(source: &str) -> Result<(), UrlError> {
    if source.starts_with("http://") {
        return Err(UrlError::InsecureScheme("http".to_string()));
    }
    Ok(())
}
