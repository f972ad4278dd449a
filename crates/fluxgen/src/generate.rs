//! Generation orchestration.
//!
//! Validates a request against the model catalog, assembles the upstream
//! payload, runs the backend, and downloads every produced artifact to the
//! caller's directory. Downloads are strictly sequential so saved files and
//! source URLs stay index-aligned.

use crate::catalog::{Catalog, ModelDescriptor, DEFAULT_OUTPUT_FORMAT};
use crate::download::{DownloadError, Downloader};
use crate::replicate::{GenerationBackend, ReplicateError};
use crate::validation::{reject_insecure_url, DownloadRoots, PathError, UrlPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use crate::catalog::DEFAULT_MODEL;

/// A single generation request, as supplied by the calling agent.
///
/// Unknown extra fields are dropped at deserialization; the declared
/// optional fields below are additionally cross-checked against the
/// selected model before anything is forwarded upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub download_path: String,
    pub model: Option<String>,
    pub image_path: Option<String>,
    pub mask_path: Option<String>,
    pub aspect_ratio: Option<String>,
    pub seed: Option<i64>,
    pub raw: Option<bool>,
    pub num_outputs: Option<i64>,
    pub output_quality: Option<f64>,
    pub go_fast: Option<bool>,
    pub strength: Option<f64>,
    pub num_inference_steps: Option<i64>,
    pub guidance: Option<f64>,
    pub output_format: Option<String>,
}

impl GenerationRequest {
    /// The fixed optional-parameter list, as `(name, value)` pairs for the
    /// fields that were actually supplied.
    fn supplied_optional_fields(&self) -> Vec<(&'static str, Value)> {
        let mut fields = Vec::new();
        if let Some(v) = &self.aspect_ratio {
            fields.push(("aspect_ratio", json!(v)));
        }
        if let Some(v) = self.seed {
            fields.push(("seed", json!(v)));
        }
        if let Some(v) = self.raw {
            fields.push(("raw", json!(v)));
        }
        if let Some(v) = self.num_outputs {
            fields.push(("num_outputs", json!(v)));
        }
        if let Some(v) = self.output_quality {
            fields.push(("output_quality", json!(v)));
        }
        if let Some(v) = self.go_fast {
            fields.push(("go_fast", json!(v)));
        }
        if let Some(v) = self.strength {
            fields.push(("strength", json!(v)));
        }
        if let Some(v) = self.num_inference_steps {
            fields.push(("num_inference_steps", json!(v)));
        }
        if let Some(v) = self.guidance {
            fields.push(("guidance", json!(v)));
        }
        fields
    }

    fn format(&self) -> &str {
        self.output_format.as_deref().unwrap_or(DEFAULT_OUTPUT_FORMAT)
    }
}

/// Result of a completed generation: local files and their source URLs,
/// index-aligned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub model: String,
    pub saved: Vec<String>,
    pub urls: Vec<String>,
}

/// Everything that can go wrong while handling a generation request.
///
/// Each failing operation produces its kind directly; callers switch on the
/// kind, never on message text.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("REPLICATE_API_TOKEN is not set")]
    Configuration,

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("model {0} requires image_path")]
    MissingImage(String),

    #[error("insecure URL for {field}: only HTTPS is allowed")]
    InsecureUrl { field: &'static str },

    #[error(transparent)]
    UnsafePath(#[from] PathError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("generation rejected by the safety filter: {0}")]
    ContentPolicy(String),

    #[error("upstream generation failed: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ReplicateError> for GenerateError {
    fn from(e: ReplicateError) -> Self {
        match e {
            ReplicateError::MissingApiToken => GenerateError::Configuration,
            ReplicateError::ContentPolicy(message) => GenerateError::ContentPolicy(message),
            other => GenerateError::Upstream(other.to_string()),
        }
    }
}

/// Orchestrates a single generation request end to end.
pub struct Generator<B: GenerationBackend> {
    backend: B,
    catalog: Catalog,
    roots: DownloadRoots,
    downloader: Downloader,
}

impl<B: GenerationBackend> Generator<B> {
    pub fn new(
        backend: B,
        catalog: Catalog,
        roots: DownloadRoots,
        policy: UrlPolicy,
    ) -> Result<Self, GenerateError> {
        Ok(Self {
            backend,
            catalog,
            roots,
            downloader: Downloader::new(policy)?,
        })
    }

    /// Run the full pipeline: resolve the model, build the payload, invoke
    /// the backend, then download each artifact in order.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerateError> {
        let model_id = request.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let model = self
            .catalog
            .lookup(model_id)
            .ok_or_else(|| GenerateError::UnknownModel(model_id.to_string()))?;

        let input = build_input(request, model)?;

        log::info!("running {} ({})", model.id, model.display);
        let output = self.backend.run(model.id, &input).await?;

        let dir = self.roots.resolve(&request.download_path)?;
        tokio::fs::create_dir_all(&dir).await?;

        let base = derive_basename(model.display, Utc::now());
        let extension = extension_for(request.format());
        let urls = normalize_outputs(&output);

        let mut saved = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let dest = dir.join(format!("{}_{}{}", base, index + 1, extension));
            self.downloader.fetch(url, &dest).await?;
            log::info!("saved {}", dest.display());
            saved.push(dest.to_string_lossy().into_owned());
        }

        Ok(GenerationResult {
            model: model.id.to_string(),
            saved,
            urls,
        })
    }
}

/// Assemble the upstream input payload.
///
/// Only fields the model declares are forwarded; a supplied field the model
/// does not declare is dropped without error.
fn build_input(
    request: &GenerationRequest,
    model: &ModelDescriptor,
) -> Result<Value, GenerateError> {
    let mut input = serde_json::Map::new();
    input.insert("prompt".to_string(), json!(request.prompt));
    input.insert("output_format".to_string(), json!(request.format()));

    for (name, value) in request.supplied_optional_fields() {
        if model.has_input(name) {
            input.insert(name.to_string(), value);
        }
    }

    if model.accepts_image {
        let image = request
            .image_path
            .as_deref()
            .ok_or_else(|| GenerateError::MissingImage(model.id.to_string()))?;
        reject_insecure_url(image).map_err(|_| GenerateError::InsecureUrl {
            field: "image_path",
        })?;
        input.insert("image".to_string(), json!(image));
    }

    if model.has_input("mask") {
        if let Some(mask) = request.mask_path.as_deref() {
            reject_insecure_url(mask).map_err(|_| GenerateError::InsecureUrl {
                field: "mask_path",
            })?;
            input.insert("mask".to_string(), json!(mask));
        }
    }

    Ok(Value::Object(input))
}

/// Derive the artifact filename stem: the display name stripped to ASCII
/// alphanumerics and lowercased, plus a second-truncated UTC timestamp.
fn derive_basename(display: &str, now: DateTime<Utc>) -> String {
    let name: String = display
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase();
    format!("{}_{}", name, now.format("%Y-%m-%dT%H-%M-%S"))
}

/// File extension for a requested output format. Replicate's `jpeg` format
/// saves with the conventional `.jpg` extension.
fn extension_for(format: &str) -> String {
    if format == "jpeg" {
        ".jpg".to_string()
    } else {
        format!(".{format}")
    }
}

/// Normalize the upstream output to an ordered URL list.
///
/// The API returns a single URL for single-output models and an array for
/// multi-output models; file objects carry the URL in a `url` field.
fn normalize_outputs(output: &Value) -> Vec<String> {
    match output {
        Value::Array(items) => items.iter().filter_map(output_url).collect(),
        other => output_url(other).into_iter().collect(),
    }
}

fn output_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("url").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}
