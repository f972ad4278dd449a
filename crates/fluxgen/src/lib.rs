//! FLUX image generation via the Replicate API.
//!
//! Core building blocks for the MCP server: the static model catalog,
//! path and URL validation, the Replicate prediction client, artifact
//! downloads, and the generation orchestrator.

pub mod catalog;
pub mod download;
pub mod generate;
pub mod replicate;
pub mod validation;

pub use catalog::{Catalog, ModelDescriptor, DEFAULT_MODEL, DEFAULT_OUTPUT_FORMAT};
pub use generate::{GenerateError, GenerationRequest, GenerationResult, Generator};
pub use replicate::{GenerationBackend, ReplicateClient};
pub use validation::{DownloadRoots, UrlPolicy};
