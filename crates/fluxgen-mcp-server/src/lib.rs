//! FLUX MCP server.
//!
//! Exposes FLUX image generation on Replicate to AI assistants via the
//! Model Context Protocol (JSON-RPC 2.0 over stdio). Two tools are served:
//! a catalog listing and the generation call itself. Generation failures
//! are sanitized before they reach the caller; the full error goes to the
//! stderr log only.

use fluxgen::download::DownloadError;
use fluxgen::generate::{GenerateError, GenerationRequest, GenerationResult};
use fluxgen::{Catalog, DownloadRoots, Generator, ReplicateClient, UrlPolicy, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name.
pub const SERVER_NAME: &str = "fluxgen-mcp-server";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum McpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
            }),
        }
    }
}

/// Tool definition for MCP.
#[derive(Debug, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// FLUX MCP server: tool definitions, dispatch, and the stdio loop.
pub struct FluxServer {
    catalog: Catalog,
    api_url: String,
}

impl FluxServer {
    /// Create a server generating against the given Replicate API base.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            catalog: Catalog::builtin(),
            api_url: api_url.into(),
        }
    }

    /// The two tools served to the calling agent.
    fn get_tools(&self) -> Vec<Tool> {
        let model_ids: Vec<&str> = self.catalog.list_all().iter().map(|m| m.id).collect();
        vec![
            Tool {
                name: "flux_models".to_string(),
                description: "List supported FLUX models with usage notes and key inputs"
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
            },
            Tool {
                name: "flux_generate".to_string(),
                description:
                    "Generate an image with a FLUX model via Replicate and save files to \
                     download_path"
                        .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "prompt": {
                            "type": "string",
                            "description": "Text prompt describing the image"
                        },
                        "download_path": {
                            "type": "string",
                            "description": "Directory to save generated images"
                        },
                        "model": {
                            "type": "string",
                            "description": "FLUX model to use",
                            "enum": model_ids,
                            "default": DEFAULT_MODEL
                        },
                        "image_path": {
                            "type": "string",
                            "description": "Local path or URL to input image (for image-accepting models)"
                        },
                        "mask_path": {
                            "type": "string",
                            "description": "Local path or URL to mask for inpainting (Fill model)"
                        },
                        "aspect_ratio": {
                            "type": "string",
                            "description": "Aspect ratio (e.g., '1:1', '16:9', '3:4')"
                        },
                        "seed": {
                            "type": "number",
                            "description": "Random seed for reproducibility"
                        },
                        "raw": {
                            "type": "boolean",
                            "description": "Enable raw realism mode (Ultra model)"
                        },
                        "num_outputs": {
                            "type": "number",
                            "description": "Number of images to generate"
                        },
                        "output_quality": {
                            "type": "number",
                            "description": "Quality setting (model-dependent)"
                        },
                        "go_fast": {
                            "type": "boolean",
                            "description": "Speed vs quality tradeoff"
                        },
                        "strength": {
                            "type": "number",
                            "description": "Variation strength (Redux model)"
                        },
                        "num_inference_steps": {
                            "type": "number",
                            "description": "Inference steps (Fill model)"
                        },
                        "guidance": {
                            "type": "number",
                            "description": "Guidance scale (Fill model)"
                        },
                        "output_format": {
                            "type": "string",
                            "description": "Output image format (png, jpeg, or webp)",
                            "enum": ["png", "jpeg", "webp"],
                            "default": "png"
                        }
                    },
                    "required": ["prompt", "download_path"]
                }),
            },
        ]
    }

    /// Handle initialize request.
    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            },
            "instructions": "FLUX image generation via Replicate.\n\nAvailable tools:\n- flux_models: list supported FLUX models\n- flux_generate: generate an image and save it to download_path"
        })
    }

    /// Handle tools/list request.
    fn handle_tools_list(&self) -> Value {
        json!({
            "tools": self.get_tools()
        })
    }

    /// Handle tools/call request.
    ///
    /// Generation failures never become JSON-RPC errors: they are caught,
    /// sanitized, and returned as error-flagged tool results. Only a tool
    /// name outside the fixed set is rejected at this boundary.
    async fn handle_tools_call(&self, params: Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| McpError::InvalidRequest("Missing tool name".to_string()))?;
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        log::debug!("Calling tool: {} with args: {}", name, arguments);

        match name {
            "flux_models" => Ok(tool_result(self.tool_flux_models(), false)),
            "flux_generate" => Ok(self.tool_flux_generate(arguments).await),
            _ => Err(McpError::InvalidRequest(format!("Unknown tool: {}", name))),
        }
    }

    /// List every catalog entry with its key inputs (names only).
    fn tool_flux_models(&self) -> String {
        let models: Vec<Value> = self
            .catalog
            .list_all()
            .iter()
            .map(|m| {
                json!({
                    "model": m.id,
                    "display": m.display,
                    "kind": m.kind,
                    "accepts_image": m.accepts_image,
                    "notes": m.notes,
                    "key_inputs": m.input_names(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&models).unwrap_or_else(|_| "[]".to_string())
    }

    /// Run a generation request and package the outcome.
    async fn tool_flux_generate(&self, arguments: Value) -> Value {
        let request: GenerationRequest = match serde_json::from_value(arguments) {
            Ok(request) => request,
            Err(e) => {
                return tool_result(format!("Error: invalid arguments: {}", e), true);
            }
        };

        match self.run_generation(&request).await {
            Ok(result) => {
                let text =
                    serde_json::to_string_pretty(&result).unwrap_or_else(|_| "{}".to_string());
                tool_result(text, false)
            }
            Err(e) => {
                // full detail stays on the diagnostic channel
                log::error!("flux_generate failed: {:?}", e);
                tool_result(format!("Error: {}", sanitize_error(&e)), true)
            }
        }
    }

    async fn run_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerateError> {
        let client = ReplicateClient::from_env(Some(&self.api_url))?;
        let roots = DownloadRoots::standard()?;
        let generator = Generator::new(client, self.catalog, roots, UrlPolicy::replicate_cdn())?;
        generator.generate(request).await
    }

    /// Handle a single JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        log::debug!("Handling request: {}", request.method);

        match request.method.as_str() {
            "initialize" => Some(JsonRpcResponse::success(
                request.id,
                self.handle_initialize(),
            )),
            "initialized" => {
                // notification, no response needed
                None
            }
            "tools/list" => Some(JsonRpcResponse::success(
                request.id,
                self.handle_tools_list(),
            )),
            "tools/call" => match self.handle_tools_call(request.params).await {
                Ok(result) => Some(JsonRpcResponse::success(request.id, result)),
                Err(e) => Some(JsonRpcResponse::error(request.id, -32603, &e.to_string())),
            },
            "ping" => Some(JsonRpcResponse::success(request.id, json!({}))),
            _ => {
                log::warn!("Unknown method: {}", request.method);
                Some(JsonRpcResponse::error(
                    request.id,
                    -32601,
                    &format!("Method not found: {}", request.method),
                ))
            }
        }
    }

    /// Run the MCP server over stdio.
    pub async fn run_stdio(&self) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        log::info!("MCP server ready, listening on stdio...");

        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    log::error!("Failed to parse request: {}", e);
                    let response = JsonRpcResponse::error(None, -32700, "Parse error");
                    write_response(&mut stdout, &response).await?;
                    continue;
                }
            };

            if let Some(response) = self.handle_request(request).await {
                write_response(&mut stdout, &response).await?;
            }
        }

        Ok(())
    }
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    response: &JsonRpcResponse,
) -> anyhow::Result<()> {
    let response_json = serde_json::to_string(response)?;
    log::debug!("Sending: {}", response_json);
    stdout.write_all(response_json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Wrap tool output text in the MCP content envelope.
fn tool_result(text: String, is_error: bool) -> Value {
    let mut result = json!({
        "content": [{
            "type": "text",
            "text": text
        }]
    });
    if is_error {
        result["isError"] = json!(true);
    }
    result
}

/// Map an error kind to the message exposed to the caller.
///
/// Only user-actionable kinds surface a specific message; everything else,
/// including configuration and upstream failures, gets the generic one.
fn sanitize_error(error: &GenerateError) -> String {
    match error {
        GenerateError::UnknownModel(model) => format!("Unknown model: {}", model),
        GenerateError::MissingImage(model) => format!("Model {} requires image_path", model),
        GenerateError::UnsafePath(_) => {
            "Invalid download path. Path must be within the home directory, the system \
             temp directory, or the project downloads folder."
                .to_string()
        }
        GenerateError::InsecureUrl { .. } => {
            "Only HTTPS URLs are allowed for security reasons.".to_string()
        }
        GenerateError::ContentPolicy(_) => {
            "Content was flagged by safety filters. Please try a different prompt.".to_string()
        }
        GenerateError::Download(DownloadError::UnsafeRedirect(_)) => {
            "Download aborted: redirect to an untrusted domain.".to_string()
        }
        GenerateError::Download(DownloadError::UnsafeUrl(_)) => {
            "Invalid image source. Only Replicate CDN URLs are allowed.".to_string()
        }
        _ => "An error occurred while generating the image.".to_string(),
    }
}
