//! OpenAI-compatible cloud client.
//!
//! Works with OpenRouter (the default endpoint) and any endpoint exposing
//! `/chat/completions`, `/embeddings` and `/models` in the OpenAI shape.
//!
//! Supports:
//! - Streaming chat completions over either transport
//! - Tool definitions in the request
//! - Embeddings and model listing

use async_trait::async_trait;
use lily_config::{CloudConfig, StreamTransport};
use lily_core::error::ProviderError;
use lily_core::provider::{Capabilities, CompletionRequest, Embedder, ModelDescriptor};
use lily_core::tool::ToolDefinition;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::http_buffer::HttpProgressiveBuffer;
use crate::stream::{ChunkedSource, DeltaSource, PollingSource, StreamingClient};

/// Client for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct CloudClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    transport: StreamTransport,
    poll_interval: Duration,
    timeout: Duration,
}

impl CloudClient {
    /// Create a client with the default (chunked) transport.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(120);
        // No whole-request timeout: streamed responses may run for minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
            transport: StreamTransport::default(),
            poll_interval: Duration::from_millis(50),
            timeout,
        })
    }

    pub fn from_config(config: &CloudConfig) -> Result<Self, ProviderError> {
        let mut client =
            Self::new(&config.api_url, config.api_key.clone())?.with_transport(config.transport);
        client.poll_interval = config.poll_interval();
        client.timeout = config.timeout();
        Ok(client)
    }

    pub fn with_transport(mut self, transport: StreamTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn transport(&self) -> StreamTransport {
        self.transport
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// An embedder backed by this endpoint's `/embeddings`.
    pub fn embedder(&self, model: impl Into<String>) -> CloudEmbedder {
        CloudEmbedder {
            client: self.clone(),
            model: model.into(),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    /// The JSON body for a streaming chat completion.
    pub fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<ApiMessage> = request
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Send a streaming completion request and return its reader.
    pub async fn open_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<Box<dyn DeltaSource>, ProviderError> {
        if self.api_key.is_none() {
            return Err(ProviderError::NotConfigured(
                "no API key set for the cloud endpoint".into(),
            ));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(request);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            transport = ?self.transport,
            "Sending streaming request"
        );

        let response = self
            .authorized(self.client.post(&url))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let body = Box::pin(response.bytes_stream());

        Ok(match self.transport {
            StreamTransport::Chunked => Box::new(ChunkedSource::new(body)),
            StreamTransport::Polling => Box::new(PollingSource::sse(
                Box::new(HttpProgressiveBuffer::spawn(body)),
                self.poll_interval,
            )),
        })
    }

    /// List the models offered by the endpoint.
    pub async fn list_models(&self) -> Result<Vec<CloudModel>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("model list: {e}")))?;

        debug!(count = listing.data.len(), "Fetched cloud models");
        Ok(listing.data)
    }

    async fn embed_text(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "input": text,
            "encoding_format": "float",
        });

        debug!(model = %model, chars = text.len(), "Sending embedding request");

        let response = self
            .authorized(self.client.post(&url))
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let parsed: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("embedding response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("no embedding in response".into()))
    }
}

#[async_trait]
impl StreamingClient for CloudClient {
    async fn open_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<Box<dyn DeltaSource>, ProviderError> {
        CloudClient::open_stream(self, request).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        404 => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::ModelNotFound(body))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Cloud endpoint returned error");
            Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            })
        }
    }
}

/// Embeddings from the cloud endpoint.
pub struct CloudEmbedder {
    client: CloudClient,
    model: String,
}

#[async_trait]
impl Embedder for CloudEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.client.embed_text(&self.model, text).await
    }
}

/// One entry of the endpoint's model catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudModel {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub context_length: u64,

    #[serde(default)]
    pub pricing: ModelPricing,
}

/// Per-token prices as published by the endpoint (decimal strings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub completion: String,
}

impl CloudModel {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_cloud_model(&self.id)
    }

    pub fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor::cloud(self.id.clone())
    }

    /// `name` when the catalog has one, else the ID.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    #[serde(default)]
    data: Vec<CloudModel>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lily_core::message::Role;
    use lily_core::provider::ContextMessage;

    fn request(tools: Vec<ToolDefinition>) -> CompletionRequest {
        CompletionRequest {
            model: "openai/gpt-4o-mini".into(),
            messages: vec![
                ContextMessage::new(Role::User, "Hi"),
                ContextMessage::new(Role::Assistant, "Hello!"),
            ],
            tools,
            corpus_dir: None,
        }
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = CloudClient::new("https://openrouter.ai/api/v1/", None).unwrap();
        assert_eq!(client.base_url(), "https://openrouter.ai/api/v1");
        assert_eq!(client.transport(), StreamTransport::Chunked);
    }

    #[test]
    fn from_config_takes_transport() {
        let config = CloudConfig {
            transport: StreamTransport::Polling,
            ..CloudConfig::default()
        };
        let client = CloudClient::from_config(&config).unwrap();
        assert_eq!(client.transport(), StreamTransport::Polling);
    }

    #[test]
    fn request_body_shape() {
        let body = CloudClient::request_body(&request(vec![]));
        assert_eq!(body["model"], "openai/gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Hello!");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn request_body_omits_document_dir() {
        let mut req = request(vec![]);
        req.corpus_dir = Some("/home/me/notes".into());
        let body = CloudClient::request_body(&req);
        assert!(body.get("corpus_dir").is_none());
    }

    #[test]
    fn request_body_includes_tools() {
        let body = CloudClient::request_body(&request(vec![ToolDefinition {
            name: "vibrate_device".into(),
            description: "Vibrate".into(),
            parameters: serde_json::json!({"type": "object"}),
        }]));
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "vibrate_device");
    }

    #[tokio::test]
    async fn open_stream_without_key_fails_fast() {
        let client = CloudClient::new("http://127.0.0.1:9", None).unwrap();
        let err = client.open_stream(&request(vec![])).await.err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn parse_model_listing() {
        let data = r#"{"data":[
            {"id":"openai/gpt-4o","name":"GPT-4o","description":"Omni","context_length":128000,
             "pricing":{"prompt":"0.0000025","completion":"0.00001"}},
            {"id":"mistralai/mistral-7b-instruct"}
        ]}"#;
        let listing: ModelListing = serde_json::from_str(data).unwrap();
        assert_eq!(listing.data.len(), 2);
        assert_eq!(listing.data[0].pricing.prompt, "0.0000025");
        assert!(listing.data[0].capabilities().supports_vision);
        assert_eq!(listing.data[1].display_name(), "mistralai/mistral-7b-instruct");
        assert!(!listing.data[1].capabilities().supports_vision);
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{"data":[{"embedding":[0.1,0.2,0.3],"index":0}],"model":"m"}"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }
}
