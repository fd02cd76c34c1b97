//! Core client trait and error types.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{AudioSpeechObject, ChatCompletionChunkObject, ChatCompletionObject};
use crate::params::{AudioSpeechParameters, ChatCompletionParameters};
use crate::sse::EventStream;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failure reported by a non-reqwest transport.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A parameter violated its documented range before anything was sent.
    #[error("Invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        error_type: Option<String>,
        message: String,
    },

    /// The server reported an error inside an open event stream.
    #[error("Stream error: {0}")]
    Stream(String),
}

impl ClientError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ClientError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

/// Operations exposed by an OpenAI-compatible service.
///
/// Implementations hold no mutable state across calls, so a single instance
/// may be shared between tasks and invoked concurrently.
///
/// # Example
/// ```rust,ignore
/// let client = OpenAiClient::new(BackendConfiguration::from_env()?, TransportOptions::default())?;
/// let completion = client.chat(&parameters).await?;
/// ```
#[async_trait]
pub trait Client: Send + Sync {
    /// Send a chat completion request and decode the full response.
    async fn chat(
        &self,
        parameters: &ChatCompletionParameters,
    ) -> Result<ChatCompletionObject, ClientError>;

    /// Send a streaming chat completion request.
    ///
    /// The returned stream yields one chunk per data frame, in arrival order,
    /// and ends at the `[DONE]` sentinel or when the server closes the body.
    async fn chat_stream(
        &self,
        parameters: &ChatCompletionParameters,
    ) -> Result<EventStream<ChatCompletionChunkObject>, ClientError>;

    /// Generate audio from text.
    async fn speech(
        &self,
        parameters: &AudioSpeechParameters,
    ) -> Result<AudioSpeechObject, ClientError>;
}
