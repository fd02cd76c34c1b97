//! OpenAI service client.
//!
//! Composes the resolved backend, the parameter encoder, a transport and the
//! response decoders into the [`Client`] operations.
//! See: <https://platform.openai.com/docs/api-reference/chat>

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::ResolvedBackend;
use crate::client::{Client, ClientError};
use crate::http::{HttpTransport, Transport, TransportRequest};
use crate::model::{
    api_error, decode, AudioSpeechObject, ChatCompletionChunkObject, ChatCompletionObject,
};
use crate::options::{BackendConfiguration, TransportOptions};
use crate::params::{encode, AudioSpeechParameters, ChatCompletionParameters};
use crate::sse::EventStream;

const CHAT_COMPLETIONS: &str = "chat/completions";
const AUDIO_SPEECH: &str = "audio/speech";

/// Client for OpenAI and OpenAI-compatible backends.
///
/// Holds only read-only state; clone it or share it behind an `Arc` to issue
/// calls from several tasks at once.
#[derive(Debug, Clone)]
pub struct OpenAiClient<T = HttpTransport> {
    backend: ResolvedBackend,
    transport: T,
}

impl OpenAiClient<HttpTransport> {
    /// Create a client using the reqwest transport.
    ///
    /// Fails if the backend configuration or transport options are invalid.
    pub fn new(
        config: BackendConfiguration,
        transport_options: TransportOptions,
    ) -> Result<Self, ClientError> {
        Self::with_transport(&config, HttpTransport::new(&transport_options)?)
    }
}

impl<T: Transport> OpenAiClient<T> {
    /// Create a client on top of any transport.
    pub fn with_transport(config: &BackendConfiguration, transport: T) -> Result<Self, ClientError> {
        Ok(Self {
            backend: ResolvedBackend::resolve(config)?,
            transport,
        })
    }

    pub fn backend(&self) -> &ResolvedBackend {
        &self.backend
    }

    fn build_request<P: Serialize>(
        &self,
        endpoint: &str,
        parameters: &P,
    ) -> Result<TransportRequest, ClientError> {
        let url = self.backend.endpoint(endpoint)?;
        let body = encode(parameters)?;
        debug!(%url, bytes = body.len(), "sending request");

        Ok(TransportRequest {
            method: Method::POST,
            url,
            headers: self.backend.headers().clone(),
            body: Some(body),
        })
    }

    /// Send a unary request and return the body of a successful response.
    async fn execute<P: Serialize + Sync>(
        &self,
        endpoint: &str,
        parameters: &P,
    ) -> Result<bytes::Bytes, ClientError> {
        let request = self.build_request(endpoint, parameters)?;
        let response = self.transport.send(request).await?;
        debug!(status = %response.status, endpoint, "received response");

        if !response.status.is_success() {
            warn!(status = %response.status, endpoint, "request failed");
            return Err(api_error(response.status.as_u16(), &response.body));
        }
        Ok(response.body)
    }
}

#[async_trait]
impl<T: Transport> Client for OpenAiClient<T> {
    async fn chat(
        &self,
        parameters: &ChatCompletionParameters,
    ) -> Result<ChatCompletionObject, ClientError> {
        parameters.validate()?;
        let mut parameters = parameters.clone();
        parameters.stream = None;
        parameters.stream_options = None;

        let body = self.execute(CHAT_COMPLETIONS, &parameters).await?;
        decode(&body)
    }

    async fn chat_stream(
        &self,
        parameters: &ChatCompletionParameters,
    ) -> Result<EventStream<ChatCompletionChunkObject>, ClientError> {
        parameters.validate()?;
        let mut parameters = parameters.clone();
        parameters.stream = Some(true);

        let request = self.build_request(CHAT_COMPLETIONS, &parameters)?;
        let response = self.transport.send_streaming(request).await?;
        debug!(status = %response.status, "stream opened");

        if !response.status.is_success() {
            let status = response.status.as_u16();
            warn!(status, "stream request failed");
            let body = response.collect().await?;
            return Err(api_error(status, &body));
        }

        Ok(EventStream::new(response.body))
    }

    async fn speech(
        &self,
        parameters: &AudioSpeechParameters,
    ) -> Result<AudioSpeechObject, ClientError> {
        parameters.validate()?;
        let output = self.execute(AUDIO_SPEECH, parameters).await?;
        Ok(AudioSpeechObject { output })
    }
}
