//! Response records and the permissive decoder.
//!
//! Upstream schemas grow and compatible servers omit fields, so every field
//! here is optional and decoded on its own: a missing field, or one whose
//! wire type does not match, resolves to `None` without failing the record.
//! Unknown fields are ignored.
//!
//! The one exception is `choices` on the two envelope types. An object
//! without it is not a completion at all, and decoding fails. Individual
//! choices that cannot be decoded are skipped, as are bad elements of the
//! other record lists.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError, VecSkipError};

use crate::client::ClientError;
use crate::scalar::IntOrStringValue;

/// Decode a whole response body.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ClientError> {
    serde_json::from_slice(payload).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Decode an already parsed JSON value.
pub fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

// --- Chat completion ---

/// A chat completion returned by `chat/completions`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatCompletionObject {
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub id: Option<String>,
    /// More than one when `n` > 1.
    #[serde_as(as = "VecSkipError<_>")]
    pub choices: Vec<ChatChoice>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub created: Option<i64>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub model: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub service_tier: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub system_fingerprint: Option<String>,
    /// Always `chat.completion` upstream.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub object: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub usage: Option<ChatUsage>,
}

impl ChatCompletionObject {
    /// Text content of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.content.as_deref())
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatChoice {
    /// `stop`, `length`, `tool_calls`, `content_filter` or `function_call`
    /// upstream; some compatible servers send an integer.
    #[serde_as(as = "DefaultOnError")]
    pub finish_reason: Option<IntOrStringValue>,
    #[serde_as(as = "DefaultOnError")]
    pub index: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub message: Option<ChatMessageResponse>,
    #[serde_as(as = "DefaultOnError")]
    pub logprobs: Option<LogProbs>,
}

/// Message generated by the model.
///
/// `function_call` is the deprecated single-call form and `tool_calls` its
/// successor. Both decode independently; either, both or neither may be set.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatMessageResponse {
    #[serde_as(as = "DefaultOnError")]
    pub content: Option<String>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Deprecated upstream in favor of `tool_calls`.
    #[serde_as(as = "DefaultOnError")]
    pub function_call: Option<FunctionCall>,
    #[serde_as(as = "DefaultOnError")]
    pub role: Option<String>,
    /// Reasoning text, sent by some reasoning-capable compatible servers.
    #[serde_as(as = "DefaultOnError")]
    pub reasoning_content: Option<String>,
    /// Sent by older vision models.
    #[serde_as(as = "DefaultOnError")]
    pub finish_details: Option<FinishDetails>,
    #[serde_as(as = "DefaultOnError")]
    pub refusal: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub audio: Option<AudioResponse>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FinishDetails {
    #[serde(rename = "type")]
    #[serde_as(as = "DefaultOnError")]
    pub detail_type: Option<String>,
}

/// Audio output, present when the audio modality was requested.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AudioResponse {
    #[serde_as(as = "DefaultOnError")]
    pub id: Option<String>,
    /// Unix timestamp after which the audio can no longer be referenced.
    #[serde_as(as = "DefaultOnError")]
    pub expires_at: Option<i64>,
    /// Base64 audio bytes.
    #[serde_as(as = "DefaultOnError")]
    pub data: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub transcript: Option<String>,
}

/// A tool call. In streamed chunks `index` identifies which call a partial
/// `function.arguments` fragment belongs to.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToolCall {
    #[serde_as(as = "DefaultOnError")]
    pub index: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    #[serde_as(as = "DefaultOnError")]
    pub call_type: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub function: Option<FunctionCall>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FunctionCall {
    #[serde_as(as = "DefaultOnError")]
    pub name: Option<String>,
    /// JSON-encoded arguments. May be invalid JSON or a partial fragment.
    #[serde_as(as = "DefaultOnError")]
    pub arguments: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogProbs {
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    pub content: Option<Vec<TokenDetail>>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TokenDetail {
    #[serde_as(as = "DefaultOnError")]
    pub token: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub logprob: Option<f64>,
    /// UTF-8 bytes of the token, for tokens that split a character.
    #[serde_as(as = "DefaultOnError")]
    pub bytes: Option<Vec<u8>>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    pub top_logprobs: Option<Vec<TopLogProb>>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TopLogProb {
    #[serde_as(as = "DefaultOnError")]
    pub token: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub logprob: Option<f64>,
    #[serde_as(as = "DefaultOnError")]
    pub bytes: Option<Vec<u8>>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatUsage {
    #[serde_as(as = "DefaultOnError")]
    pub prompt_tokens: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub completion_tokens: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub total_tokens: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde_as(as = "DefaultOnError")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PromptTokensDetails {
    #[serde_as(as = "DefaultOnError")]
    pub cached_tokens: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub audio_tokens: Option<u32>,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompletionTokensDetails {
    #[serde_as(as = "DefaultOnError")]
    pub reasoning_tokens: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub audio_tokens: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub accepted_prediction_tokens: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub rejected_prediction_tokens: Option<u32>,
}

// --- Streamed chunks ---

/// One streamed chunk of a chat completion.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatCompletionChunkObject {
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub id: Option<String>,
    /// Empty on the final usage-only chunk.
    #[serde_as(as = "VecSkipError<_>")]
    pub choices: Vec<ChatChunkChoice>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub created: Option<i64>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub model: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub service_tier: Option<String>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub system_fingerprint: Option<String>,
    /// Always `chat.completion.chunk` upstream.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub object: Option<String>,
    /// Only on the last chunk, and only when usage was requested.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub usage: Option<ChatUsage>,
}

impl ChatCompletionChunkObject {
    /// Text delta of the first choice, if any.
    pub fn delta_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.as_deref())
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatChunkChoice {
    #[serde_as(as = "DefaultOnError")]
    pub delta: Option<ChatDelta>,
    #[serde_as(as = "DefaultOnError")]
    pub finish_reason: Option<IntOrStringValue>,
    #[serde_as(as = "DefaultOnError")]
    pub index: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    pub logprobs: Option<LogProbs>,
}

/// The part of a message that arrived in one chunk.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatDelta {
    #[serde_as(as = "DefaultOnError")]
    pub content: Option<String>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Deprecated upstream in favor of `tool_calls`.
    #[serde_as(as = "DefaultOnError")]
    pub function_call: Option<FunctionCall>,
    #[serde_as(as = "DefaultOnError")]
    pub role: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub reasoning_content: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub refusal: Option<String>,
}

// --- Audio ---

/// Raw audio returned by `audio/speech`, in the requested format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpeechObject {
    pub output: Bytes,
}

// --- Errors ---

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiErrorDetail {
    #[serde_as(as = "DefaultOnError")]
    message: Option<String>,
    #[serde(rename = "type")]
    #[serde_as(as = "DefaultOnError")]
    error_type: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    code: Option<IntOrStringValue>,
}

impl ApiErrorDetail {
    fn from_value(value: &Value) -> Option<Self> {
        value
            .get("error")
            .filter(|error| error.is_object())
            .and_then(|error| serde_json::from_value(error.clone()).ok())
    }

    fn describe(&self) -> String {
        match (&self.message, &self.code) {
            (Some(message), _) => message.clone(),
            (None, Some(code)) => format!("error code {code}"),
            (None, None) => "unknown error".to_string(),
        }
    }
}

/// Build an [`ClientError::Api`] from a non-success response body.
pub(crate) fn api_error(status: u16, body: &[u8]) -> ClientError {
    let detail = serde_json::from_slice::<Value>(body)
        .ok()
        .as_ref()
        .and_then(ApiErrorDetail::from_value);

    match detail {
        Some(detail) => ClientError::Api {
            status,
            message: detail.describe(),
            error_type: detail.error_type,
        },
        None => ClientError::Api {
            status,
            error_type: None,
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

/// The error message carried by a stream frame, if it is an error frame.
pub(crate) fn frame_error(value: &Value) -> Option<String> {
    ApiErrorDetail::from_value(value).map(|detail| detail.describe())
}
