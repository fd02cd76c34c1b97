//! Request parameters and their wire encoding.
//!
//! Parameter structs are partially filled: every optional field left as
//! `None` is omitted from the payload entirely, never sent as `null`.
//! Fields serialize in declaration order, so encoded payloads are
//! byte-for-byte reproducible. Enumerations serialize as their wire string.

use std::collections::BTreeMap;

use bytes::Bytes;
use nonempty::NonEmpty;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::client::ClientError;

/// Serialize parameters into a JSON request body.
pub fn encode<P: Serialize>(parameters: &P) -> Result<Bytes, ClientError> {
    serde_json::to_vec(parameters)
        .map(Bytes::from)
        .map_err(ClientError::Encode)
}

// --- Chat completions ---

/// Parameters for `POST chat/completions`.
///
/// # Example
/// ```rust
/// use openai_service::params::{ChatCompletionParameters, ChatMessage};
///
/// let parameters = ChatCompletionParameters::new("gpt-4o", ChatMessage::user("Hello!"))
///     .with_temperature(0.2);
/// ```
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionParameters {
    /// Conversation so far. At least one message is always present.
    pub messages: NonEmpty<ChatMessage>,
    pub model: String,
    /// -2.0 to 2.0.
    pub frequency_penalty: Option<f64>,
    /// Token id to bias, -100 to 100.
    pub logit_bias: Option<BTreeMap<String, f64>>,
    pub logprobs: Option<bool>,
    /// 0 to 20. Requires `logprobs`.
    pub top_logprobs: Option<u32>,
    /// Deprecated upstream in favor of `max_completion_tokens`.
    pub max_tokens: Option<u32>,
    pub max_completion_tokens: Option<u32>,
    /// Number of choices to generate, at least 1.
    pub n: Option<u32>,
    /// -2.0 to 2.0.
    pub presence_penalty: Option<f64>,
    pub response_format: Option<ResponseFormat>,
    pub seed: Option<i64>,
    pub service_tier: Option<ServiceTier>,
    pub stop: Option<Vec<String>>,
    /// Set by the client for streaming calls.
    pub stream: Option<bool>,
    pub stream_options: Option<StreamOptions>,
    /// 0.0 to 2.0.
    pub temperature: Option<f64>,
    /// 0.0 to 1.0.
    pub top_p: Option<f64>,
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<ToolChoice>,
    pub parallel_tool_calls: Option<bool>,
    pub user: Option<String>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl ChatCompletionParameters {
    /// Create parameters with the required fields only.
    pub fn new(model: impl Into<String>, first: ChatMessage) -> Self {
        Self {
            messages: NonEmpty::new(first),
            model: model.into(),
            frequency_penalty: None,
            logit_bias: None,
            logprobs: None,
            top_logprobs: None,
            max_tokens: None,
            max_completion_tokens: None,
            n: None,
            presence_penalty: None,
            response_format: None,
            seed: None,
            service_tier: None,
            stop: None,
            stream: None,
            stream_options: None,
            temperature: None,
            top_p: None,
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
            user: None,
            reasoning_effort: None,
        }
    }

    /// Append a message to the conversation.
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set top-p sampling parameter.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set maximum tokens to generate.
    pub fn with_max_completion_tokens(mut self, max_tokens: u32) -> Self {
        self.max_completion_tokens = Some(max_tokens);
        self
    }

    /// Offer tools the model may call.
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Check documented ranges. Returns the first offending field.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.model.trim().is_empty() {
            return Err(ClientError::invalid("model", "must not be empty"));
        }
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        if let Some(bias) = &self.logit_bias {
            for value in bias.values() {
                check_range("logit_bias", Some(*value), -100.0, 100.0)?;
            }
        }
        if matches!(self.top_logprobs, Some(n) if n > 20) {
            return Err(ClientError::invalid("top_logprobs", "must be between 0 and 20"));
        }
        if self.n == Some(0) {
            return Err(ClientError::invalid("n", "must be at least 1"));
        }
        Ok(())
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

/// A message sent as part of the conversation.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
    pub name: Option<String>,
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Id of the call this message answers. Only for `Role::Tool`.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A tool result answering the call with `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// Message body: plain text or a list of typed parts.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    /// An `https` URL or a `data:` URL with base64 image bytes.
    pub url: String,
    pub detail: Option<ImageDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Auto,
    Low,
    High,
}

/// A tool call previously made by the assistant, echoed back in history.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: ToolType,
    pub function: FunctionCallRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionCallRequest {
    pub name: String,
    /// JSON-encoded arguments, as the model produced them.
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Function,
}

/// A function the model may call.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDefinition,
}

impl Tool {
    pub fn function(function: FunctionDefinition) -> Self {
        Self {
            tool_type: ToolType::Function,
            function,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema of the arguments object.
    pub parameters: Option<Value>,
    pub strict: Option<bool>,
}

/// Controls whether and which tool the model calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    None,
    Auto,
    Required,
    Function { name: String },
}

impl Serialize for ToolChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ToolChoice::None => serializer.serialize_str("none"),
            ToolChoice::Auto => serializer.serialize_str("auto"),
            ToolChoice::Required => serializer.serialize_str("required"),
            ToolChoice::Function { name } => {
                #[derive(Serialize)]
                struct Named<'a> {
                    name: &'a str,
                }

                let mut choice = serializer.serialize_struct("ToolChoice", 2)?;
                choice.serialize_field("type", &ToolType::Function)?;
                choice.serialize_field("function", &Named { name })?;
                choice.end()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub description: Option<String>,
    pub schema: Option<Value>,
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    Auto,
    Default,
    Flex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamOptions {
    /// Ask for a final chunk carrying token usage.
    pub include_usage: Option<bool>,
}

// --- Audio speech ---

/// Parameters for `POST audio/speech`.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct AudioSpeechParameters {
    pub model: SpeechModel,
    /// Text to speak, at most 4096 characters.
    pub input: String,
    pub voice: Voice,
    /// Voice steering. Not supported by `tts-1` or `tts-1-hd`.
    pub instructions: Option<String>,
    /// Defaults to mp3 upstream.
    pub response_format: Option<AudioFormat>,
    /// 0.25 to 4.0, defaults to 1.0 upstream.
    pub speed: Option<f64>,
}

impl AudioSpeechParameters {
    pub const MAX_INPUT_CHARS: usize = 4096;

    pub fn new(model: SpeechModel, input: impl Into<String>, voice: Voice) -> Self {
        Self {
            model,
            input: input.into(),
            voice,
            instructions: None,
            response_format: None,
            speed: None,
        }
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Check documented ranges. Returns the first offending field.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.input.is_empty() {
            return Err(ClientError::invalid("input", "must not be empty"));
        }
        let chars = self.input.chars().count();
        if chars > Self::MAX_INPUT_CHARS {
            return Err(ClientError::invalid(
                "input",
                format!("{chars} characters exceeds the limit of {}", Self::MAX_INPUT_CHARS),
            ));
        }
        check_range("speed", self.speed, 0.25, 4.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeechModel {
    #[serde(rename = "tts-1")]
    Tts1,
    #[serde(rename = "tts-1-hd")]
    Tts1Hd,
    #[serde(rename = "gpt-4o-mini-tts")]
    Gpt4oMiniTts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Fable,
    Nova,
    Onyx,
    Sage,
    Shimmer,
    Verse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    Pcm,
}

fn check_range(field: &'static str, value: Option<f64>, min: f64, max: f64) -> Result<(), ClientError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(ClientError::invalid(
            field,
            format!("{v} is outside {min}..={max}"),
        )),
        _ => Ok(()),
    }
}
