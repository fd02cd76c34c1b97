//! # openai-service - OpenAI-style client codec layer
//!
//! A small, pragmatic Rust library for talking to OpenAI and OpenAI-compatible
//! services through one backend-agnostic client.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Four backends behind one interface: direct key, Azure-style gateway,
//!   managed key-splitting proxy, and any custom host
//! - Permissive response decoding that tolerates missing and drifting fields
//! - Streaming support via Server-Sent Events
//! - Pluggable transport for tests and custom HTTP stacks
//!
//! ## Architecture
//!
//! - **`BackendConfiguration`**: which service to talk to and how to authenticate.
//!   Resolved once into a base URL and header set at construction.
//! - **`ChatCompletionParameters`** / **`AudioSpeechParameters`**: typed requests,
//!   validated before anything is sent.
//! - **`ChatCompletionObject`** / **`ChatCompletionChunkObject`**: decoded responses
//!   where every field is optional.
//! - **`EventStream`**: a lazy stream of decoded chunks driven by the SSE frame decoder.
//!
//! ## Example
//! ```no_run
//! use openai_service::client::Client;
//! use openai_service::options::{BackendConfiguration, TransportOptions};
//! use openai_service::params::{ChatCompletionParameters, ChatMessage};
//! use openai_service::providers::OpenAiClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BackendConfiguration::direct("your-api-key");
//!     let client = OpenAiClient::new(config, TransportOptions::default())?;
//!
//!     let parameters = ChatCompletionParameters::new("gpt-4o", ChatMessage::user("Hello!"))
//!         .with_temperature(0.7);
//!
//!     let response = client.chat(&parameters).await?;
//!     println!("{:?}", response.content());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod client;
pub mod http;
pub mod model;
pub mod options;
pub mod params;
pub mod providers;
pub mod scalar;
pub mod sse;

// Re-exports for convenience
pub use client::{Client, ClientError};
pub use model::{AudioSpeechObject, ChatCompletionChunkObject, ChatCompletionObject};
pub use options::{BackendConfiguration, TransportOptions};
pub use params::{AudioSpeechParameters, ChatCompletionParameters, ChatMessage};
pub use providers::OpenAiClient;
pub use scalar::IntOrStringValue;
pub use sse::EventStream;
