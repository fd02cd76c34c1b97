//! Streaming chat completion, printing deltas as they arrive.
//!
//! Run with:
//! ```bash
//! export OPENAI_API_KEY="your-api-key"
//! cargo run --example chat_streaming
//! ```

use std::io::Write;
use std::time::Duration;

use futures::StreamExt;
use openai_service::client::Client;
use openai_service::options::{BackendConfiguration, TransportOptions};
use openai_service::params::{ChatCompletionParameters, ChatMessage, StreamOptions};
use openai_service::providers::OpenAiClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = BackendConfiguration::from_env()?;
    let transport_options = TransportOptions::default().with_timeout(Duration::from_secs(60));
    let client = OpenAiClient::new(config, transport_options)?;

    let mut parameters = ChatCompletionParameters::new(
        "gpt-4o-mini",
        ChatMessage::user("Write a haiku about Rust programming."),
    )
    .with_temperature(0.9);
    parameters.stream_options = Some(StreamOptions {
        include_usage: Some(true),
    });

    println!("Streaming response...\n");

    let mut stream = client.chat_stream(&parameters).await?;
    print!("Response: ");

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                eprintln!("\nError in stream: {}", e);
                return Err(e.into());
            }
        };

        if let Some(content) = chunk.delta_content() {
            print!("{}", content);
            std::io::stdout().flush()?;
        }
        if let Some(reason) = chunk.choices.first().and_then(|c| c.finish_reason.as_ref()) {
            println!("\n\nFinish reason: {}", reason);
        }
        if let Some(usage) = &chunk.usage {
            println!("\n=== Usage Information ===");
            if let Some(total_tokens) = usage.total_tokens {
                println!("Total tokens: {}", total_tokens);
            }
        }
    }

    Ok(())
}
