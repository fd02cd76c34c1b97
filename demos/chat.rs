//! Simple chat completion against whichever backend the environment selects.
//!
//! Run with:
//! ```bash
//! export OPENAI_API_KEY="your-api-key"
//! # optional: export OPENAI_BASE_URL="http://localhost:11434"
//! cargo run --example chat
//! ```

use openai_service::client::Client;
use openai_service::options::{BackendConfiguration, TransportOptions};
use openai_service::params::{ChatCompletionParameters, ChatMessage};
use openai_service::providers::OpenAiClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = BackendConfiguration::from_env()?;
    let client = OpenAiClient::new(config, TransportOptions::default())?;

    let parameters = ChatCompletionParameters::new(
        "gpt-4o-mini",
        ChatMessage::user("What is the capital of France? Answer in one word."),
    )
    .with_temperature(0.7)
    .with_max_completion_tokens(100);

    println!("Sending request...");

    let response = client.chat(&parameters).await?;
    println!("\n=== Response ===");
    println!("{}", response.content().unwrap_or("<no content>"));

    if let Some(choice) = response.choices.first() {
        println!("Finish reason: {:?}", choice.finish_reason);
    }
    if let Some(usage) = &response.usage {
        if let Some(prompt_tokens) = usage.prompt_tokens {
            println!("Prompt tokens: {}", prompt_tokens);
        }
        if let Some(completion_tokens) = usage.completion_tokens {
            println!("Completion tokens: {}", completion_tokens);
        }
    }

    // Multi-turn conversation
    println!("\n\n=== Multi-turn conversation ===");

    let conversation = ChatCompletionParameters::new("gpt-4o-mini", ChatMessage::user("My name is Alice."))
        .with_message(ChatMessage::assistant("Hello Alice! Nice to meet you."))
        .with_message(ChatMessage::user("What's my name?"));

    match client.chat(&conversation).await {
        Ok(response) => println!("{}", response.content().unwrap_or("<no content>")),
        Err(e) => eprintln!("Error: {}", e),
    }

    Ok(())
}
