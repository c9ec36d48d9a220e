use gemini_relay::{RelayConfig, RelayHandler};
use reqwest::Method;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env()?;
    let handler = RelayHandler::from_config(config)?;

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Explain exponential backoff in one sentence.".to_owned());
    let body = serde_json::json!({
        "prompt": prompt,
        "systemInstruction": "You are a concise assistant.",
        "useSearch": false,
    });

    let response = handler
        .handle(&Method::POST, body.to_string().as_bytes())
        .await;

    println!("status: {}", response.status);
    println!("{}", response.body);

    Ok(())
}
