use gemini_relay::{CallRequest, Executor, HttpTransport, RetryPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/status/503".to_owned());

    let executor = Executor::new(
        HttpTransport::new(),
        RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 100,
            attempt_timeout_ms: 2_000,
            jitter_ms: 50,
        },
    )?;

    let request = CallRequest::json(url, &serde_json::json!({ "ping": true }))?;
    match executor.execute(&request).await {
        Ok(response) => println!("success {}: {}", response.status, response.body),
        Err(err) => eprintln!("{:?} ({}): {err}", err.kind(), err.status_code()),
    }

    Ok(())
}
