//! Chat Stream Demo - send one message and print events as they arrive
//!
//! Run with:
//!   ADMITSTREAM_BASE_URL=http://localhost:8000 \
//!     cargo run --example chat_stream -- "When is the application deadline?"
//!
//! Optional: ADMITSTREAM_CONFIG=client.yaml, ADMITSTREAM_TOKEN=<bearer>,
//! ADMITSTREAM_TIMEOUT_SECS=60, RUST_LOG=admitstream_core=debug

use admitstream_core::config::{load_from_json, load_from_yaml, ClientConfig};
use admitstream_core::{
    CancelSignal, FnHandlers, StreamRequest, StreamState, StreamingResponseConsumer,
};
use anyhow::Context;
use std::io::Write;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<ClientConfig> {
    if let Ok(path) = std::env::var("ADMITSTREAM_CONFIG") {
        let config = if path.ends_with(".json") {
            load_from_json(&path)
        } else {
            load_from_yaml(&path)
        };
        return config.with_context(|| format!("loading {path}"));
    }
    let base_url = std::env::var("ADMITSTREAM_BASE_URL")
        .context("set ADMITSTREAM_BASE_URL or ADMITSTREAM_CONFIG")?;
    Ok(ClientConfig::for_base_url(base_url))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let message = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let config = load_config()?;
    let consumer = StreamingResponseConsumer::new(&config)?;

    let mut request = StreamRequest::new(message, uuid::Uuid::new_v4().to_string());
    if let Ok(token) = std::env::var("ADMITSTREAM_TOKEN") {
        request = request.with_bearer(token);
    }

    let handlers = FnHandlers::new()
        .on_log(|text| eprintln!("  [log] {text}"))
        .on_chunk(|text| {
            print!("{text}");
            let _ = std::io::stdout().flush();
        })
        .on_result(|result| {
            println!();
            for (i, source) in result.sources.iter().enumerate() {
                match result.source_urls.get(i) {
                    Some(url) => println!("  source: {source} <{url}>"),
                    None => println!("  source: {source}"),
                }
            }
            if !result.metadata.timing.is_empty() {
                println!("  total time: {:.2}s", result.total_time());
            }
        })
        .on_error(|error| {
            println!();
            if error.kind == admitstream_core::ErrorKind::RateLimitedGuest {
                eprintln!("Guest limit reached. Sign in to continue: {}", error.message);
            } else {
                eprintln!("Error: {}", error.message);
            }
        });

    let cancel = CancelSignal::new();
    let timeout_secs = std::env::var("ADMITSTREAM_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120);
    cancel.cancel_after(Duration::from_secs(timeout_secs));

    let handle = consumer.start(request, handlers, cancel.clone())?;

    let state = tokio::select! {
        state = handle.wait() => state,
        _ = tokio::signal::ctrl_c() => {
            handle.cancel();
            handle.wait().await
        }
    };

    match state {
        StreamState::Completed => Ok(()),
        StreamState::Cancelled => {
            eprintln!("\nCancelled");
            Ok(())
        }
        StreamState::Errored(kind) => anyhow::bail!("stream failed ({kind})"),
        StreamState::Streaming => unreachable!("wait only returns terminal states"),
    }
}
