//! Echo backend - relays one request through the bridge to a local server.
//!
//! This example demonstrates:
//! - Starting a `RelayServer` on a socket directory
//! - Answering requests with status, headers and a body
//! - Relaying an intercepted request with `RequestBridge`
//!
//! Run with `RUST_LOG=socket_relay=debug` to see the relay log.

use std::time::Duration;

use socket_relay::{
    BackendResponse, InterceptedRequest, RelayConfig, RelayServer, RequestBridge,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dir = tempfile::tempdir()?;
    let config = RelayConfig::builder()
        .socket_dir(dir.path().join("run"))
        .header_timeout(Duration::from_secs(5))
        .build();

    let server = RelayServer::bind(config.clone()).await?;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server.serve_with_shutdown(
        |request| async move {
            let content_type = request
                .header("Content-Type")
                .unwrap_or("application/octet-stream")
                .to_string();
            BackendResponse::new(200)
                .header("Content-Type", content_type)
                .header("X-Echo-Method", request.method.clone())
                .header("X-Echo-Url", request.url.clone())
                .body_bytes(request.body)
        },
        async {
            let _ = stop_rx.await;
        },
    ));

    let bridge = RequestBridge::new(config)?;
    let request = InterceptedRequest::new("POST", "http://localhost:8080/echo")
        .header("Content-Type", "text/plain")
        .referrer("http://localhost:8080/")
        .body("hello from the bridge");

    let response = bridge.relay(&request).await;
    println!("status: {}", response.status_code);
    for (name, value) in &response.headers {
        println!("{}: {}", name, value.values().join(", "));
    }
    let body = response.body.collect().await?;
    println!("body: {}", String::from_utf8_lossy(&body));

    let _ = stop_tx.send(());
    server_task.await??;
    Ok(())
}
