use anyhow::Result;
use clap::Parser;
use sandbox_engine::{Config, Sandbox};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    info!("Starting sandbox engine");
    info!("  image: {}", config.sandbox_image);
    info!("  persistent container: {}", config.persistent_name);
    info!("  working root: {}", config.working_root);

    let port = config.port;
    let warm_persistent = !config.no_persistent;
    let sandbox = Arc::new(Sandbox::connect(config).await);

    if !sandbox.available() {
        warn!("container engine unreachable; operations will report failure");
    } else if warm_persistent {
        match sandbox.ensure_persistent().await {
            Ok(id) => info!("persistent container ready: {}", id),
            Err(e) => warn!("failed to warm persistent container: {}", e),
        }
    }

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Sandbox server listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((mut stream, addr)) => {
                info!("Connection from {}", addr);
                let sandbox = sandbox.clone();
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};

                    let mut buffer = [0; 1024];
                    match stream.read(&mut buffer).await {
                        Ok(0) => {
                            info!("Connection closed by client");
                        }
                        Ok(n) => {
                            let request = String::from_utf8_lossy(&buffer[..n]);
                            let request_line = request.lines().next().unwrap_or("");
                            info!("Received request: {}", request_line);

                            let path = request_line.split_whitespace().nth(1).unwrap_or("/");

                            let ready = sandbox.available();
                            let response_body = match path {
                                "/health" => r#"{"status":"ok"}"#.to_string(),
                                "/ready" => format!(r#"{{"ready":{}}}"#, ready),
                                _ => r#"{"service":"sandbox-engine"}"#.to_string(),
                            };

                            let response = format!(
                                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                response_body.len(),
                                response_body
                            );

                            if let Err(e) = stream.write_all(response.as_bytes()).await {
                                warn!("Failed to write response: {}", e);
                            }
                            if let Err(e) = stream.flush().await {
                                warn!("Failed to flush response: {}", e);
                            }
                            if let Err(e) = stream.shutdown().await {
                                warn!("Failed to shutdown stream: {}", e);
                            }
                        }
                        Err(e) => {
                            warn!("Failed to read from stream: {}", e);
                        }
                    }
                });
            }
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
            }
        }
    }
}
