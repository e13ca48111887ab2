//! `sasfit`: serves the fitting operations as JSON lines on stdin/stdout.
//!
//! Logs go to stderr; set `RUST_LOG` to change the level (default `info`).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sasfit_rs::config::Config;
use sasfit_rs::context::Context;
use sasfit_rs::service;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    info!(version = sasfit_rs::VERSION, ?config, "starting sasfit");
    let context = Arc::new(Context::new(config));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received; cancelling running fits");
                shutdown.cancel();
            }
        });
    }

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(reply) = rx.recv().await {
            if let Err(e) = async {
                stdout.write_all(reply.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await
            }
            .await
            {
                error!(error = %e, "could not write reply");
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        // Requests run concurrently; each fit is cancelled on shutdown
        let context = Arc::clone(&context);
        let tx = tx.clone();
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            let reply = service::handle_line(&context, &line, cancel).await;
            if tx.send(reply).await.is_err() {
                error!("reply channel closed");
            }
        });
    }

    drop(tx);
    writer.await?;
    info!("stdin closed; exiting");
    Ok(())
}
