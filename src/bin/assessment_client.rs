// src/bin/assessment_client.rs

//! Headless test-taker: starts a session and lets every question run out.
//! Each line typed on stdin is saved as the current answer and submits the
//! question early; an empty line just submits.

use assessment_backend::client::{ClientCommand, HttpSessionApi, Reconciler};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let base_url =
        std::env::var("ASSESSMENT_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::new(&rust_log))
        .with(fmt::layer().with_target(false))
        .init();

    let reconciler = match Reconciler::begin(HttpSessionApi::new(base_url.clone())).await {
        Ok(reconciler) => reconciler,
        Err(e) => {
            tracing::error!("Could not start a session at {}: {}", base_url, e);
            std::process::exit(1);
        }
    };

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let answer = line.trim();
            if !answer.is_empty()
                && tx
                    .send(ClientCommand::Answer(answer.to_string()))
                    .await
                    .is_err()
            {
                break;
            }
            if tx.send(ClientCommand::ForceNext).await.is_err() {
                break;
            }
        }
    });

    match reconciler.run(rx).await {
        Ok(summary) => tracing::info!(
            "Assessment complete: {} submissions ({} automatic)",
            summary.advances,
            summary.auto_submitted
        ),
        Err(e) => {
            tracing::error!("Assessment aborted, restart required: {}", e);
            std::process::exit(1);
        }
    }
}
