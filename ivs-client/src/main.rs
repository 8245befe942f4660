//! ivs-client - appraise an instrument photo from the command line
//!
//! **Usage:**
//! ```bash
//! ivs-client appraise guitar.jpg
//! ivs-client estimate description.json --no-stream
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ivs_client::progress::{latest_log, render_phase};
use ivs_client::{ApiClient, AppraisalSession, ImageFile, SessionOptions, StreamState};
use ivs_common::{InstrumentDescription, Phase};
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line client for ivs-api
#[derive(Parser, Debug)]
#[command(name = "ivs-client")]
#[command(about = "Estimate the resale value of a used instrument")]
#[command(version)]
struct Args {
    /// Base URL of the valuation service
    #[arg(long, env = "IVS_SERVER_URL", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Use only the synchronous endpoints
    #[arg(long)]
    no_stream: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe a photo, then estimate its price
    Appraise {
        /// Photo of the instrument
        image: PathBuf,
    },
    /// Estimate the price of an existing description
    Estimate {
        /// JSON file holding an InstrumentDescription
        description: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = ApiClient::new(&args.server).context("Failed to build HTTP client")?;
    let options = SessionOptions {
        streaming: !args.no_stream,
        ..SessionOptions::default()
    };
    let session = AppraisalSession::new(Arc::new(client), options);
    let progress = tokio::spawn(print_progress(session.clone()));

    match args.command {
        Command::Appraise { image } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            session.describe(ImageFile::from_bytes(bytes, file_name)).await;
        }
        Command::Estimate { description } => {
            let text = tokio::fs::read_to_string(&description)
                .await
                .with_context(|| format!("Failed to read {}", description.display()))?;
            let description: InstrumentDescription =
                serde_json::from_str(&text).context("Invalid description JSON")?;
            session.estimate(description).await;
        }
    }

    let state = session.settled().await;
    progress.abort();
    report(&state)
}

/// Print a line whenever a phase's rendered status or latest log changes
async fn print_progress(session: AppraisalSession) {
    let mut rx = session.subscribe();
    let mut last: Vec<String> = Vec::new();

    while rx.changed().await.is_ok() {
        let lines: Vec<String> = {
            let state = rx.borrow_and_update();
            [Phase::Vision, Phase::Rag]
                .into_iter()
                .map(|phase| {
                    let view = state.view(phase);
                    match latest_log(view) {
                        Some(code) if view.is_running() => {
                            format!("{} ({code})", render_phase(phase, view))
                        }
                        _ => render_phase(phase, view),
                    }
                })
                .collect()
        };
        for (index, line) in lines.iter().enumerate() {
            if last.get(index) != Some(line) && !line.ends_with("idle") {
                eprintln!("{line}");
            }
        }
        last = lines;
    }
}

fn report(state: &StreamState) -> Result<()> {
    if let Some(error) = &state.error {
        bail!("{error}");
    }
    if let Some(description) = &state.description {
        println!("{}", serde_json::to_string_pretty(description)?);
    }
    match &state.valuation {
        Some(valuation) => println!("{}", serde_json::to_string_pretty(valuation)?),
        None => bail!("No valuation produced"),
    }
    Ok(())
}
