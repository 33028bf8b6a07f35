//! `crayon`: command line tooling for coloring canvas progress files.
//!
//! Composites a saved progress record over its artwork, renders preview
//! thumbnails, inspects and edits action logs, and moves records to and
//! from a progress server.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Coloring canvas tooling.
#[derive(Debug, Parser)]
#[command(name = "crayon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay the fills of a progress file over its artwork and write a PNG.
    Composite {
        #[command(flatten)]
        render: RenderArgs,
        /// Output PNG path.
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Render the preview thumbnail a save would upload.
    Preview {
        #[command(flatten)]
        render: RenderArgs,
        /// Longest thumbnail edge in pixels.
        #[arg(long, env = "CRAYON_PREVIEW_EDGE", default_value_t = 256)]
        max_edge: u32,
        /// Output PNG path.
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Summarize a progress file.
    Inspect {
        /// Progress JSON file.
        progress: PathBuf,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Undo and then redo actions in a progress file.
    History {
        /// Progress JSON file.
        progress: PathBuf,
        /// Actions to undo.
        #[arg(long, default_value_t = 1)]
        undo: usize,
        /// Undone actions to redo afterwards.
        #[arg(long, default_value_t = 0)]
        redo: usize,
        /// Output path; defaults to rewriting the input.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Download a progress record from the server.
    Pull {
        #[command(flatten)]
        remote: RemoteArgs,
        /// Output JSON path.
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Upload a progress file to the server.
    Push {
        #[command(flatten)]
        remote: RemoteArgs,
        /// Progress JSON file; updated with the stored version on success.
        progress: PathBuf,
        /// Overwrite even if the server has a newer version.
        #[arg(long)]
        force: bool,
    },
}

/// Inputs for compositing.
#[derive(Debug, Clone, Args)]
struct RenderArgs {
    /// Line art: an SVG file or an encoded raster image.
    #[arg(short, long)]
    artwork: PathBuf,
    /// Progress JSON file.
    #[arg(short, long)]
    progress: PathBuf,
    /// Canvas width; defaults to the recorded width.
    #[arg(long)]
    width: Option<u32>,
    /// Canvas height; defaults to the recorded height.
    #[arg(long)]
    height: Option<u32>,
    /// Flood fill color tolerance (0-255).
    #[arg(long, env = "CRAYON_FILL_TOLERANCE")]
    tolerance: Option<u8>,
}

/// Progress server location and record identity.
#[derive(Debug, Clone, Args)]
struct RemoteArgs {
    /// Progress server base URL.
    #[arg(long, env = "CRAYON_SERVER_URL")]
    server: String,
    /// Account id.
    #[arg(long)]
    user: String,
    /// Child profile id.
    #[arg(long)]
    profile: Option<String>,
    /// Coloring image id.
    #[arg(long)]
    image: String,
}

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,crayon=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,crayon=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Composite { render, out } => {
            let report = commands::composite(&render).await?;
            commands::write_png(&report.buffer, &out).await?;
            println!(
                "{}: {} fills applied, {} unchanged, {} skipped",
                out.display(),
                report.applied,
                report.unchanged,
                report.skipped.len()
            );
        }
        Command::Preview {
            render,
            max_edge,
            out,
        } => {
            let preview = commands::preview(&render, max_edge).await?;
            tokio::fs::write(&out, &preview.bytes).await?;
            println!("{}: {}x{}", out.display(), preview.width, preview.height);
        }
        Command::Inspect { progress, json } => {
            let record = commands::read_progress(&progress).await?;
            let summary = commands::ProgressSummary::of(&record);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
            } else {
                print!("{summary}");
            }
        }
        Command::History {
            progress,
            undo,
            redo,
            out,
        } => {
            let record = commands::read_progress(&progress).await?;
            let (edited, undone, redone) = commands::edit_history(&record, undo, redo);
            let out = out.unwrap_or(progress);
            commands::write_progress(&edited, &out).await?;
            println!(
                "{}: undid {undone}, redid {redone}, {} actions remain",
                out.display(),
                edited.actions.len()
            );
        }
        Command::Pull { remote, out } => {
            let record = commands::pull(&remote).await?;
            commands::write_progress(&record, &out).await?;
            println!("{}: version {}", out.display(), record.version);
        }
        Command::Push {
            remote,
            progress,
            force,
        } => {
            let record = commands::read_progress(&progress).await?;
            let stored = commands::push(&remote, &record, force).await?;
            commands::write_progress(&stored, &progress).await?;
            println!("Stored as version {}", stored.version);
        }
    }

    Ok(())
}
