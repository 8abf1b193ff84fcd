//! Binary entrypoint for the Spectra frame server.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use spectra_frame_server::config::Configuration;
use spectra_frame_server::processing::pack::preview_image;
use spectra_frame_server::processing::pipeline::{content_hash, render_packed};
use spectra_frame_server::web::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "frame-server", about = "Serves dithered frames to Spectra 6 e-paper panels")]
struct Cli {
    /// Path to YAML config file; built-in defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Render one image to a packed frame and print its hash
    Render {
        image: PathBuf,
        out: PathBuf,
        /// Also write a PNG of what the panel will show
        #[arg(long, value_name = "PNG")]
        preview: Option<PathBuf>,
    },
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("spectra_frame_server={level}").parse()?)
        .add_directive(format!("frame_server={level}").parse()?)
        .add_directive("hyper=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Configuration> {
    let cfg = match path {
        Some(path) => Configuration::from_yaml_file(path)?,
        None => {
            info!("no config file given; using defaults");
            Configuration::default()
        }
    };
    cfg.validated().context("validating configuration")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let cfg = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg),
        Command::Render {
            image,
            out,
            preview,
        } => render(&cfg, &image, &out, preview.as_deref()),
    }
}

fn serve(cfg: Configuration) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(async move {
        if !cfg.image_dir.is_dir() {
            warn!(
                dir = %cfg.image_dir.display(),
                "image directory missing; devices get 404 until it exists"
            );
        }
        let state = AppState::from_config(&cfg);

        let cancel = CancellationToken::new();
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                signal_cancel.cancel();
            }
        });

        web::serve(state, cfg.listen_addr(), cancel).await
    })
}

fn render(cfg: &Configuration, image: &Path, out: &Path, preview: Option<&Path>) -> Result<()> {
    let packed = render_packed(image, &cfg.enhance)
        .with_context(|| format!("failed to render {}", image.display()))?;
    std::fs::write(out, &packed).with_context(|| format!("failed to write {}", out.display()))?;
    if let Some(preview) = preview {
        preview_image(&packed)?
            .save(preview)
            .with_context(|| format!("failed to write preview {}", preview.display()))?;
    }
    println!("{}", content_hash(&packed));
    Ok(())
}
