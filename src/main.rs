use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use panopto_dl::resolver::{LinkResolver, PanoptoResolver, SourceResolver, StaticResolver};
use panopto_dl::types::DEFAULT_CRF;
use panopto_dl::{
    Assembler, CliEncoder, Codec, Config, Event, HttpFetcher, MergeOptions, Pipeline, Result,
    cancel_on_signal, session,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Download every recording in a Panopto folder and merge them into one video
#[derive(Parser, Debug)]
#[command(
    name = "panopto-dl",
    version,
    about = "Download a Panopto folder as one merged video",
    long_about = "Resolves every session in a Panopto folder, downloads the recordings\n\
                  concurrently and concatenates them, in folder order, into a single\n\
                  video with ffmpeg. Intermediate downloads are removed afterwards\n\
                  unless --keep-originals is given."
)]
struct CliArgs {
    /// Folder URL (the page URL with `#folderID=...`)
    #[arg(required_unless_present = "urls")]
    folder_url: Option<String>,

    /// Path of the merged video
    #[arg(short, long, default_value = "output.mp4")]
    output: PathBuf,

    /// Constant rate factor, 0 (lossless) to 51 (worst)
    #[arg(long, default_value_t = DEFAULT_CRF, value_parser = clap::value_parser!(u8).range(0..=51))]
    crf: u8,

    /// Encode with H.265 (smaller files, slower, less compatible)
    #[arg(long)]
    x265: bool,

    /// Keep the downloaded recordings after merging
    #[arg(long)]
    keep_originals: bool,

    /// Merge video streams only
    #[arg(long)]
    no_audio: bool,

    /// Maximum number of simultaneous downloads
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Directory for per-run download workspaces
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Browser-exported cookie file (JSON) for the authenticated session
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Path to the ffmpeg binary (searched in PATH by default)
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scrape video links from the folder page instead of asking the session service
    #[arg(long, conflicts_with = "urls")]
    links: bool,

    /// CSS class marking video links (with --links)
    #[arg(long, requires = "links")]
    link_class: Option<String>,

    /// Merge the URLs listed in FILE (one per line) instead of resolving a folder
    #[arg(long, value_name = "FILE")]
    urls: Option<PathBuf>,

    /// Retries per download for transient failures
    #[arg(long)]
    retries: Option<u32>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl CliArgs {
    fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            output_path: self.output.clone(),
            codec: if self.x265 {
                Codec::HighCompression
            } else {
                Codec::Compatible
            },
            crf: self.crf,
            keep_originals: self.keep_originals,
            include_audio: !self.no_audio,
        }
    }

    /// Configuration file (or defaults) with command-line overrides applied
    async fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path).await?,
            None => Config::default(),
        };

        if let Some(concurrency) = self.concurrency {
            config.download.max_concurrent_fetches = concurrency;
        }
        if let Some(workspace) = &self.workspace {
            config.download.workspace_root = workspace.clone();
        }
        if let Some(cookies) = &self.cookies {
            config.session.cookies_file = Some(cookies.clone());
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.tools.ffmpeg_path = Some(ffmpeg.clone());
        }
        if let Some(class) = &self.link_class {
            config.resolver.link_class = class.clone();
        }
        if let Some(retries) = self.retries {
            config.retry.max_retries = retries;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    let config = args.config().await?;
    let client = session::build_client(&config).await?;

    let resolver: Arc<dyn SourceResolver> = if let Some(path) = &args.urls {
        Arc::new(StaticResolver::from_file(path).await?)
    } else if args.links {
        Arc::new(LinkResolver::new(client.clone(), config.resolver.clone()))
    } else {
        Arc::new(PanoptoResolver::new(client.clone(), config.resolver.clone()))
    };
    let encoder = CliEncoder::from_config(&config.tools)?;
    debug!(ffmpeg = %encoder.binary_path().display(), "Using encoder");

    let pipeline = Pipeline::new(
        config.clone(),
        resolver,
        Arc::new(HttpFetcher::new(client, &config)),
        Assembler::new(Arc::new(encoder)),
    )?;

    tokio::spawn(render_events(pipeline.subscribe()));
    tokio::spawn(cancel_on_signal(pipeline.cancel_token()));

    let folder = match (&args.folder_url, &args.urls) {
        (Some(url), _) => url.clone(),
        (None, Some(path)) => path.display().to_string(),
        (None, None) => String::new(),
    };

    let outcome = pipeline.run(folder.into(), args.merge_options()).await?;

    if let Some(workspace) = &outcome.workspace {
        info!(workspace = %workspace.display(), "Downloaded recordings kept");
    }
    if !outcome.warnings.is_empty() {
        warn!(
            count = outcome.warnings.len(),
            "Some intermediate files could not be removed"
        );
    }
    println!("{}", outcome.output.display());
    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the level picked by `--verbose`
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        eprintln!("Failed to initialise logging: {e}");
    }
}

/// Turn run events into progress log lines
async fn render_events(mut events: broadcast::Receiver<Event>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Progress output fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            Event::StageChanged { stage, .. } => debug!(%stage, "Stage changed"),
            Event::Resolved { count, .. } => info!("Found {count} videos"),
            Event::FetchStarted { position, url, .. } => {
                debug!(position, %url, "Downloading");
            }
            Event::FetchComplete {
                position,
                completed,
                total,
                size_bytes,
                ..
            } => info!(
                position,
                size_bytes = size_bytes.unwrap_or(0),
                "Downloaded {completed}/{total}"
            ),
            Event::MergeComplete { output, .. } => {
                info!(output = %output.display(), "Merged videos");
            }
            Event::CleanupWarning { warning, .. } => warn!("{warning}"),
            Event::Succeeded { output, .. } => info!(output = %output.display(), "Done"),
            Event::Failed { stage, error, .. } => error!(%stage, "Run failed: {error}"),
        }
    }
}
