//! Cut background clips into the catalog from a local file or a video URL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use reel_media::ingest::DEFAULT_CLIP_COUNT;
use reel_media::{download_source, BackgroundCatalog, CatalogIngest, FfmpegRunner, HardwareCapability, DEFAULT_VAAPI_DEVICE};
use reel_models::{BackgroundCategory, TargetDuration};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reel-catalog", about = "Add background clips to the catalog")]
struct Args {
    /// Local video file or http(s) URL
    source: String,

    /// Background category (directory name)
    #[arg(long)]
    category: String,

    /// Clip length in seconds: 30 or 60
    #[arg(long, default_value_t = 30)]
    duration: u32,

    /// Number of clips to cut
    #[arg(long, default_value_t = DEFAULT_CLIP_COUNT)]
    count: usize,

    /// Catalog root
    #[arg(long, env = "BACKGROUND_VIDEOS_DIR", default_value = "./videos")]
    backgrounds_dir: PathBuf,

    /// VAAPI render node
    #[arg(long, env = "VAAPI_DEVICE", default_value = DEFAULT_VAAPI_DEVICE)]
    vaapi_device: PathBuf,

    /// Download limit in seconds
    #[arg(long, default_value_t = 900)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reel=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let category = BackgroundCategory::parse(&args.category)?;
    let duration = TargetDuration::try_from(args.duration)?;

    // Keeps a downloaded source alive until the clips are cut
    let scratch = tempfile::TempDir::new().context("creating download dir")?;
    let source = if args.source.starts_with("http://") || args.source.starts_with("https://") {
        download_source(&args.source, scratch.path(), Duration::from_secs(args.download_timeout)).await?
    } else {
        let path = PathBuf::from(&args.source);
        anyhow::ensure!(path.is_file(), "source file not found: {}", path.display());
        path
    };

    let backend = Arc::new(FfmpegRunner::new());
    let hardware = Arc::new(HardwareCapability::new(&args.vaapi_device, backend.clone()));
    let ingest = CatalogIngest::new(BackgroundCatalog::new(&args.backgrounds_dir), hardware, backend);

    let written = ingest.ingest(&source, &category, duration, args.count).await?;

    let summary = json!({
        "category": category.as_str(),
        "duration": duration.as_secs(),
        "count": written.len(),
        "files": written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
