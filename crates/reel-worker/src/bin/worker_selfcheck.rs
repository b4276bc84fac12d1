use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use reel_media::{check_ffmpeg, check_ffprobe, BackgroundCatalog, FfmpegRunner, HardwareCapability};
use reel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_ffmpeg()?;
    ensure_env_present(&[
        "DATABASE_URL",
        "SCRIPT_API_KEY",
        "TTS_API_BASE_URL",
        "R2_ENDPOINT_URL",
        "R2_ACCESS_KEY_ID",
        "R2_SECRET_ACCESS_KEY",
        "R2_BUCKET_NAME",
    ])?;

    let hardware = HardwareCapability::new(&config.vaapi_device, Arc::new(FfmpegRunner::new()))
        .with_timeout(config.hw_selftest_timeout);
    let encoder = if hardware.is_available().await {
        "vaapi"
    } else {
        "libx264"
    };
    println!(
        "worker-selfcheck: encoder={} device={}",
        encoder,
        config.vaapi_device.display()
    );

    let inventory = BackgroundCatalog::new(&config.backgrounds_dir).inventory().await?;
    if inventory.is_empty() {
        println!(
            "worker-selfcheck: warning: no background clips under {}",
            config.backgrounds_dir.display()
        );
    }
    for entry in &inventory {
        println!(
            "worker-selfcheck: backgrounds {}/{}: {} clips",
            entry.category, entry.duration, entry.clips
        );
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_ffmpeg() -> anyhow::Result<()> {
    check_ffmpeg()?;
    check_ffprobe()?;

    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffmpeg -version failed: {:?}",
            output.status
        ));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
