use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use loqa_capture::{create_router, AppState, AudioFile, CaptureEvent, CaptureOrchestrator, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loqa-capture", version, about = "Audio capture orchestrator")]
struct Cli {
    /// Config file (extension optional, missing file means defaults)
    #[arg(long, default_value = "config/loqa-capture")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve,
    /// Record for a fixed time and print the file path
    Record {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// List input devices
    Devices,
    /// Show the detected capture backend
    Backend,
    /// Persist a preferred device id ("auto" to clear)
    Prefer { device: String },
    /// Show the preferred device id
    Preferred,
}

/// `RUST_LOG` directives, `info` when unset or invalid
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Capture v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let orchestrator = Arc::new(CaptureOrchestrator::from_config(&cfg).await?);

    match cli.command {
        Command::Serve => serve(&cfg, orchestrator).await,
        Command::Record { seconds } => record(&orchestrator, seconds).await,
        Command::Devices => {
            let devices = orchestrator.list_available_devices().await;
            if devices.is_empty() {
                println!("No input devices found");
            }
            for device in devices {
                println!("{}\t{}", device.id, device.name);
            }
            Ok(())
        }
        Command::Backend => {
            let backend = orchestrator.current_backend().await?;
            println!("{}", backend);
            Ok(())
        }
        Command::Prefer { device } => orchestrator.set_preferred_device(&device),
        Command::Preferred => {
            match orchestrator.get_preferred_device() {
                Some(device) => println!("{}", device),
                None => println!("auto"),
            }
            Ok(())
        }
    }
}

async fn serve(cfg: &Config, orchestrator: Arc<CaptureOrchestrator>) -> Result<()> {
    let app = create_router(AppState::new(orchestrator));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);

    info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}

async fn record(orchestrator: &CaptureOrchestrator, seconds: u64) -> Result<()> {
    let mut events = orchestrator.subscribe();
    if !orchestrator.start().await {
        bail!("A recording session is already active");
    }

    let stop_after = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(stop_after);
    let mut stop_sent = false;

    loop {
        tokio::select! {
            _ = &mut stop_after, if !stop_sent => {
                stop_sent = true;
                orchestrator.stop().await;
            }
            event = events.recv() => match event {
                Ok(CaptureEvent::Started { backend, output_path, .. }) => {
                    info!("Recording with {} to {}", backend, output_path.display());
                }
                Ok(CaptureEvent::AudioData { .. }) => {}
                Ok(CaptureEvent::Finished { file_path, .. }) => {
                    println!("{}", file_path.display());
                    if file_path.extension().is_some_and(|ext| ext == "wav") {
                        match AudioFile::open(&file_path) {
                            Ok(audio) => println!("Duration: {:.1} seconds", audio.duration_seconds),
                            Err(e) => warn!("Could not inspect recording: {:#}", e),
                        }
                    }
                    return Ok(());
                }
                Ok(CaptureEvent::Error { error, .. }) => bail!("Recording failed: {}", error),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} capture events", skipped),
                Err(RecvError::Closed) => bail!("Capture event stream closed"),
            },
        }
    }
}
