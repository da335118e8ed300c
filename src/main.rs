use anyhow::{Context, Result};
use clap::Parser;
use practice_stream::audio::{AudioBackendConfig, AudioBackendFactory, AudioSource};
use practice_stream::{
    create_router, AppState, Config, FsSliceStore, SessionEvent, StartOptions,
    StreamingController, StreamingSettings, WavMicrophone, WsTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "practice-stream")]
#[command(about = "Stream practice audio to the analysis backend in fixed-length frames")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/practice-stream")]
    config: String,

    /// WAV file to stream instead of silence
    #[arg(short, long)]
    wav: Option<String>,

    /// Recording ID (generated when omitted)
    #[arg(short, long)]
    recording_id: Option<String>,

    /// Metronome count-in beats to discard before the first frame
    #[arg(short, long, default_value = "0")]
    beats: u32,

    /// Count-in tempo
    #[arg(long, default_value = "60")]
    bpm: f64,

    /// Seconds to stream (until Ctrl-C when omitted)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Run the local control API instead of a one-shot session
    #[arg(long)]
    serve: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Practice Stream v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", cfg.server.base_url);

    let controller = Arc::new(build_controller(&cfg, args.wav.as_deref())?);

    if args.serve {
        serve(&cfg, controller).await
    } else {
        stream_once(&args, controller).await
    }
}

fn build_controller(cfg: &Config, wav: Option<&str>) -> Result<StreamingController> {
    let source = match wav {
        Some(path) => AudioSource::File(shellexpand::tilde(path).into_owned()),
        None => AudioSource::Silence,
    };
    info!("Audio source: {:?}", source);

    let backend_config = AudioBackendConfig {
        target_sample_rate: cfg.recording.sample_rate,
        target_channels: cfg.recording.channels,
        ..AudioBackendConfig::default()
    };
    let backend = AudioBackendFactory::create(source, backend_config)?;

    let slice_dir = PathBuf::from(shellexpand::tilde(&cfg.recording.slice_dir).as_ref());
    let microphone = WavMicrophone::new(
        backend,
        slice_dir,
        cfg.recording.sample_rate,
        cfg.recording.channels,
    )?;

    Ok(StreamingController::new(
        StreamingSettings::from_config(cfg),
        Arc::new(WsTransport::new()),
        Arc::new(microphone),
        Arc::new(FsSliceStore::new()),
    ))
}

async fn stream_once(args: &Args, controller: Arc<StreamingController>) -> Result<()> {
    let recording_id = args
        .recording_id
        .clone()
        .unwrap_or_else(|| format!("rec-{}", uuid::Uuid::new_v4()));

    let reporter = tokio::spawn(report_events(controller.subscribe()));

    let options = StartOptions::new(recording_id).with_countdown(args.beats, args.bpm);
    controller
        .start(options)
        .await
        .context("Failed to start streaming")?;

    match args.duration {
        Some(secs) => {
            info!("Streaming for {} seconds", secs);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            info!("Streaming until Ctrl-C");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
        }
    }

    controller.stop().await?;
    reporter.abort();

    let stats = controller.stats();
    info!(
        "Sent {} frames ({} resent, {} count-in slices discarded, {} tick failures)",
        stats.frames_sent, stats.frames_resent, stats.countdown_slices, stats.tick_failures
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

async fn serve(cfg: &Config, controller: Arc<StreamingController>) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Control API listening on http://{}", addr);

    let app = create_router(AppState::new(Arc::clone(&controller)));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    controller.stop().await?;
    Ok(())
}

async fn report_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::BoundaryReached) => info!("Count-in finished"),
            Ok(SessionEvent::StartFailed { reason }) => warn!("Start failed: {}", reason),
            Ok(SessionEvent::ConnectionLost { reason }) => {
                warn!("Connection lost: {}", reason.unwrap_or_default())
            }
            Ok(event) => debug!("{:?}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Event reporter skipped {} events", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
