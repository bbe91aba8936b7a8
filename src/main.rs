use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing_subscriber::EnvFilter;

use camdiff::analytics::AnalyticsError;
use camdiff::camera::{FrameGrabber, FrameSlot};
use camdiff::config::{Config, ConfigError};
use camdiff::session::Session;
use camdiff::storage::ArtifactStore;
use camdiff::trigger::{self, Command};

const USAGE: &str = "usage: camdiff [config.toml]\n       camdiff compare <reference> <current> [config.toml]";

#[derive(Debug, Clone, Copy)]
enum Job {
    Trigger(Command),
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("camdiff=debug".parse()?))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("compare") => run_compare(&args[1..]),
        Some("-h") | Some("--help") => {
            eprintln!("{USAGE}");
            Ok(())
        }
        path => run_daemon(load_config(path)?).await,
    }
}

fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None if Path::new("config.toml").exists() => Config::load(),
        None => {
            tracing::info!("no config.toml found, using defaults");
            Ok(Config::default())
        }
    }
}

fn read_image(path: &str) -> Result<Mat, AnalyticsError> {
    let image = imgcodecs::imread(path, imgcodecs::IMREAD_COLOR)?;
    if image.empty() {
        return Err(AnalyticsError::NoFrame(format!("cannot read image {path}")));
    }
    Ok(image)
}

/// One offline comparison between two image files.
fn run_compare(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(reference_path), Some(current_path)) = (args.first(), args.get(1)) else {
        eprintln!("{USAGE}");
        return Err("missing image paths".into());
    };
    let config = load_config(args.get(2).map(String::as_str))?;

    let mut session = Session::from_config(&config);
    let baseline = session.set_reference(&read_image(reference_path)?)?;
    let comparison = session.compare(&read_image(current_path)?)?;

    tracing::info!(
        baseline,
        band = %comparison.score.band,
        color = comparison.score.band.color_hex(),
        diagnostic = %comparison.score.diagnostic_text,
        "compared {} against {}",
        current_path,
        reference_path
    );
    println!("{}", trigger::format_score(comparison.score.severity));

    if config.storage.enabled {
        if let Some(reference) = session.reference() {
            let store = ArtifactStore::new(&config.storage.output_dir, &config.camera.id)?;
            store.save(&reference.image, &comparison, config.compare)?;
        }
    }
    Ok(())
}

async fn run_daemon(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let camera_id = config.camera.id.clone();
    let slot = FrameSlot::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let grabber = FrameGrabber::new(&config.camera, slot.clone());
    let grab_shutdown = Arc::clone(&shutdown);
    let grab_camera = camera_id.clone();
    let capture_handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = grabber.run(&grab_shutdown) {
            tracing::error!(camera = %grab_camera, error = %e, "capture stopped");
        }
    });

    // capacity 1: one job may wait while another runs, further triggers are rejected
    let (tx, rx) = mpsc::channel::<Job>(1);
    let worker = tokio::task::spawn_blocking(move || run_worker(config, slot, rx));

    tracing::info!(camera = %camera_id, "waiting for triggers on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => dispatch(&tx, line.trim()),
                Ok(None) => {
                    tracing::info!("trigger input closed");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read trigger input");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    drop(tx);
    shutdown.store(true, Ordering::Relaxed);
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "worker task failed");
    }
    if let Err(e) = capture_handle.await {
        tracing::error!(camera = %camera_id, error = %e, "capture task failed");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn dispatch(tx: &mpsc::Sender<Job>, line: &str) {
    if line.is_empty() {
        return;
    }
    let job = if line.eq_ignore_ascii_case("reset") {
        Job::Reset
    } else {
        match trigger::decode_command(line.as_bytes()) {
            Some(command) => Job::Trigger(command),
            None => {
                tracing::warn!(payload = %line, "unparseable trigger payload");
                return;
            }
        }
    };

    match tx.try_send(job) {
        Ok(()) => tracing::debug!(?job, "job queued"),
        Err(TrySendError::Full(job)) => {
            tracing::warn!(?job, "comparison in progress, trigger rejected")
        }
        Err(TrySendError::Closed(_)) => tracing::warn!("worker stopped, trigger dropped"),
    }
}

/// Sole owner of the session. Jobs run one at a time in arrival order.
fn run_worker(config: Config, slot: FrameSlot, mut rx: mpsc::Receiver<Job>) {
    let mut session = Session::from_config(&config);
    let store = if config.storage.enabled {
        match ArtifactStore::new(&config.storage.output_dir, &config.camera.id) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::error!(error = %e, "artifact storage disabled");
                None
            }
        }
    } else {
        None
    };

    while let Some(job) = rx.blocking_recv() {
        if let Err(e) = run_job(&mut session, store.as_ref(), &slot, &config, job) {
            tracing::warn!(?job, error = %e, "job failed, session unchanged");
        }
    }
}

fn run_job(
    session: &mut Session,
    store: Option<&ArtifactStore>,
    slot: &FrameSlot,
    config: &Config,
    job: Job,
) -> Result<(), AnalyticsError> {
    let command = match job {
        Job::Reset => {
            session.reset();
            return Ok(());
        }
        Job::Trigger(command) => command,
    };

    let frame = slot
        .latest()
        .ok_or_else(|| AnalyticsError::NoFrame("no frame captured yet".into()))?;

    match command {
        Command::CaptureReference => {
            session.set_reference(&frame)?;
        }
        Command::Compare => {
            let comparison = session.compare(&frame)?;
            println!("{}", trigger::format_score(comparison.score.severity));

            if let (Some(store), Some(reference)) = (store, session.reference()) {
                if let Err(e) = store.save(&reference.image, &comparison, config.compare) {
                    tracing::error!(error = %e, "failed to save artifacts");
                }
            }
        }
    }
    Ok(())
}
