use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

mod args;

use args::Args;
use rusty_gaze::{
    EstimatorConfig, EyePatch, EyePatches, GazeEstimator, GazeEvent, GazeRegressor, InlineEstimator, Sample,
    SampleKind, ScreenPoint,
};

/// One line of a recorded session. Image paths are relative to the session file.
#[derive(Debug, Deserialize)]
struct RecordedEvent {
    kind: SampleKind,
    screen: ScreenPoint,
    left: Option<PathBuf>,
    right: Option<PathBuf>,
}

const TRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rusty_gaze=info".into()),
        )
        .init();
}

fn load_patch(base: &Path, rel: &Path) -> Result<EyePatch> {
    let path = base.join(rel);
    let img = image::open(&path).with_context(|| format!("Failed to open eye patch {}", path.display()))?;
    Ok(EyePatch::from_dynamic(&img))
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = EstimatorConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let mut regressor: Box<dyn GazeRegressor> = if args.inline {
        Box::new(InlineEstimator::new(config)?)
    } else {
        Box::new(GazeEstimator::new(config)?)
    };
    println!("Active Regressor: {}", regressor.name());

    if let Some(path) = &args.samples {
        let file = File::open(path).with_context(|| format!("Failed to open samples {}", path.display()))?;
        let samples: Vec<Sample> = serde_json::from_reader(file)?;
        regressor.add_samples(&samples)?;
        println!("Loaded {} samples from {}", samples.len(), path.display());
    }

    let content = fs::read_to_string(&args.session)
        .with_context(|| format!("Failed to read session {}", args.session.display()))?;
    let events: Vec<RecordedEvent> = serde_json::from_str(&content)?;
    let base = args.session.parent().unwrap_or_else(|| Path::new("."));
    info!("replaying {} events from {}", events.len(), args.session.display());

    let mut total_error = 0.0;
    let mut scored = 0usize;

    for (i, rec) in events.iter().enumerate() {
        if rec.left.is_none() && rec.right.is_none() {
            println!("[{:>4}] tracking lost, resetting smoother", i);
            regressor.reset_smoothing();
            continue;
        }

        let eyes = EyePatches {
            left: rec.left.as_deref().map(|p| load_patch(base, p)).transpose()?,
            right: rec.right.as_deref().map(|p| load_patch(base, p)).transpose()?,
        };

        // Predict before learning from this event so the error is honest
        match regressor.predict(&eyes)? {
            Some(pred) => {
                let err = pred.smoothed.distance(&rec.screen);
                total_error += err;
                scored += 1;
                println!(
                    "[{:>4}] {:?} target ({:.0}, {:.0}) raw ({:.0}, {:.0}) smoothed ({:.0}, {:.0}) err {:.1}px",
                    i, rec.kind, rec.screen.x, rec.screen.y, pred.raw.x, pred.raw.y, pred.smoothed.x, pred.smoothed.y, err
                );
            }
            None => println!("[{:>4}] {:?} target ({:.0}, {:.0}) no model yet", i, rec.kind, rec.screen.x, rec.screen.y),
        }

        let event = GazeEvent { kind: rec.kind, screen: rec.screen, eyes: Some(eyes) };
        if !regressor.add_event(&event)? {
            println!("[{:>4}] dropped: missing eye data", i);
            continue;
        }

        // Calibration clicks are sparse; refit right away so the next prediction uses them
        if rec.kind == SampleKind::Click {
            regressor.train_now(TRAIN_TIMEOUT)?;
        }
    }

    if scored > 0 {
        println!("Mean error over {} predictions: {:.1}px", scored, total_error / scored as f64);
    }

    if let Some(path) = &args.export {
        let samples = regressor.samples()?;
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &samples)?;
        println!("Exported {} samples to {}", samples.len(), path.display());
    }

    Ok(())
}
