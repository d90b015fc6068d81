use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::EstimatorConfig;
use crate::error::{GazeError, Result};
use crate::regression::{RegressionModel, RegressionTrainer};
use crate::sample_store::SampleStore;
use crate::types::Sample;

/// Messages from the ingestion side to the training worker.
#[derive(Debug)]
pub enum TrainerCommand {
    Sample(Sample),
    /// Run a training cycle now instead of waiting for the next tick, then
    /// reply with the current model (`None` while no click has been seen).
    Flush(Sender<Option<RegressionModel>>),
    /// Reply with the surviving samples, clicks then trail.
    Export(Sender<Vec<Sample>>),
    Shutdown,
}

/// Background refitting of the regression model.
///
/// The worker thread owns its own `SampleStore`. Samples go in over one
/// channel, fitted models come out over another; nothing is shared between the
/// two sides. Dropping the scheduler stops the worker after any in-flight cycle.
pub struct TrainingScheduler {
    tx: Sender<TrainerCommand>,
    rx_model: Receiver<RegressionModel>,
    worker: Option<JoinHandle<()>>,
}

impl TrainingScheduler {
    pub fn spawn(config: &EstimatorConfig) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::channel::<TrainerCommand>();
        let (tx_model, rx_model) = mpsc::channel::<RegressionModel>();

        let worker = TrainingWorker {
            store: SampleStore::new(config.click_capacity, config.trail_capacity),
            trainer: RegressionTrainer::from_config(config),
            interval: Duration::from_millis(config.train_interval_ms),
            needs_training: false,
            latest: None,
        };

        let handle = thread::Builder::new()
            .name("gaze-trainer".to_string())
            .spawn(move || worker.run(rx, tx_model))?;

        Ok(Self {
            tx,
            rx_model,
            worker: Some(handle),
        })
    }

    pub fn submit(&self, sample: Sample) -> Result<()> {
        self.send(TrainerCommand::Sample(sample))
    }

    /// Trains on every sample submitted so far and returns the resulting
    /// model. Returns `Ok(None)` if no model exists yet or the worker did not
    /// answer within `timeout`. Updates published before the reply are stale
    /// and get discarded.
    pub fn flush(&self, timeout: Duration) -> Result<Option<RegressionModel>> {
        let (tx, rx) = mpsc::channel();
        self.send(TrainerCommand::Flush(tx))?;
        let model = match rx.recv_timeout(timeout) {
            Ok(model) => model,
            Err(RecvTimeoutError::Timeout) => {
                warn!("training worker did not answer within {:?}", timeout);
                return Ok(None);
            }
            Err(RecvTimeoutError::Disconnected) => return Err(GazeError::WorkerDisconnected),
        };
        while self.rx_model.try_recv().is_ok() {}
        Ok(model)
    }

    /// Copies the worker's stored samples. Answered in order after any
    /// samples already submitted.
    pub fn export_samples(&self) -> Result<Vec<Sample>> {
        let (tx, rx) = mpsc::channel();
        self.send(TrainerCommand::Export(tx))?;
        rx.recv().map_err(|_| GazeError::WorkerDisconnected)
    }

    /// Drains pending updates and returns the newest, if any arrived.
    pub fn try_latest(&self) -> Option<RegressionModel> {
        let mut latest = None;
        while let Ok(model) = self.rx_model.try_recv() {
            latest = Some(model);
        }
        latest
    }

    pub fn shutdown(self) {
        // Drop does the work
    }

    fn send(&self, cmd: TrainerCommand) -> Result<()> {
        self.tx.send(cmd).map_err(|_| GazeError::WorkerDisconnected)
    }
}

impl Drop for TrainingScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.tx.send(TrainerCommand::Shutdown);
            if handle.join().is_err() {
                warn!("training worker panicked");
            }
        }
    }
}

struct TrainingWorker {
    store: SampleStore,
    trainer: RegressionTrainer,
    interval: Duration,
    needs_training: bool,
    latest: Option<RegressionModel>,
}

impl TrainingWorker {
    fn run(mut self, rx: Receiver<TrainerCommand>, tx_model: Sender<RegressionModel>) {
        info!("training worker started ({} ms period)", self.interval.as_millis());
        let mut next_tick = Instant::now() + self.interval;

        loop {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match rx.recv_timeout(timeout) {
                Ok(TrainerCommand::Sample(sample)) => {
                    match self.store.add_sample(sample) {
                        Ok(()) => self.needs_training = true,
                        Err(e) => warn!("dropping sample: {}", e),
                    }
                }
                Ok(TrainerCommand::Flush(reply)) => {
                    if !self.retrain(&tx_model) {
                        break;
                    }
                    let _ = reply.send(self.latest.clone());
                }
                Ok(TrainerCommand::Export(reply)) => {
                    let _ = reply.send(self.store.samples());
                }
                Ok(TrainerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            // Checked after every message so a steady sample stream cannot starve the tick
            let now = Instant::now();
            if now >= next_tick {
                if !self.retrain(&tx_model) {
                    break;
                }
                next_tick = now + self.interval;
            }
        }
        info!("training worker stopped");
    }

    /// Returns false once nobody is listening for models.
    fn retrain(&mut self, tx_model: &Sender<RegressionModel>) -> bool {
        if !self.needs_training {
            return true;
        }

        let batch = self.store.snapshot();
        match self.trainer.train(&batch) {
            Ok(Some(model)) => {
                self.needs_training = false;
                debug!("publishing model fitted on {} samples", model.sample_count);
                self.latest = Some(model.clone());
                if tx_model.send(model).is_err() {
                    return false;
                }
            }
            // No clicks yet; try again once one arrives
            Ok(None) => {}
            Err(e) => {
                // The same batch would fail the same way; wait for new samples
                warn!("training cycle failed, keeping previous model: {}", e);
                self.needs_training = false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SampleKind, ScreenPoint};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config(interval_ms: u64) -> EstimatorConfig {
        EstimatorConfig {
            train_interval_ms: interval_ms,
            ..Default::default()
        }
    }

    fn click(v: f64, label: f64) -> Sample {
        Sample::new(vec![v; 4], ScreenPoint::new(label, label), SampleKind::Click)
    }

    /// Polls for a published update until `timeout` runs out.
    fn poll_latest(scheduler: &TrainingScheduler, timeout: Duration) -> Option<RegressionModel> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(model) = scheduler.try_latest() {
                return Some(model);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_flush_returns_model() {
        let scheduler = TrainingScheduler::spawn(&config(60_000)).unwrap();
        for _ in 0..3 {
            scheduler.submit(click(1.0, 50.0)).unwrap();
        }

        let model = scheduler.flush(TIMEOUT).unwrap().expect("no model after flush");
        assert_eq!(model.sample_count, 3);
        let p = model.predict(&[1.0; 4]).unwrap();
        assert!((p.x - 50.0).abs() < 1e-3);
        // The published copy was consumed by the flush
        assert!(scheduler.try_latest().is_none());
    }

    #[test]
    fn test_flush_includes_samples_after_tick() {
        let scheduler = TrainingScheduler::spawn(&config(20)).unwrap();
        scheduler.submit(click(1.0, 10.0)).unwrap();
        thread::sleep(Duration::from_millis(200));
        scheduler.submit(click(2.0, 20.0)).unwrap();

        let model = scheduler.flush(TIMEOUT).unwrap().unwrap();
        assert_eq!(model.sample_count, 2);
        assert!(scheduler.try_latest().is_none());
    }

    #[test]
    fn test_idle_flush_answers_immediately() {
        let scheduler = TrainingScheduler::spawn(&config(60_000)).unwrap();
        scheduler.submit(click(1.0, 10.0)).unwrap();
        let first = scheduler.flush(TIMEOUT).unwrap().unwrap();

        let started = Instant::now();
        let again = scheduler.flush(TIMEOUT).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1), "idle flush took {:?}", started.elapsed());
        assert_eq!(again, Some(first));
    }

    #[test]
    fn test_timer_tick_trains_without_flush() {
        let scheduler = TrainingScheduler::spawn(&config(20)).unwrap();
        scheduler.submit(click(2.0, 10.0)).unwrap();
        assert!(poll_latest(&scheduler, TIMEOUT).is_some());
    }

    #[test]
    fn test_idle_tick_is_noop() {
        let scheduler = TrainingScheduler::spawn(&config(10)).unwrap();
        scheduler.submit(click(2.0, 10.0)).unwrap();
        assert!(poll_latest(&scheduler, TIMEOUT).is_some());

        // No new samples: further ticks publish nothing
        assert!(poll_latest(&scheduler, Duration::from_millis(100)).is_none());
    }

    #[test]
    fn test_trail_only_yields_no_model() {
        let scheduler = TrainingScheduler::spawn(&config(60_000)).unwrap();
        let trail = Sample::new(vec![1.0; 4], ScreenPoint::new(5.0, 5.0), SampleKind::Trail);
        scheduler.submit(trail).unwrap();
        assert!(scheduler.flush(TIMEOUT).unwrap().is_none());
        assert!(scheduler.try_latest().is_none());
    }

    #[test]
    fn test_try_latest_keeps_newest() {
        let scheduler = TrainingScheduler::spawn(&config(10)).unwrap();
        scheduler.submit(click(1.0, 10.0)).unwrap();
        poll_latest(&scheduler, TIMEOUT).unwrap();
        scheduler.submit(click(1.0, 10.0)).unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.submit(click(1.0, 10.0)).unwrap();
        thread::sleep(Duration::from_millis(100));

        // Two updates are queued by now; only the newest comes back
        let newest = scheduler.try_latest().unwrap();
        assert_eq!(newest.sample_count, 3);
        assert!(scheduler.try_latest().is_none());
    }

    #[test]
    fn test_export_sees_submitted_samples() {
        let scheduler = TrainingScheduler::spawn(&config(60_000)).unwrap();
        scheduler.submit(click(1.0, 1.0)).unwrap();
        scheduler.submit(click(2.0, 2.0)).unwrap();
        let samples = scheduler.export_samples().unwrap();
        assert_eq!(samples, vec![click(1.0, 1.0), click(2.0, 2.0)]);
    }

    #[test]
    fn test_spawn_rejects_invalid_config() {
        let bad = EstimatorConfig { click_capacity: 0, ..Default::default() };
        assert!(matches!(TrainingScheduler::spawn(&bad), Err(GazeError::InvalidConfig(_))));
    }

    #[test]
    fn test_shutdown_joins_worker() {
        let scheduler = TrainingScheduler::spawn(&config(60_000)).unwrap();
        scheduler.submit(click(1.0, 1.0)).unwrap();
        scheduler.shutdown();
    }
}
