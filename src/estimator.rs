use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EstimatorConfig;
use crate::error::{GazeError, Result};
use crate::features::FeatureExtractor;
use crate::pipeline::{GazeRegressor, OutputStage};
use crate::regression::{RegressionModel, RegressionTrainer};
use crate::sample_store::SampleStore;
use crate::scheduler::TrainingScheduler;
use crate::types::{EyePatches, GazeEvent, GazePrediction, Sample};

fn check_len(extractor: &FeatureExtractor, samples: &[Sample]) -> Result<()> {
    let expected = extractor.feature_len();
    match samples.iter().find(|s| s.features.len() != expected) {
        Some(bad) => Err(GazeError::ConfigMismatch { expected, found: bad.features.len() }),
        None => Ok(()),
    }
}

// =========================================================================
// Threaded estimator: training runs on the scheduler's worker thread
// =========================================================================

pub struct GazeEstimator {
    config: EstimatorConfig,
    extractor: FeatureExtractor,
    scheduler: TrainingScheduler,
    model: Option<RegressionModel>,
    output: OutputStage,
}

impl GazeEstimator {
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "starting gaze session: track_eye={:?} features={} clicks={} trail={}",
            config.track_eye,
            config.feature_len(),
            config.click_capacity,
            config.trail_capacity
        );
        Ok(Self {
            extractor: FeatureExtractor::from_config(&config),
            scheduler: TrainingScheduler::spawn(&config)?,
            model: None,
            output: OutputStage::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&RegressionModel> {
        self.model.as_ref()
    }

    /// Picks up the newest published model. Returns true if it changed.
    pub fn refresh_model(&mut self) -> bool {
        match self.scheduler.try_latest() {
            Some(model) => {
                self.model = Some(model);
                true
            }
            None => false,
        }
    }

    /// Starts a fresh session under `config`. Samples, the model and the
    /// smoothing state of the old session are all discarded. The old worker
    /// is stopped once any in-flight cycle completes and its output is never read.
    pub fn reconfigure(&mut self, config: EstimatorConfig) -> Result<()> {
        config.validate()?;
        let scheduler = TrainingScheduler::spawn(&config)?;
        info!(
            "reconfigured gaze session: track_eye={:?} features={}",
            config.track_eye,
            config.feature_len()
        );
        self.scheduler = scheduler;
        self.extractor = FeatureExtractor::from_config(&config);
        self.output = OutputStage::from_config(&config);
        self.model = None;
        self.config = config;
        Ok(())
    }
}

impl GazeRegressor for GazeEstimator {
    fn name(&self) -> String {
        "Ridge Regression (threaded)".to_string()
    }

    fn add_event(&mut self, event: &GazeEvent) -> Result<bool> {
        let features = match event.eyes.as_ref().and_then(|eyes| self.extractor.extract(eyes)) {
            Some(f) => f,
            None => {
                debug!("dropping {:?} event without tracked eye data", event.kind);
                return Ok(false);
            }
        };
        self.scheduler.submit(Sample::new(features, event.screen, event.kind))?;
        Ok(true)
    }

    fn add_samples(&mut self, samples: &[Sample]) -> Result<()> {
        check_len(&self.extractor, samples)?;
        for sample in samples {
            self.scheduler.submit(sample.clone())?;
        }
        Ok(())
    }

    fn samples(&self) -> Result<Vec<Sample>> {
        self.scheduler.export_samples()
    }

    fn train_now(&mut self, timeout: Duration) -> Result<bool> {
        if let Some(model) = self.scheduler.flush(timeout)? {
            self.model = Some(model);
        }
        Ok(self.model.is_some())
    }

    fn predict(&mut self, eyes: &EyePatches) -> Result<Option<GazePrediction>> {
        self.refresh_model();
        let model = match self.model.as_ref() {
            Some(m) => m,
            None => return Ok(None),
        };
        let features = match self.extractor.extract(eyes) {
            Some(f) => f,
            None => return Ok(None),
        };
        let raw = model.predict(&features)?;
        Ok(Some(self.output.apply(raw)))
    }

    fn reset_smoothing(&mut self) {
        self.output.reset();
    }
}

// =========================================================================
// Inline estimator: trains synchronously inside predict()
// =========================================================================

pub struct InlineEstimator {
    config: EstimatorConfig,
    extractor: FeatureExtractor,
    store: SampleStore,
    trainer: RegressionTrainer,
    model: Option<RegressionModel>,
    needs_training: bool,
    output: OutputStage,
}

impl InlineEstimator {
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::from_config(&config),
            store: SampleStore::new(config.click_capacity, config.trail_capacity),
            trainer: RegressionTrainer::from_config(&config),
            model: None,
            needs_training: false,
            output: OutputStage::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&RegressionModel> {
        self.model.as_ref()
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn reconfigure(&mut self, config: EstimatorConfig) -> Result<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    fn train_if_needed(&mut self) {
        if !self.needs_training {
            return;
        }
        match self.trainer.train(&self.store.snapshot()) {
            Ok(Some(model)) => {
                self.model = Some(model);
                self.needs_training = false;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("inline training failed, keeping previous model: {}", e);
                self.needs_training = false;
            }
        }
    }
}

impl GazeRegressor for InlineEstimator {
    fn name(&self) -> String {
        "Ridge Regression (inline)".to_string()
    }

    fn add_event(&mut self, event: &GazeEvent) -> Result<bool> {
        let features = match event.eyes.as_ref().and_then(|eyes| self.extractor.extract(eyes)) {
            Some(f) => f,
            None => {
                debug!("dropping {:?} event without tracked eye data", event.kind);
                return Ok(false);
            }
        };
        self.store.add(event.kind, event.screen, features)?;
        self.needs_training = true;
        Ok(true)
    }

    fn add_samples(&mut self, samples: &[Sample]) -> Result<()> {
        check_len(&self.extractor, samples)?;
        for sample in samples {
            self.store.add_sample(sample.clone())?;
        }
        self.needs_training |= !samples.is_empty();
        Ok(())
    }

    fn samples(&self) -> Result<Vec<Sample>> {
        Ok(self.store.samples())
    }

    fn train_now(&mut self, _timeout: Duration) -> Result<bool> {
        self.train_if_needed();
        Ok(self.model.is_some())
    }

    fn predict(&mut self, eyes: &EyePatches) -> Result<Option<GazePrediction>> {
        self.train_if_needed();
        let model = match self.model.as_ref() {
            Some(m) => m,
            None => return Ok(None),
        };
        let features = match self.extractor.extract(eyes) {
            Some(f) => f,
            None => return Ok(None),
        };
        let raw = model.predict(&features)?;
        Ok(Some(self.output.apply(raw)))
    }

    fn reset_smoothing(&mut self) {
        self.output.reset();
    }
}
