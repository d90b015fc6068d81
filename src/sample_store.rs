use std::time::Instant;
use tracing::debug;

use crate::error::{GazeError, Result};
use crate::ring_buffer::RingBuffer;
use crate::types::{Sample, SampleKind, ScreenPoint};

/// Parallel windows for one population. Index `i` names the same sample in
/// every buffer.
#[derive(Debug, Clone)]
struct Population {
    screen_x: RingBuffer<f64>,
    screen_y: RingBuffer<f64>,
    features: RingBuffer<Vec<f64>>,
    times: Option<RingBuffer<Instant>>,
}

impl Population {
    fn new(capacity: usize, timestamped: bool) -> Self {
        Self {
            screen_x: RingBuffer::new(capacity),
            screen_y: RingBuffer::new(capacity),
            features: RingBuffer::new(capacity),
            times: timestamped.then(|| RingBuffer::new(capacity)),
        }
    }

    fn push(&mut self, label: ScreenPoint, features: Vec<f64>) {
        self.screen_x.push(label.x);
        self.screen_y.push(label.y);
        self.features.push(features);
        if let Some(times) = self.times.as_mut() {
            times.push(Instant::now());
        }
    }

    fn len(&self) -> usize {
        self.features.len()
    }

    fn clear(&mut self) {
        self.screen_x.clear();
        self.screen_y.clear();
        self.features.clear();
        if let Some(times) = self.times.as_mut() {
            times.clear();
        }
    }
}

/// Training rows gathered from both populations, clicks first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingBatch {
    pub screen_x: Vec<f64>,
    pub screen_y: Vec<f64>,
    pub features: Vec<Vec<f64>>,
    pub click_count: usize,
}

impl TrainingBatch {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Bounded storage for click (ground truth) and trail (cursor movement) samples.
#[derive(Debug, Clone)]
pub struct SampleStore {
    clicks: Population,
    trail: Population,
    feature_len: Option<usize>,
}

impl SampleStore {
    pub fn new(click_capacity: usize, trail_capacity: usize) -> Self {
        Self {
            clicks: Population::new(click_capacity, false),
            trail: Population::new(trail_capacity, true),
            feature_len: None,
        }
    }

    /// Stores one sample. The first sample fixes the feature length for the
    /// store; later samples of another length are rejected untouched.
    pub fn add(&mut self, kind: SampleKind, label: ScreenPoint, features: Vec<f64>) -> Result<()> {
        match self.feature_len {
            Some(expected) if expected != features.len() => {
                return Err(GazeError::ConfigMismatch { expected, found: features.len() });
            }
            None => self.feature_len = Some(features.len()),
            _ => {}
        }

        match kind {
            SampleKind::Click => self.clicks.push(label, features),
            SampleKind::Trail => self.trail.push(label, features),
        }
        debug!(
            "stored {:?} sample at ({:.0}, {:.0}); clicks={} trail={}",
            kind,
            label.x,
            label.y,
            self.clicks.len(),
            self.trail.len()
        );
        Ok(())
    }

    pub fn add_sample(&mut self, sample: Sample) -> Result<()> {
        self.add(sample.kind, sample.label, sample.features)
    }

    pub fn click_count(&self) -> usize {
        self.clicks.len()
    }

    pub fn trail_count(&self) -> usize {
        self.trail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clicks.len() == 0 && self.trail.len() == 0
    }

    pub fn feature_len(&self) -> Option<usize> {
        self.feature_len
    }

    /// Insertion times of the surviving trail samples, oldest first.
    pub fn trail_times(&self) -> Vec<Instant> {
        self.trail.times.as_ref().map(|t| t.to_vec()).unwrap_or_default()
    }

    /// Concatenates clicks then trail into one batch of training rows.
    pub fn snapshot(&self) -> TrainingBatch {
        let mut batch = TrainingBatch {
            click_count: self.clicks.len(),
            ..Default::default()
        };
        for population in [&self.clicks, &self.trail] {
            batch.screen_x.extend(population.screen_x.iter().copied());
            batch.screen_y.extend(population.screen_y.iter().copied());
            batch.features.extend(population.features.iter().cloned());
        }
        batch
    }

    /// Surviving samples, clicks then trail, for export.
    pub fn samples(&self) -> Vec<Sample> {
        let mut out = Vec::with_capacity(self.clicks.len() + self.trail.len());
        for (population, kind) in [(&self.clicks, SampleKind::Click), (&self.trail, SampleKind::Trail)] {
            let rows = population
                .screen_x
                .iter()
                .zip(population.screen_y.iter())
                .zip(population.features.iter());
            for ((&x, &y), feats) in rows {
                out.push(Sample::new(feats.clone(), ScreenPoint::new(x, y), kind));
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.clicks.clear();
        self.trail.clear();
        self.feature_len = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feats(v: f64) -> Vec<f64> {
        vec![v, v + 1.0, v + 2.0]
    }

    #[test]
    fn test_populations_stay_aligned() {
        let mut store = SampleStore::new(3, 2);
        for i in 0..5 {
            let v = i as f64;
            store.add(SampleKind::Click, ScreenPoint::new(v, -v), feats(v)).unwrap();
        }
        store.add(SampleKind::Trail, ScreenPoint::new(100.0, 200.0), feats(100.0)).unwrap();

        let batch = store.snapshot();
        assert_eq!(batch.click_count, 3);
        assert_eq!(batch.screen_x, vec![2.0, 3.0, 4.0, 100.0]);
        assert_eq!(batch.screen_y, vec![-2.0, -3.0, -4.0, 200.0]);
        for (i, row) in batch.features.iter().enumerate() {
            assert_eq!(row[0], batch.screen_x[i]);
        }
    }

    #[test]
    fn test_trail_is_timestamped_and_bounded() {
        let mut store = SampleStore::new(5, 2);
        for i in 0..4 {
            store.add(SampleKind::Trail, ScreenPoint::new(i as f64, 0.0), feats(0.0)).unwrap();
        }
        assert_eq!(store.trail_count(), 2);
        let times = store.trail_times();
        assert_eq!(times.len(), 2);
        assert!(times[0] <= times[1]);
    }

    #[test]
    fn test_mismatched_length_rejected_without_mutation() {
        let mut store = SampleStore::new(5, 5);
        store.add(SampleKind::Click, ScreenPoint::new(1.0, 1.0), feats(1.0)).unwrap();

        let err = store.add(SampleKind::Trail, ScreenPoint::new(2.0, 2.0), vec![0.0; 7]).unwrap_err();
        assert!(matches!(err, GazeError::ConfigMismatch { expected: 3, found: 7 }));
        assert_eq!(store.trail_count(), 0);
        assert_eq!(store.click_count(), 1);
    }

    #[test]
    fn test_samples_export_matches_input() {
        let mut store = SampleStore::new(5, 5);
        let click = Sample::new(feats(1.0), ScreenPoint::new(10.0, 20.0), SampleKind::Click);
        let trail = Sample::new(feats(2.0), ScreenPoint::new(30.0, 40.0), SampleKind::Trail);
        store.add_sample(trail.clone()).unwrap();
        store.add_sample(click.clone()).unwrap();

        assert_eq!(store.samples(), vec![click, trail]);
    }

    #[test]
    fn test_clear_forgets_feature_len() {
        let mut store = SampleStore::new(2, 2);
        store.add(SampleKind::Click, ScreenPoint::default(), feats(0.0)).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.feature_len(), None);
        store.add(SampleKind::Click, ScreenPoint::default(), vec![1.0; 10]).unwrap();
        assert_eq!(store.feature_len(), Some(10));
    }
}
