use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::features::{columns, FeatureVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Label used when a decision clears the vote gates but not the
/// presentation confidence bar
pub const UNCLEAR_LABEL: &str = "unclear";

/// The opaque scoring contract.
///
/// Implementations receive a window of exactly `window_size` feature
/// vectors and return one probability per known label. The pipeline treats
/// the scorer as pure and stateless: the same window may be scored
/// repeatedly.
pub trait GestureScorer: Send + Sync {
    fn score(&self, window: &[FeatureVector]) -> Result<Vec<f32>, ClassifierError>;
}

/// Final classification handed to the presenter
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
    /// Best raw label when the result is presented as unclear
    pub alternate: Option<String>,
}

/// Windowed classification with confidence/consistency policy.
///
/// Owns the shared last-prediction state that drives the diversity
/// penalty, so consecutive captures are discouraged from repeating the
/// same label.
pub struct GestureClassifier {
    scorer: Arc<dyn GestureScorer>,
    config: ClassifierConfig,
    last_prediction: Option<usize>,
}

impl GestureClassifier {
    pub fn new(scorer: Arc<dyn GestureScorer>, config: ClassifierConfig) -> Self {
        Self {
            scorer,
            config,
            last_prediction: None,
        }
    }

    /// Classify a captured buffer and shape the outcome for presentation.
    ///
    /// Uses sliding-window voting when enough frames are available and
    /// falls back to a single fixed window otherwise. Returns `None` when
    /// no decision clears the policy gates.
    pub fn classify_capture(&mut self, frames: &[FeatureVector]) -> Option<ClassificationResult> {
        let (index, confidence) = self.sliding_window_classify(frames)?;
        let label = self.config.labels.get(index)?.clone();

        Some(if confidence >= self.config.min_result_confidence {
            ClassificationResult {
                label,
                confidence,
                alternate: None,
            }
        } else {
            ClassificationResult {
                label: UNCLEAR_LABEL.to_string(),
                confidence,
                alternate: Some(label),
            }
        })
    }

    /// Score one window normalized to exactly the configured size.
    ///
    /// Shorter buffers are padded by repeating the last frame; longer ones
    /// are reduced to a centered sub-slice. Returns the top label index and
    /// its confidence, or `None` on an empty buffer or scorer failure.
    pub fn classify(&mut self, frames: &[FeatureVector]) -> Option<(usize, f32)> {
        if frames.is_empty() {
            return None;
        }

        let window = self.normalize_window(frames);
        let mut probs = self.score_window(&window)?;

        self.apply_diversity_penalty(&mut probs);
        let (index, confidence) = argmax(&probs)?;
        self.last_prediction = Some(index);
        Some((index, confidence))
    }

    /// Evaluate overlapping windows across the buffer and aggregate by
    /// majority vote.
    ///
    /// Buffers shorter than the window size degrade to [`classify`]. The
    /// aggregated label is accepted only when it wins enough windows and
    /// their average confidence clears the threshold.
    ///
    /// [`classify`]: GestureClassifier::classify
    pub fn sliding_window_classify(&mut self, frames: &[FeatureVector]) -> Option<(usize, f32)> {
        let window_size = self.config.window_size;
        if frames.len() < window_size {
            return self.classify(frames);
        }

        let window_count = self
            .config
            .max_windows
            .min(frames.len() - window_size + 1);

        let mut predictions = Vec::with_capacity(window_count);
        let mut confidences = Vec::with_capacity(window_count);
        for i in 0..window_count {
            let window = &frames[i..i + window_size];
            let mut probs = match self.score_window(window) {
                Some(probs) => probs,
                None => continue,
            };
            self.apply_diversity_penalty(&mut probs);
            if let Some((index, confidence)) = argmax(&probs) {
                predictions.push(index);
                confidences.push(confidence);
            }
        }

        if predictions.is_empty() {
            return None;
        }

        // Majority label across windows
        let mut counts = vec![0usize; self.config.labels.len()];
        for &p in &predictions {
            counts[p] += 1;
        }
        let (majority, votes) = counts
            .iter()
            .enumerate()
            .max_by_key(|(_, &count)| count)
            .map(|(label, &count)| (label, count))?;

        // Average confidence over the windows that agree with the majority
        let agreeing: Vec<f32> = predictions
            .iter()
            .zip(&confidences)
            .filter(|(&p, _)| p == majority)
            .map(|(_, &c)| c)
            .collect();
        let mean_confidence = agreeing.iter().sum::<f32>() / agreeing.len() as f32;

        debug!(
            "Sliding window vote: label {} won {}/{} windows at {:.2}",
            majority,
            votes,
            predictions.len(),
            mean_confidence
        );

        if mean_confidence >= self.config.confidence_threshold
            && votes >= self.config.window_consistency
        {
            self.last_prediction = Some(majority);
            Some((majority, mean_confidence))
        } else {
            None
        }
    }

    /// Run the scorer and normalize its distribution; `None` on failure
    fn score_window(&self, window: &[FeatureVector]) -> Option<Vec<f32>> {
        let raw = match self.scorer.score(window) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Scorer failed: {}", e);
                return None;
            }
        };
        if raw.len() != self.config.labels.len() {
            let mismatch = ClassifierError::LabelCountMismatch {
                expected: self.config.labels.len(),
                got: raw.len(),
            };
            warn!("Discarding scorer output: {}", mismatch);
            return None;
        }
        Some(normalize_distribution(raw))
    }

    /// Pad (repeat last frame) or center-slice the buffer to the window size
    fn normalize_window(&self, frames: &[FeatureVector]) -> Vec<FeatureVector> {
        let window_size = self.config.window_size;
        if frames.len() < window_size {
            let mut window = frames.to_vec();
            let last = frames[frames.len() - 1].clone();
            window.resize(window_size, last);
            window
        } else if frames.len() > window_size {
            let mid = frames.len() / 2;
            let start = mid.saturating_sub(window_size / 2);
            frames[start..start + window_size].to_vec()
        } else {
            frames.to_vec()
        }
    }

    /// Down-weight a repeat of the previous decision and re-normalize
    fn apply_diversity_penalty(&self, probs: &mut [f32]) {
        let last = match self.last_prediction {
            Some(last) => last,
            None => return,
        };
        if argmax(probs).map(|(index, _)| index) != Some(last) {
            return;
        }
        probs[last] *= self.config.diversity_penalty;
        let sum: f32 = probs.iter().sum();
        if sum > 0.0 {
            for p in probs.iter_mut() {
                *p /= sum;
            }
        }
    }
}

fn normalize_distribution(mut probs: Vec<f32>) -> Vec<f32> {
    let sum: f32 = probs.iter().sum();
    if sum > 0.0 {
        for p in probs.iter_mut() {
            *p /= sum;
        }
    }
    probs
}

fn argmax(probs: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probs.iter().enumerate() {
        match best {
            Some((_, value)) if p <= value => {}
            _ => best = Some((i, p)),
        }
    }
    best
}

/// Direction-heuristic scorer usable without a trained model.
///
/// Scores swipe labels from the mean wrist velocity across the window:
/// the dominant signed x/y component votes for the matching left/right/
/// up/down label. Labels it does not recognize score 0.
pub struct HeuristicDirectionScorer {
    /// (label index, sign, axis offset into VEL_WRIST): how each known
    /// label reads the mean velocity
    targets: Vec<(usize, f32, usize)>,
    label_count: usize,
}

impl HeuristicDirectionScorer {
    pub fn new(labels: &[String]) -> Self {
        let mut targets = Vec::new();
        for (index, label) in labels.iter().enumerate() {
            // Positive x points left under the mirror convention
            match label.as_str() {
                "left_swipe" => targets.push((index, 1.0, 0)),
                "right_swipe" => targets.push((index, -1.0, 0)),
                "up_swipe" => targets.push((index, 1.0, 1)),
                "down_swipe" => targets.push((index, -1.0, 1)),
                _ => {}
            }
        }
        Self {
            targets,
            label_count: labels.len(),
        }
    }
}

impl GestureScorer for HeuristicDirectionScorer {
    fn score(&self, window: &[FeatureVector]) -> Result<Vec<f32>, ClassifierError> {
        if window.is_empty() {
            return Err(ClassifierError::ScorerFailed {
                details: "empty window".to_string(),
            });
        }

        let mut mean = [0.0f32; 3];
        for frame in window {
            for (axis, slot) in mean.iter_mut().enumerate() {
                *slot += frame[columns::VEL_WRIST + axis];
            }
        }
        for slot in mean.iter_mut() {
            *slot /= window.len() as f32;
        }

        let mut probs = vec![0.0; self.label_count];
        for &(index, sign, axis) in &self.targets {
            probs[index] = (mean[axis] * sign).max(0.0);
        }
        Ok(probs)
    }
}
