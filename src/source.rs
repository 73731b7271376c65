use crate::error::SourceError;
use crate::keypoint::{BodyRegion, KeypointSample};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// The consumed keypoint boundary: one sample per grab.
///
/// `next_sample` suspends until the next sample is available and returns
/// `Ok(None)` once the source is exhausted or closed. Joint values at
/// exactly zero (within epsilon) signal an untracked body; that is a valid
/// sample, not an error. Hardware-backed sources live outside this crate
/// and implement this trait at the process boundary.
#[async_trait]
pub trait KeypointSource: Send {
    async fn next_sample(&mut self) -> Result<Option<KeypointSample>, SourceError>;

    /// Which body region this source was configured to track
    fn region(&self) -> BodyRegion;
}

/// Replays recorded samples from a JSON Lines file.
///
/// Each line holds one serialized [`KeypointSample`]. With pacing enabled
/// the source sleeps one frame period per sample, approximating the
/// original camera rate; unpaced it feeds the pipeline as fast as the file
/// reads.
pub struct ReplayKeypointSource {
    lines: Lines<BufReader<File>>,
    region: BodyRegion,
    frame_interval: Option<Duration>,
    line_number: usize,
}

impl ReplayKeypointSource {
    pub fn open<P: AsRef<Path>>(path: P, region: BodyRegion) -> Result<Self, SourceError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| SourceError::Open {
            path: path_ref.display().to_string(),
            details: e.to_string(),
        })?;

        info!("Replaying keypoint samples from {}", path_ref.display());
        Ok(Self {
            lines: BufReader::new(file).lines(),
            region,
            frame_interval: None,
            line_number: 0,
        })
    }

    /// Pace replay at the given sample rate instead of free-running
    pub fn with_pacing(mut self, fps: u32) -> Self {
        if fps > 0 {
            self.frame_interval = Some(Duration::from_secs_f64(1.0 / fps as f64));
        }
        self
    }
}

#[async_trait]
impl KeypointSource for ReplayKeypointSource {
    async fn next_sample(&mut self) -> Result<Option<KeypointSample>, SourceError> {
        if let Some(interval) = self.frame_interval {
            tokio::time::sleep(interval).await;
        }

        loop {
            let line = match self.lines.next() {
                Some(line) => line,
                None => {
                    debug!("Replay file exhausted after {} lines", self.line_number);
                    return Ok(None);
                }
            };
            self.line_number += 1;

            let line = line.map_err(|e| SourceError::Disconnected {
                details: e.to_string(),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let sample: KeypointSample =
                serde_json::from_str(&line).map_err(|e| SourceError::MalformedRecord {
                    line: self.line_number,
                    details: e.to_string(),
                })?;
            return Ok(Some(sample));
        }
    }

    fn region(&self) -> BodyRegion {
        self.region
    }
}

/// Scripted in-memory source for tests and hardware-free runs
pub struct MockKeypointSource {
    samples: VecDeque<KeypointSample>,
    region: BodyRegion,
}

impl MockKeypointSource {
    pub fn new(samples: Vec<KeypointSample>, region: BodyRegion) -> Self {
        Self {
            samples: samples.into(),
            region,
        }
    }

    pub fn empty(region: BodyRegion) -> Self {
        Self::new(Vec::new(), region)
    }

    pub fn push_sample(&mut self, sample: KeypointSample) {
        self.samples.push_back(sample);
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

#[async_trait]
impl KeypointSource for MockKeypointSource {
    async fn next_sample(&mut self) -> Result<Option<KeypointSample>, SourceError> {
        Ok(self.samples.pop_front())
    }

    fn region(&self) -> BodyRegion {
        self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::ArmJoints;
    use nalgebra::Vector3;
    use std::io::Write;

    fn sample(t: f64) -> KeypointSample {
        let joints = ArmJoints::new(
            Vector3::new(0.1, 1.5, -2.0),
            Vector3::new(0.2, 1.3, -1.9),
            Vector3::new(0.3, 1.1, -1.7),
        );
        KeypointSample::new(t, joints)
    }

    #[tokio::test]
    async fn test_replay_reads_samples_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for t in [0.0, 0.033, 0.066] {
            writeln!(file, "{}", serde_json::to_string(&sample(t)).unwrap()).unwrap();
        }

        let mut source =
            ReplayKeypointSource::open(file.path(), BodyRegion::RightArm).unwrap();
        assert_eq!(source.next_sample().await.unwrap().unwrap().timestamp, 0.0);
        assert_eq!(
            source.next_sample().await.unwrap().unwrap().timestamp,
            0.033
        );
        assert_eq!(
            source.next_sample().await.unwrap().unwrap().timestamp,
            0.066
        );
        assert!(source.next_sample().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", serde_json::to_string(&sample(0.0)).unwrap()).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", serde_json::to_string(&sample(0.1)).unwrap()).unwrap();

        let mut source =
            ReplayKeypointSource::open(file.path(), BodyRegion::RightArm).unwrap();
        assert!(source.next_sample().await.unwrap().is_some());
        assert_eq!(source.next_sample().await.unwrap().unwrap().timestamp, 0.1);
    }

    #[tokio::test]
    async fn test_replay_reports_malformed_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", serde_json::to_string(&sample(0.0)).unwrap()).unwrap();
        writeln!(file, "not json").unwrap();

        let mut source =
            ReplayKeypointSource::open(file.path(), BodyRegion::RightArm).unwrap();
        assert!(source.next_sample().await.unwrap().is_some());
        match source.next_sample().await {
            Err(SourceError::MalformedRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed record, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_open_missing_file() {
        let result = ReplayKeypointSource::open("/nonexistent/replay.jsonl", BodyRegion::RightArm);
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }

    #[tokio::test]
    async fn test_mock_source_pops_in_order() {
        let mut source = MockKeypointSource::new(
            vec![sample(0.0), sample(1.0)],
            BodyRegion::LeftArm,
        );
        assert_eq!(source.region(), BodyRegion::LeftArm);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_sample().await.unwrap().unwrap().timestamp, 0.0);
        assert_eq!(source.next_sample().await.unwrap().unwrap().timestamp, 1.0);
        assert!(source.next_sample().await.unwrap().is_none());
    }
}
