use crate::classifier::{GestureClassifier, GestureScorer};
use crate::config::GesturecamConfig;
use crate::error::{GesturecamError, Result, SourceError};
use crate::events::{EventBus, GestureEvent};
use crate::features::FeatureVector;
use crate::processor::{GestureProcessor, StatusSnapshot};
use crate::source::KeypointSource;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the pipeline stopped
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    SourceExhausted,
    Error(String),
    UserRequest,
}

/// A captured window queued for classification
struct CaptureJob {
    capture_id: String,
    frames: Vec<FeatureVector>,
}

/// Wires the keypoint source, the gesture processor, and the classifier
/// into a running pipeline.
///
/// Two tasks: the acquisition/pipeline task pulls one sample at a time and
/// finishes all per-sample work before the next grab; the classification
/// task consumes captured windows from a bounded queue and runs the scorer
/// on a blocking thread so slow scoring never stalls acquisition. Status
/// snapshots go out on a watch channel, lifecycle events on the broadcast
/// bus.
pub struct GesturecamOrchestrator {
    config: GesturecamConfig,
    event_bus: Arc<EventBus>,
    status_tx: watch::Sender<Option<StatusSnapshot>>,
    cancellation_token: CancellationToken,
    source: Option<Box<dyn KeypointSource>>,
    scorer: Arc<dyn GestureScorer>,
    pipeline_handle: Option<JoinHandle<()>>,
    classify_handle: Option<JoinHandle<()>>,
    pipeline_done: Option<oneshot::Receiver<ShutdownReason>>,
}

impl GesturecamOrchestrator {
    pub fn new(
        config: GesturecamConfig,
        source: Box<dyn KeypointSource>,
        scorer: Arc<dyn GestureScorer>,
    ) -> Result<Self> {
        config.validate()?;
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (status_tx, _) = watch::channel(None);

        Ok(Self {
            config,
            event_bus,
            status_tx,
            cancellation_token: CancellationToken::new(),
            source: Some(source),
            scorer,
            pipeline_handle: None,
            classify_handle: None,
            pipeline_done: None,
        })
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Subscribe to per-sample status snapshots
    pub fn subscribe_status(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.status_tx.subscribe()
    }

    /// Spawn the pipeline and classification tasks
    pub fn start(&mut self) -> Result<()> {
        let source = self
            .source
            .take()
            .ok_or_else(|| GesturecamError::system("Orchestrator already started"))?;

        info!(
            "Starting gesture pipeline (region: {}, {} labels)",
            source.region().name(),
            self.config.classifier.labels.len()
        );

        let (classify_tx, classify_rx) =
            mpsc::channel::<CaptureJob>(self.config.system.classify_queue_capacity);
        let (done_tx, done_rx) = oneshot::channel();

        let processor = GestureProcessor::new(self.config.clone());
        self.pipeline_handle = Some(tokio::spawn(pipeline_task(
            source,
            processor,
            Arc::clone(&self.event_bus),
            self.status_tx.clone(),
            classify_tx,
            self.cancellation_token.clone(),
            done_tx,
        )));

        self.classify_handle = Some(tokio::spawn(classification_task(
            classify_rx,
            Arc::clone(&self.scorer),
            self.config.clone(),
            Arc::clone(&self.event_bus),
        )));

        self.pipeline_done = Some(done_rx);
        Ok(())
    }

    /// Run until the source ends or an interrupt arrives, then shut down.
    ///
    /// Returns a process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        let pipeline_done = self
            .pipeline_done
            .take()
            .ok_or_else(|| GesturecamError::system("Orchestrator not started"))?;

        info!("Gesture pipeline is running");

        let reason = tokio::select! {
            result = pipeline_done => {
                result.unwrap_or(ShutdownReason::Error(
                    "Pipeline task dropped without reporting".to_string(),
                ))
            }
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => ShutdownReason::Signal("SIGINT".to_string()),
                    Err(e) => ShutdownReason::Error(format!("Signal handler failed: {}", e)),
                }
            }
        };

        info!("Shutdown initiated: {:?}", reason);
        let _ = self
            .event_bus
            .publish(GestureEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: format!("{:?}", reason),
            })
            .await;

        self.shutdown().await?;

        let exit_code = match reason {
            ShutdownReason::Error(_) => 1,
            _ => 0,
        };
        Ok(exit_code)
    }

    /// Stop sample consumption, let in-flight work finish, and join both
    /// tasks
    pub async fn shutdown(&mut self) -> Result<()> {
        debug!("Beginning graceful shutdown");
        self.cancellation_token.cancel();

        if let Some(handle) = self.pipeline_handle.take() {
            join_with_timeout(handle, "pipeline").await;
        }
        // The classification queue closes when the pipeline task drops its
        // sender; the task drains whatever is still queued
        if let Some(handle) = self.classify_handle.take() {
            join_with_timeout(handle, "classification").await;
        }

        info!("Gesture pipeline shutdown complete");
        Ok(())
    }
}

async fn join_with_timeout(handle: JoinHandle<()>, name: &str) {
    match timeout(Duration::from_secs(5), handle).await {
        Ok(Ok(())) => debug!("{} task stopped", name),
        Ok(Err(e)) => error!("{} task panicked: {}", name, e),
        Err(_) => warn!("{} task did not stop within 5s", name),
    }
}

/// Acquisition/pipeline task: one sample at a time, no internal
/// parallelism within frame processing.
async fn pipeline_task(
    mut source: Box<dyn KeypointSource>,
    mut processor: GestureProcessor,
    event_bus: Arc<EventBus>,
    status_tx: watch::Sender<Option<StatusSnapshot>>,
    classify_tx: mpsc::Sender<CaptureJob>,
    cancellation_token: CancellationToken,
    done_tx: oneshot::Sender<ShutdownReason>,
) {
    let reason = loop {
        let grabbed = tokio::select! {
            _ = cancellation_token.cancelled() => break ShutdownReason::UserRequest,
            grabbed = source.next_sample() => grabbed,
        };

        let sample = match grabbed {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                info!(
                    "Keypoint source exhausted after {} samples",
                    processor.frames_processed()
                );
                break ShutdownReason::SourceExhausted;
            }
            Err(SourceError::MalformedRecord { line, details }) => {
                // Malformed input: skip this frame, keep the loop alive
                warn!("Skipping malformed sample at line {}: {}", line, details);
                continue;
            }
            Err(e) => {
                error!("Keypoint source failed: {}", e);
                break ShutdownReason::Error(e.to_string());
            }
        };

        let processed = processor.process_sample(&sample);

        // Status publication must never block the next grab; watch::send
        // only swaps the latest value
        if let Some(status) = processed.status {
            let _ = status_tx.send(Some(status));
        }

        if let Some(event) = processed.event {
            if let GestureEvent::CaptureComplete {
                capture_id, frames, ..
            } = &event
            {
                let job = CaptureJob {
                    capture_id: capture_id.clone(),
                    frames: frames.clone(),
                };
                // Bounded queue; a full queue drops the capture rather than
                // stalling acquisition
                if classify_tx.try_send(job).is_err() {
                    warn!("Classification queue full, dropping capture {}", capture_id);
                }
            }
            if let Err(e) = event_bus.publish(event).await {
                debug!("Event publish failed (no subscribers?): {}", e);
            }
        }
    };

    let _ = done_tx.send(reason);
}

/// Classification task: consumes captured windows and runs the scorer off
/// the acquisition path. A late result is still valid; the window was
/// captured wholesale before scoring started.
async fn classification_task(
    mut classify_rx: mpsc::Receiver<CaptureJob>,
    scorer: Arc<dyn GestureScorer>,
    config: GesturecamConfig,
    event_bus: Arc<EventBus>,
) {
    let mut classifier = GestureClassifier::new(Arc::clone(&scorer), config.classifier.clone());

    while let Some(job) = classify_rx.recv().await {
        let capture_id = job.capture_id;
        debug!(
            "Classifying capture {} ({} frames)",
            capture_id,
            job.frames.len()
        );

        // Scoring may take longer than a frame period; run it on a
        // blocking thread and move the classifier state through it
        let scored = tokio::task::spawn_blocking(move || {
            let result = classifier.classify_capture(&job.frames);
            (classifier, result)
        })
        .await;

        let result = match scored {
            Ok((returned, result)) => {
                classifier = returned;
                result
            }
            Err(e) => {
                // Scorer panic: degrade to "no decision" and rebuild the
                // classifier (the anti-repeat state is lost with it)
                error!("Classification task panicked: {}", e);
                classifier =
                    GestureClassifier::new(Arc::clone(&scorer), config.classifier.clone());
                None
            }
        };

        let _ = event_bus
            .publish(GestureEvent::ClassificationCompleted {
                capture_id,
                result,
                timestamp: SystemTime::now(),
            })
            .await;
    }

    debug!("Classification queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationResult;
    use crate::error::ClassifierError;
    use crate::events::{EventFilter, EventReceiver};
    use crate::keypoint::{ArmJoints, BodyRegion, KeypointSample};
    use crate::source::MockKeypointSource;
    use nalgebra::Vector3;

    const FRAME_DT: f64 = 1.0 / 30.0;

    struct FixedScorer(Vec<f32>);

    impl GestureScorer for FixedScorer {
        fn score(
            &self,
            _window: &[FeatureVector],
        ) -> std::result::Result<Vec<f32>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    fn arm_sample(t: f64, wrist_x: f32) -> KeypointSample {
        let shoulder = Vector3::new(0.0, 1.5, -2.0);
        let elbow = shoulder + Vector3::new(0.0, 0.0, -0.3);
        let wrist = shoulder + Vector3::new(wrist_x, 0.0, -0.6);
        let joints = ArmJoints::new(shoulder, elbow, wrist);
        let mut body = vec![Vector3::new(0.0, 0.0, 0.0); 38];
        body[0] = Vector3::new(0.0, 0.9, -2.0);
        KeypointSample::new(t, joints).with_full_body(body)
    }

    /// Script a full gesture: hold ready, settle, move, fill the capture
    fn gesture_script() -> Vec<KeypointSample> {
        let mut samples = Vec::new();
        let mut t = 2.0;

        // Hold the ready pose long enough to arm and sit out the settle
        // delay (5 arming frames + ~1s settle)
        for _ in 0..40 {
            samples.push(arm_sample(t, 0.0));
            t += FRAME_DT;
        }
        // Move the wrist to trigger motion and fill the capture window
        let mut wrist_x = 0.0;
        for _ in 0..13 {
            wrist_x += 0.02;
            samples.push(arm_sample(t, wrist_x));
            t += FRAME_DT;
        }
        // A trailing frame drives CLASSIFYING back to WAITING
        samples.push(arm_sample(t, wrist_x));
        samples
    }

    fn test_config() -> GesturecamConfig {
        let mut config = GesturecamConfig::default();
        config.source.startup_grace_frames = 0;
        config
    }

    #[tokio::test]
    async fn test_end_to_end_gesture_pipeline() {
        let source = MockKeypointSource::new(gesture_script(), BodyRegion::RightArm);
        let scorer = Arc::new(FixedScorer(vec![0.1, 0.8, 0.05, 0.05]));

        let mut orchestrator =
            GesturecamOrchestrator::new(test_config(), Box::new(source), scorer).unwrap();
        let mut events = EventReceiver::new(
            orchestrator.event_bus().subscribe(),
            EventFilter::All,
            "test".to_string(),
        );
        let mut status_rx = orchestrator.subscribe_status();

        orchestrator.start().unwrap();
        let exit_code = orchestrator.run().await.unwrap();
        assert_eq!(exit_code, 0);

        // Drain everything that was published
        let mut seen = Vec::new();
        while let Ok(Some(event)) = events.try_recv() {
            seen.push(event);
        }
        let types: Vec<&str> = seen.iter().map(|e| e.event_type()).collect();

        let expected = [
            "ready_pose_detected",
            "motion_detected",
            "capture_complete",
            "classification_completed",
        ];
        for event_type in expected {
            assert!(
                types.contains(&event_type),
                "missing {} in {:?}",
                event_type,
                types
            );
        }

        // Lifecycle events arrive in capture order
        let ready_pos = types.iter().position(|t| *t == "ready_pose_detected");
        let motion_pos = types.iter().position(|t| *t == "motion_detected");
        let capture_pos = types.iter().position(|t| *t == "capture_complete");
        assert!(ready_pos < motion_pos && motion_pos < capture_pos);

        // The capture carried the full window
        let capture = seen
            .iter()
            .find_map(|e| match e {
                GestureEvent::CaptureComplete { frames, .. } => Some(frames.len()),
                _ => None,
            })
            .unwrap();
        assert_eq!(capture, 10);

        // The fixed scorer produces a confident right_swipe
        let result = seen
            .iter()
            .find_map(|e| match e {
                GestureEvent::ClassificationCompleted { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            result,
            Some(ClassificationResult {
                label: "right_swipe".to_string(),
                confidence: 0.8,
                alternate: None,
            })
        );

        // Status snapshots were published along the way
        assert!(status_rx.borrow_and_update().is_some());
    }

    #[tokio::test]
    async fn test_scorer_failure_surfaces_no_decision() {
        struct BrokenScorer;
        impl GestureScorer for BrokenScorer {
            fn score(
                &self,
                _: &[FeatureVector],
            ) -> std::result::Result<Vec<f32>, ClassifierError> {
                Err(ClassifierError::ScorerFailed {
                    details: "offline".to_string(),
                })
            }
        }

        let source = MockKeypointSource::new(gesture_script(), BodyRegion::RightArm);
        let mut orchestrator =
            GesturecamOrchestrator::new(test_config(), Box::new(source), Arc::new(BrokenScorer))
                .unwrap();
        let mut events = EventReceiver::new(
            orchestrator.event_bus().subscribe(),
            EventFilter::EventTypes(vec!["classification_completed"]),
            "test".to_string(),
        );

        orchestrator.start().unwrap();
        orchestrator.run().await.unwrap();

        match events.try_recv() {
            Ok(Some(GestureEvent::ClassificationCompleted { result, .. })) => {
                assert!(result.is_none());
            }
            other => panic!("expected a no-decision classification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_source_exits_cleanly() {
        let source = MockKeypointSource::empty(BodyRegion::RightArm);
        let scorer = Arc::new(FixedScorer(vec![0.25, 0.25, 0.25, 0.25]));
        let mut orchestrator =
            GesturecamOrchestrator::new(test_config(), Box::new(source), scorer).unwrap();

        orchestrator.start().unwrap();
        let exit_code = orchestrator.run().await.unwrap();
        assert_eq!(exit_code, 0);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let source = MockKeypointSource::empty(BodyRegion::RightArm);
        let scorer = Arc::new(FixedScorer(vec![1.0, 0.0, 0.0, 0.0]));
        let mut orchestrator =
            GesturecamOrchestrator::new(test_config(), Box::new(source), scorer).unwrap();

        orchestrator.start().unwrap();
        assert!(orchestrator.start().is_err());
        orchestrator.shutdown().await.unwrap();
    }
}
