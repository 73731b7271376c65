use crate::analyzer::{MotionState, PoseAnalyzer};
use crate::config::GesturecamConfig;
use crate::error::AnalyzerError;
use crate::events::GestureEvent;
use crate::features::{FeatureExtractor, FeatureVector};
use crate::keypoint::KeypointSample;
use crate::window::FrameWindow;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle phase of the gesture pipeline; exactly one value is active
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Waiting,
    Ready,
    Capturing,
    Classifying,
}

impl GestureState {
    pub fn name(&self) -> &'static str {
        match self {
            GestureState::Waiting => "WAITING",
            GestureState::Ready => "READY",
            GestureState::Capturing => "CAPTURING",
            GestureState::Classifying => "CLASSIFYING",
        }
    }
}

/// Read-only status published to the presenter after each processed sample
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: GestureState,
    pub ready_pose: bool,
    pub motion_detected: bool,
    pub extension_ratio: f32,
    pub torso_arm_angle: f32,
    /// Always 0; reported separately from `torso_arm_angle`, which drives
    /// the ready-pose gate
    pub wrist_pelvis_angle: f32,
    pub forward_dot: f32,
    pub buffered_frames: usize,
    pub current_velocity: f32,
}

/// Result of feeding one sample through the pipeline.
///
/// At most one event per processed frame; status is absent for frames the
/// pipeline suppressed (startup grace, untracked body, stale timestamps).
#[derive(Debug)]
pub struct ProcessedFrame {
    pub event: Option<GestureEvent>,
    pub status: Option<StatusSnapshot>,
}

impl ProcessedFrame {
    fn empty() -> Self {
        Self {
            event: None,
            status: None,
        }
    }
}

#[derive(Debug, Default)]
struct StageCounters {
    ready_pose: u32,
    motion_detect: u32,
}

impl StageCounters {
    fn reset(&mut self) {
        self.ready_pose = 0;
        self.motion_detect = 0;
    }
}

/// The capture state machine.
///
/// Consumes one sample at a time, owns every piece of rolling state
/// (smoothing, derivatives, counters, the capture window), and decides all
/// irreversible transitions. Single-owner by design: nothing in here is
/// shared; callers publish the returned snapshots and events.
pub struct GestureProcessor {
    config: GesturecamConfig,
    state: GestureState,
    counters: StageCounters,
    pose: PoseAnalyzer,
    motion: MotionState,
    extractor: FeatureExtractor,
    window: FrameWindow,
    no_body_counter: u32,
    body_tracked: bool,
    ready_entered_at: f64,
    last_gesture_at: f64,
    last_timestamp: Option<f64>,
    startup_grace_remaining: u32,
    current_capture_id: Option<String>,
    frames_processed: u64,
}

impl GestureProcessor {
    pub fn new(config: GesturecamConfig) -> Self {
        let pose = PoseAnalyzer::new(config.pose.clone());
        let motion = MotionState::new(config.pose.smoothing_alpha, config.motion.clone());
        let window = FrameWindow::new(config.capture.max_frames);
        let startup_grace_remaining = config.source.startup_grace_frames;
        Self {
            config,
            state: GestureState::Waiting,
            counters: StageCounters::default(),
            pose,
            motion,
            extractor: FeatureExtractor::new(),
            window,
            no_body_counter: 0,
            body_tracked: false,
            ready_entered_at: 0.0,
            last_gesture_at: 0.0,
            last_timestamp: None,
            startup_grace_remaining,
            current_capture_id: None,
            frames_processed: 0,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Feed one sample through analysis, feature extraction, and the state
    /// machine.
    pub fn process_sample(&mut self, sample: &KeypointSample) -> ProcessedFrame {
        self.frames_processed += 1;

        // Sensor warm-up: discard the first grabs entirely
        if self.startup_grace_remaining > 0 {
            self.startup_grace_remaining -= 1;
            return ProcessedFrame::empty();
        }

        // Timestamps must be non-decreasing across processed samples
        if let Some(last) = self.last_timestamp {
            if sample.timestamp < last {
                let regression = AnalyzerError::TimestampRegression {
                    current: sample.timestamp,
                    previous: last,
                };
                warn!("Skipping sample: {}", regression);
                return ProcessedFrame::empty();
            }
        }

        if !sample.joints.is_tracked() {
            return self.handle_untracked();
        }
        self.no_body_counter = 0;
        let body_event = if !self.body_tracked {
            self.body_tracked = true;
            Some(GestureEvent::BodyStatusChanged {
                tracked: true,
                timestamp: SystemTime::now(),
            })
        } else {
            None
        };

        let motion_frame = self.motion.update(&sample.joints, sample.timestamp);
        let metrics = self.pose.analyze(&motion_frame.smoothed, sample.pelvis());
        let features = self.extractor.extract(
            &motion_frame.smoothed,
            motion_frame.velocities.as_ref(),
            motion_frame.accelerations.as_ref(),
        );

        let machine_event = self.update_state_machine(
            metrics.ready_pose,
            motion_frame.motion_detected,
            motion_frame.wrist_speed,
            features,
            sample.timestamp,
        );

        let status = StatusSnapshot {
            state: self.state,
            ready_pose: metrics.ready_pose,
            motion_detected: motion_frame.motion_detected,
            extension_ratio: metrics.extension_ratio,
            torso_arm_angle: metrics.torso_arm_angle,
            wrist_pelvis_angle: metrics.wrist_pelvis_angle,
            forward_dot: metrics.forward_dot,
            buffered_frames: self.window.len(),
            current_velocity: self.motion.current_speed(),
        };

        self.last_timestamp = Some(sample.timestamp);

        ProcessedFrame {
            // One event per frame: a transition outranks the tracking flip
            event: machine_event.or(body_event),
            status: Some(status),
        }
    }

    /// Transient sensor gap handling: count the gap, reset after the grace
    /// period, and suppress output either way.
    fn handle_untracked(&mut self) -> ProcessedFrame {
        self.no_body_counter += 1;
        let event = if self.body_tracked {
            self.body_tracked = false;
            Some(GestureEvent::BodyStatusChanged {
                tracked: false,
                timestamp: SystemTime::now(),
            })
        } else {
            None
        };

        if self.no_body_counter > self.config.pose.no_body_reset_frames {
            debug!(
                "No body for {} consecutive frames, resetting pipeline",
                self.no_body_counter
            );
            self.full_reset();
        }

        ProcessedFrame {
            event,
            status: None,
        }
    }

    fn update_state_machine(
        &mut self,
        ready_pose: bool,
        motion_detected: bool,
        wrist_speed: f32,
        features: FeatureVector,
        t: f64,
    ) -> Option<GestureEvent> {
        match self.state {
            GestureState::Waiting => {
                if ready_pose {
                    self.counters.ready_pose += 1;
                    let held_long_enough =
                        self.counters.ready_pose >= self.config.pose.ready_pose_frames;
                    let cooled_down =
                        t - self.last_gesture_at >= self.config.capture.cooldown_seconds;
                    if held_long_enough && cooled_down {
                        self.state = GestureState::Ready;
                        self.ready_entered_at = t;
                        self.window.clear();
                        return Some(GestureEvent::ReadyPoseDetected {
                            timestamp: SystemTime::now(),
                        });
                    }
                } else {
                    self.counters.ready_pose = 0;
                }
                None
            }
            GestureState::Ready => {
                // Settle delay: ignore motion right after arming
                if t - self.ready_entered_at < self.config.capture.settle_seconds {
                    return None;
                }
                if motion_detected {
                    self.counters.motion_detect += 1;
                    if self.counters.motion_detect >= self.config.motion.motion_detect_frames {
                        self.state = GestureState::Capturing;
                        self.current_capture_id = Some(Uuid::new_v4().to_string());
                        self.window.clear();
                        self.window.push(features);
                        return Some(GestureEvent::MotionDetected {
                            wrist_speed,
                            timestamp: SystemTime::now(),
                        });
                    }
                } else {
                    self.counters.motion_detect = 0;
                }
                if t - self.ready_entered_at > self.config.capture.ready_timeout_seconds {
                    self.full_reset();
                    return Some(GestureEvent::ReadyPoseTimeout {
                        timestamp: SystemTime::now(),
                    });
                }
                None
            }
            GestureState::Capturing => {
                let full = self.window.push(features);
                if full {
                    self.state = GestureState::Classifying;
                    let capture_id = self
                        .current_capture_id
                        .take()
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    return Some(GestureEvent::CaptureComplete {
                        capture_id,
                        frames: self.window.frames().to_vec(),
                        timestamp: SystemTime::now(),
                    });
                }
                None
            }
            GestureState::Classifying => {
                // The window was already handed off; stamp the cooldown
                // origin and return to WAITING
                self.last_gesture_at = t;
                self.full_reset();
                None
            }
        }
    }

    /// Return to WAITING with all stage counters, the capture window, and
    /// the rolling motion histories cleared.
    fn full_reset(&mut self) {
        self.state = GestureState::Waiting;
        self.counters.reset();
        self.window.clear();
        self.motion.reset_history();
        self.ready_entered_at = 0.0;
        self.current_capture_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoint::ArmJoints;
    use nalgebra::Vector3;

    const FRAME_DT: f64 = 1.0 / 30.0;

    fn test_config() -> GesturecamConfig {
        let mut config = GesturecamConfig::default();
        // Warm-up is exercised separately
        config.source.startup_grace_frames = 0;
        config
    }

    fn processor() -> GestureProcessor {
        GestureProcessor::new(test_config())
    }

    /// Extended arm held camera-forward; qualifies as the ready pose
    fn ready_sample(t: f64) -> KeypointSample {
        arm_sample(t, 0.0)
    }

    /// Same pose with the wrist shifted along x; used to synthesize motion
    fn arm_sample(t: f64, wrist_x: f64) -> KeypointSample {
        let shoulder = Vector3::new(0.0, 1.5, -2.0);
        let elbow = shoulder + Vector3::new(0.0, 0.0, -0.3);
        let wrist = shoulder + Vector3::new(wrist_x as f32, 0.0, -0.6);
        let joints = ArmJoints::new(shoulder, elbow, wrist);
        let mut body = vec![Vector3::new(0.0, 0.0, 0.0); 38];
        body[0] = Vector3::new(0.0, 0.9, -2.0);
        KeypointSample::new(t, joints).with_full_body(body)
    }

    /// Arm hanging down; tracked but never ready
    fn idle_sample(t: f64) -> KeypointSample {
        let shoulder = Vector3::new(0.0, 1.5, -2.0);
        let elbow = shoulder + Vector3::new(0.0, -0.3, 0.0);
        let wrist = shoulder + Vector3::new(0.0, -0.6, 0.0);
        let joints = ArmJoints::new(shoulder, elbow, wrist);
        let mut body = vec![Vector3::new(0.0, 0.0, 0.0); 38];
        body[0] = Vector3::new(0.0, 0.9, -2.0);
        KeypointSample::new(t, joints).with_full_body(body)
    }

    fn untracked_sample(t: f64) -> KeypointSample {
        KeypointSample::new(t, ArmJoints::from_raw(&[0.0; 9]).unwrap())
    }

    /// Drive a fresh processor into READY; returns the entry timestamp
    fn drive_to_ready(processor: &mut GestureProcessor, start: f64) -> f64 {
        for i in 0..5 {
            let t = start + i as f64 * FRAME_DT;
            let frame = processor.process_sample(&ready_sample(t));
            if i < 4 {
                assert!(frame.event.is_none() || i == 0, "unexpected early event");
            } else {
                match frame.event {
                    Some(GestureEvent::ReadyPoseDetected { .. }) => {}
                    other => panic!("expected ready_pose_detected, got {:?}", other),
                }
            }
        }
        assert_eq!(processor.state(), GestureState::Ready);
        start + 4.0 * FRAME_DT
    }

    /// Drive READY into CAPTURING with three fast wrist frames after the
    /// settle delay; returns the timestamp of the last motion frame
    fn drive_to_capturing(processor: &mut GestureProcessor, ready_at: f64) -> f64 {
        // Hold still through the settle window
        let mut t = ready_at;
        for _ in 0..32 {
            t += FRAME_DT;
            let frame = processor.process_sample(&ready_sample(t));
            assert!(frame.event.is_none());
        }

        // Move the wrist at ~0.6 m/s
        let mut wrist_x = 0.0;
        for i in 0..3 {
            t += FRAME_DT;
            wrist_x += 0.02;
            let frame = processor.process_sample(&arm_sample(t, wrist_x));
            if i < 2 {
                assert!(frame.event.is_none());
                assert_eq!(processor.state(), GestureState::Ready);
            } else {
                match frame.event {
                    Some(GestureEvent::MotionDetected { wrist_speed, .. }) => {
                        assert!(wrist_speed > 0.15);
                    }
                    other => panic!("expected motion_detected, got {:?}", other),
                }
            }
        }
        assert_eq!(processor.state(), GestureState::Capturing);
        t
    }

    #[test]
    fn test_ready_pose_detected_on_fifth_frame() {
        let mut processor = processor();
        drive_to_ready(&mut processor, 2.0);
    }

    #[test]
    fn test_ready_counter_resets_on_broken_pose() {
        let mut processor = processor();
        let start = 2.0;
        for i in 0..4 {
            processor.process_sample(&ready_sample(start + i as f64 * FRAME_DT));
        }
        // One broken frame zeroes the streak
        processor.process_sample(&idle_sample(start + 4.0 * FRAME_DT));
        for i in 5..9 {
            let frame = processor.process_sample(&ready_sample(start + i as f64 * FRAME_DT));
            assert!(frame.event.is_none());
            assert_eq!(processor.state(), GestureState::Waiting);
        }
    }

    #[test]
    fn test_cooldown_defers_ready_transition() {
        let mut processor = processor();
        // Timestamps inside the initial cooldown window
        for i in 0..8 {
            let frame = processor.process_sample(&ready_sample(0.2 + i as f64 * FRAME_DT));
            assert!(frame.event.is_none());
            assert_eq!(processor.state(), GestureState::Waiting);
        }
        // First frame past the cooldown flips the armed streak into READY
        let frame = processor.process_sample(&ready_sample(1.05));
        assert!(matches!(
            frame.event,
            Some(GestureEvent::ReadyPoseDetected { .. })
        ));
    }

    #[test]
    fn test_motion_detected_on_third_frame() {
        let mut processor = processor();
        let ready_at = drive_to_ready(&mut processor, 2.0);
        drive_to_capturing(&mut processor, ready_at);
    }

    #[test]
    fn test_capture_completes_with_exact_cap() {
        let mut processor = processor();
        let ready_at = drive_to_ready(&mut processor, 2.0);
        let mut t = drive_to_capturing(&mut processor, ready_at);

        // Buffer was seeded with one frame at the transition; nine more
        // fill it
        let mut wrist_x = 0.06;
        for i in 0..9 {
            t += FRAME_DT;
            wrist_x += 0.02;
            let frame = processor.process_sample(&arm_sample(t, wrist_x));
            if i < 8 {
                assert!(frame.event.is_none());
                assert_eq!(processor.state(), GestureState::Capturing);
            } else {
                match frame.event {
                    Some(GestureEvent::CaptureComplete { frames, .. }) => {
                        assert_eq!(frames.len(), 10);
                    }
                    other => panic!("expected capture_complete, got {:?}", other),
                }
            }
        }
        assert_eq!(processor.state(), GestureState::Classifying);

        // Next frame stamps the cooldown and resets to WAITING, no event
        t += FRAME_DT;
        let frame = processor.process_sample(&arm_sample(t, 0.26));
        assert!(frame.event.is_none());
        assert_eq!(processor.state(), GestureState::Waiting);
        assert_eq!(frame.status.unwrap().buffered_frames, 0);
    }

    #[test]
    fn test_ready_timeout_returns_to_waiting() {
        let mut processor = processor();
        let ready_at = drive_to_ready(&mut processor, 2.0);

        // Hold still past the timeout
        let mut t = ready_at;
        let mut saw_timeout = false;
        while t < ready_at + 3.2 {
            t += FRAME_DT;
            let frame = processor.process_sample(&ready_sample(t));
            if let Some(GestureEvent::ReadyPoseTimeout { .. }) = frame.event {
                saw_timeout = true;
                break;
            }
        }
        assert!(saw_timeout, "ready pose never timed out");
        assert_eq!(processor.state(), GestureState::Waiting);

        // Counters restarted: four more ready frames do not re-arm
        let base = t + FRAME_DT;
        for i in 0..4 {
            let frame = processor.process_sample(&ready_sample(base + i as f64 * FRAME_DT));
            assert!(frame.event.is_none());
            assert_eq!(processor.state(), GestureState::Waiting);
        }
    }

    #[test]
    fn test_capturing_requires_ready_first() {
        let mut processor = processor();
        // Fast wrist motion while never holding the ready pose
        for i in 0..30 {
            let t = 2.0 + i as f64 * FRAME_DT;
            processor.process_sample(&idle_sample(t));
            assert_ne!(processor.state(), GestureState::Capturing);
            assert_ne!(processor.state(), GestureState::Classifying);
        }
        assert_eq!(processor.state(), GestureState::Waiting);
    }

    #[test]
    fn test_no_body_reset_after_grace() {
        let mut processor = processor();
        let ready_at = drive_to_ready(&mut processor, 2.0);

        let mut t = ready_at;
        for i in 0..4 {
            t += FRAME_DT;
            let frame = processor.process_sample(&untracked_sample(t));
            // Output suppressed while the body is missing
            assert!(frame.status.is_none());
            if i == 0 {
                assert!(matches!(
                    frame.event,
                    Some(GestureEvent::BodyStatusChanged { tracked: false, .. })
                ));
            } else {
                assert!(frame.event.is_none());
            }
        }
        assert_eq!(processor.state(), GestureState::Waiting);

        // Body returns: status resumes and the flip is reported
        t += FRAME_DT;
        let frame = processor.process_sample(&ready_sample(t));
        assert!(frame.status.is_some());
        assert!(matches!(
            frame.event,
            Some(GestureEvent::BodyStatusChanged { tracked: true, .. })
        ));
    }

    #[test]
    fn test_short_gap_does_not_reset() {
        let mut processor = processor();
        let ready_at = drive_to_ready(&mut processor, 2.0);

        let mut t = ready_at;
        for _ in 0..3 {
            t += FRAME_DT;
            processor.process_sample(&untracked_sample(t));
        }
        // Three missing frames stay inside the grace period
        assert_eq!(processor.state(), GestureState::Ready);
    }

    #[test]
    fn test_startup_grace_discards_samples() {
        let mut config = test_config();
        config.source.startup_grace_frames = 8;
        let mut processor = GestureProcessor::new(config);

        for i in 0..8 {
            let frame = processor.process_sample(&ready_sample(i as f64 * FRAME_DT));
            assert!(frame.status.is_none());
            assert!(frame.event.is_none());
        }
        let frame = processor.process_sample(&ready_sample(8.0 * FRAME_DT));
        assert!(frame.status.is_some());
    }

    #[test]
    fn test_regressing_timestamp_skipped() {
        let mut processor = processor();
        processor.process_sample(&ready_sample(5.0));
        let frame = processor.process_sample(&ready_sample(4.0));
        assert!(frame.status.is_none());
        assert!(frame.event.is_none());
        // Stream continues normally afterwards
        let frame = processor.process_sample(&ready_sample(5.1));
        assert!(frame.status.is_some());
    }

    #[test]
    fn test_status_snapshot_fields() {
        let mut processor = processor();
        let frame = processor.process_sample(&ready_sample(2.0));
        let status = frame.status.unwrap();
        assert_eq!(status.state, GestureState::Waiting);
        assert!(status.ready_pose);
        assert!(status.extension_ratio > 0.9);
        assert!((status.torso_arm_angle - 90.0).abs() < 5.0);
        assert_eq!(status.wrist_pelvis_angle, 0.0);
        assert!(status.forward_dot > 0.5);
        assert_eq!(status.buffered_frames, 0);
    }
}
