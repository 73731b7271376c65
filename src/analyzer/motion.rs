use crate::config::MotionConfig;
use crate::keypoint::ArmJoints;
use nalgebra::Vector3;
use std::collections::VecDeque;
use tracing::trace;

/// Per-joint first or second derivative of the smoothed joint triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointDerivatives {
    pub shoulder: Vector3<f32>,
    pub elbow: Vector3<f32>,
    pub wrist: Vector3<f32>,
}

/// Output of one [`MotionState::update`] call
#[derive(Debug, Clone)]
pub struct MotionFrame {
    /// Exponentially smoothed joint triple
    pub smoothed: ArmJoints,
    /// Per-joint velocity, present once two timestamps exist
    pub velocities: Option<JointDerivatives>,
    /// Per-joint acceleration, present once two velocity estimates exist
    pub accelerations: Option<JointDerivatives>,
    /// Wrist speed magnitude in m/s (0 until velocity is available)
    pub wrist_speed: f32,
    /// Whether the frame carries deliberate motion
    pub motion_detected: bool,
}

/// All rolling motion state owned by the pipeline instance.
///
/// Holds the smoothing state, previous-sample references, and bounded
/// wrist-speed/acceleration histories. Nothing in here is shared; the
/// pipeline publishes read-only snapshots instead.
pub struct MotionState {
    config: MotionConfig,
    smoothing_alpha: f32,
    last_valid: Option<ArmJoints>,
    prev_smoothed: Option<ArmJoints>,
    prev_time: Option<f64>,
    prev_velocities: Option<JointDerivatives>,
    speed_history: VecDeque<f32>,
    accel_history: VecDeque<f32>,
    motion_detected: bool,
}

impl MotionState {
    pub fn new(smoothing_alpha: f32, config: MotionConfig) -> Self {
        let capacity = config.history_capacity;
        Self {
            config,
            smoothing_alpha,
            last_valid: None,
            prev_smoothed: None,
            prev_time: None,
            prev_velocities: None,
            speed_history: VecDeque::with_capacity(capacity),
            accel_history: VecDeque::with_capacity(capacity),
            motion_detected: false,
        }
    }

    /// Smooth the raw joints and advance velocity/acceleration estimates.
    ///
    /// Derivatives are finite differences between consecutive smoothed
    /// samples; a non-positive elapsed time skips the derivative update for
    /// this frame (stale timestamp guard) and leaves the previous motion
    /// decision in place.
    pub fn update(&mut self, raw: &ArmJoints, timestamp: f64) -> MotionFrame {
        let smoothed = match self.last_valid {
            Some(prev) => self.smooth(&prev, raw),
            None => *raw,
        };
        self.last_valid = Some(smoothed);

        let mut velocities = None;
        let mut accelerations = None;
        let mut wrist_speed = 0.0;

        if let (Some(prev), Some(prev_time)) = (self.prev_smoothed, self.prev_time) {
            let dt = timestamp - prev_time;
            if dt > 0.0 {
                let vel = derive(&prev, &smoothed, dt);
                if let Some(prev_vel) = self.prev_velocities {
                    let acc = JointDerivatives {
                        shoulder: (vel.shoulder - prev_vel.shoulder) / dt as f32,
                        elbow: (vel.elbow - prev_vel.elbow) / dt as f32,
                        wrist: (vel.wrist - prev_vel.wrist) / dt as f32,
                    };
                    push_bounded(
                        &mut self.accel_history,
                        acc.wrist.norm(),
                        self.config.history_capacity,
                    );
                    accelerations = Some(acc);
                }

                wrist_speed = vel.wrist.norm();
                self.motion_detected = self.detect_motion(wrist_speed);
                self.prev_velocities = Some(vel);
                velocities = Some(vel);
            } else {
                trace!("Stale timestamp (dt = {:.4}s), skipping derivatives", dt);
            }
        }

        self.prev_smoothed = Some(smoothed);
        self.prev_time = Some(timestamp);

        MotionFrame {
            smoothed,
            velocities,
            accelerations,
            wrist_speed,
            motion_detected: self.motion_detected,
        }
    }

    /// Most recent wrist speed sample, for status reporting
    pub fn current_speed(&self) -> f32 {
        self.speed_history.back().copied().unwrap_or(0.0)
    }

    /// Clear the rolling histories and the motion decision.
    ///
    /// The smoothing state survives a reset so the filter does not restart
    /// from scratch when the state machine returns to WAITING.
    pub fn reset_history(&mut self) {
        self.speed_history.clear();
        self.accel_history.clear();
        self.prev_velocities = None;
        self.motion_detected = false;
    }

    fn smooth(&self, prev: &ArmJoints, raw: &ArmJoints) -> ArmJoints {
        let alpha = self.smoothing_alpha;
        let blend =
            |old: Vector3<f32>, new: Vector3<f32>| old * alpha + new * (1.0 - alpha);
        ArmJoints::new(
            blend(prev.shoulder, raw.shoulder),
            blend(prev.elbow, raw.elbow),
            blend(prev.wrist, raw.wrist),
        )
    }

    /// Motion holds when the wrist speed clears the absolute floor, or when
    /// it spikes past the previous sample by the configured ratio (catches
    /// acceleration onset still below the floor).
    fn detect_motion(&mut self, wrist_speed: f32) -> bool {
        let previous = self.speed_history.back().copied();
        push_bounded(
            &mut self.speed_history,
            wrist_speed,
            self.config.history_capacity,
        );

        let above_floor = wrist_speed > self.config.min_velocity;
        let spiked = previous
            .map(|prev| wrist_speed > prev * self.config.velocity_spike_ratio)
            .unwrap_or(false);

        above_floor || spiked
    }
}

fn derive(prev: &ArmJoints, current: &ArmJoints, dt: f64) -> JointDerivatives {
    let dt = dt as f32;
    JointDerivatives {
        shoulder: (current.shoulder - prev.shoulder) / dt,
        elbow: (current.elbow - prev.elbow) / dt,
        wrist: (current.wrist - prev.wrist) / dt,
    }
}

fn push_bounded(history: &mut VecDeque<f32>, value: f32, capacity: usize) {
    if history.len() == capacity {
        history.pop_front();
    }
    history.push_back(value);
}
