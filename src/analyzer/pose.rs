use crate::config::PoseConfig;
use crate::keypoint::ArmJoints;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Vector lengths below this are treated as degenerate in ratio/angle math
pub const DEGENERATE_EPSILON: f32 = 1e-6;

/// Camera-forward direction in the tracking frame
const FORWARD: Vector3<f32> = Vector3::new(0.0, 0.0, -1.0);

/// Per-frame ready-pose decision plus the scalar diagnostics behind it
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct PoseMetrics {
    /// Whether the arm currently holds the ready pose
    pub ready_pose: bool,
    /// Straight-line shoulder-wrist distance over total arm length
    pub extension_ratio: f32,
    /// Angle between the torso (pelvis-shoulder) and arm (shoulder-wrist)
    /// vectors, in degrees; 0 when no pelvis reference is available
    pub torso_arm_angle: f32,
    /// Always 0. Kept as a separate field from `torso_arm_angle`; the
    /// ready-pose gate never reads it.
    pub wrist_pelvis_angle: f32,
    /// Dot product of the normalized arm vector with camera-forward
    pub forward_dot: f32,
}

impl PoseMetrics {
    fn none() -> Self {
        Self {
            ready_pose: false,
            extension_ratio: 0.0,
            torso_arm_angle: 0.0,
            wrist_pelvis_angle: 0.0,
            forward_dot: 0.0,
        }
    }
}

/// Decides per frame whether the smoothed arm holds the ready pose.
///
/// All thresholds come from [`PoseConfig`]; nothing here is hard-coded.
pub struct PoseAnalyzer {
    config: PoseConfig,
}

impl PoseAnalyzer {
    pub fn new(config: PoseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    /// Analyze one smoothed joint triple against the optional pelvis
    /// reference.
    ///
    /// Without a pelvis the torso-arm angle cannot be formed, so the frame
    /// can never qualify as ready; the arm-only diagnostics are still
    /// reported.
    pub fn analyze(&self, joints: &ArmJoints, pelvis: Option<Vector3<f32>>) -> PoseMetrics {
        let upper_arm = joints.elbow - joints.shoulder;
        let forearm = joints.wrist - joints.elbow;
        let arm_vec = joints.wrist - joints.shoulder;

        let arm_length = upper_arm.norm() + forearm.norm();
        let extension_ratio = if arm_length > DEGENERATE_EPSILON {
            arm_vec.norm() / arm_length
        } else {
            return PoseMetrics::none();
        };

        let torso_arm_angle = match pelvis {
            Some(pelvis) => angle_between_degrees(joints.shoulder - pelvis, arm_vec),
            None => 0.0,
        };

        let arm_norm = arm_vec.norm();
        let forward_dot = if arm_norm > DEGENERATE_EPSILON {
            (arm_vec / arm_norm).dot(&FORWARD)
        } else {
            0.0
        };

        let angle_ok = torso_arm_angle >= self.config.torso_arm_angle_min
            && torso_arm_angle <= self.config.torso_arm_angle_max;
        let ready_pose = pelvis.is_some()
            && extension_ratio >= self.config.min_extension_ratio
            && angle_ok
            && forward_dot > self.config.min_forward_dot;

        PoseMetrics {
            ready_pose,
            extension_ratio,
            torso_arm_angle,
            wrist_pelvis_angle: 0.0,
            forward_dot,
        }
    }
}

/// Angle between two vectors in degrees via the clamped cosine.
///
/// Degenerate (near-zero) vectors yield 0 rather than NaN.
fn angle_between_degrees(a: Vector3<f32>, b: Vector3<f32>) -> f32 {
    let (la, lb) = (a.norm(), b.norm());
    if la <= DEGENERATE_EPSILON || lb <= DEGENERATE_EPSILON {
        return 0.0;
    }
    let cos = (a.dot(&b) / (la * lb)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GesturecamConfig;

    fn analyzer() -> PoseAnalyzer {
        PoseAnalyzer::new(GesturecamConfig::default().pose)
    }

    /// Arm reaching camera-forward from the shoulder with a controllable
    /// extension ratio; torso vertical, so the torso-arm angle is 90 deg.
    fn arm_with_ratio(ratio: f32) -> (ArmJoints, Vector3<f32>) {
        let shoulder = Vector3::new(0.0, 1.5, -2.0);
        let wrist = shoulder + Vector3::new(0.0, 0.0, -0.6);
        // Bend the elbow sideways until upper arm + forearm sum to 0.6 / ratio
        let half = 0.3 / ratio;
        let offset = (half * half - 0.09_f32).max(0.0).sqrt();
        let elbow = shoulder + Vector3::new(offset, 0.0, -0.3);
        let pelvis = shoulder - Vector3::new(0.0, 0.6, 0.0);
        (ArmJoints::new(shoulder, elbow, wrist), pelvis)
    }

    #[test]
    fn test_extension_ratio_computation() {
        let (joints, pelvis) = arm_with_ratio(0.70);
        let metrics = analyzer().analyze(&joints, Some(pelvis));
        assert!((metrics.extension_ratio - 0.70).abs() < 1e-3);
        assert!((metrics.torso_arm_angle - 90.0).abs() < 1e-3);
        assert!((metrics.forward_dot - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ready_pose_monotonic_in_extension() {
        // Angle and forward-dot held at passing values; sweeping the ratio
        // upward across the threshold flips the predicate once, low to high
        let analyzer = analyzer();
        let mut was_ready = false;
        for ratio in [0.50, 0.60, 0.64, 0.66, 0.80, 0.95] {
            let (joints, pelvis) = arm_with_ratio(ratio);
            let metrics = analyzer.analyze(&joints, Some(pelvis));
            assert_eq!(metrics.ready_pose, ratio >= 0.65);
            assert!(
                metrics.ready_pose || !was_ready,
                "predicate flipped back to false at ratio {}",
                ratio
            );
            was_ready = metrics.ready_pose;
        }
    }

    #[test]
    fn test_ready_requires_pelvis() {
        let (joints, _) = arm_with_ratio(0.90);
        let metrics = analyzer().analyze(&joints, None);
        assert!(!metrics.ready_pose);
        assert_eq!(metrics.torso_arm_angle, 0.0);
        // Arm-only diagnostics still come through
        assert!(metrics.extension_ratio > 0.8);
    }

    #[test]
    fn test_angle_window_gates_ready() {
        // Arm pointing straight down-forward at 45 deg from vertical torso
        let shoulder = Vector3::new(0.0, 1.5, -2.0);
        let wrist = shoulder + Vector3::new(0.0, -0.42, -0.42);
        let elbow = shoulder + Vector3::new(0.0, -0.21, -0.21);
        let pelvis = shoulder - Vector3::new(0.0, 0.6, 0.0);
        let joints = ArmJoints::new(shoulder, elbow, wrist);

        let metrics = analyzer().analyze(&joints, Some(pelvis));
        assert!((metrics.torso_arm_angle - 135.0).abs() < 1.0);
        assert!(!metrics.ready_pose);
    }

    #[test]
    fn test_forward_dot_gates_ready() {
        // Fully extended sideways arm: ratio 1.0, angle 90, but no forward
        // component
        let shoulder = Vector3::new(0.0, 1.5, -2.0);
        let wrist = shoulder + Vector3::new(0.6, 0.0, 0.0);
        let elbow = shoulder + Vector3::new(0.3, 0.0, 0.0);
        let pelvis = shoulder - Vector3::new(0.0, 0.6, 0.0);
        let joints = ArmJoints::new(shoulder, elbow, wrist);

        let metrics = analyzer().analyze(&joints, Some(pelvis));
        assert!(metrics.extension_ratio > 0.99);
        assert!(metrics.forward_dot.abs() < 1e-5);
        assert!(!metrics.ready_pose);
    }

    #[test]
    fn test_degenerate_joints_yield_zeros() {
        let point = Vector3::new(0.1, 1.0, -1.0);
        let joints = ArmJoints::new(point, point, point);
        let metrics = analyzer().analyze(&joints, Some(Vector3::new(0.1, 0.4, -1.0)));
        assert_eq!(metrics.extension_ratio, 0.0);
        assert!(!metrics.ready_pose);
        assert!(metrics.extension_ratio.is_finite());
    }

    #[test]
    fn test_wrist_pelvis_angle_stays_zero() {
        let (joints, pelvis) = arm_with_ratio(0.85);
        let metrics = analyzer().analyze(&joints, Some(pelvis));
        assert_eq!(metrics.wrist_pelvis_angle, 0.0);
        assert!(metrics.torso_arm_angle > 0.0);
    }
}
