use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Joint values with all axes below this magnitude signal "untracked"
pub const UNTRACKED_EPSILON: f32 = 1e-3;

/// Skeleton index of the pelvis joint in the full-body keypoint set
pub const PELVIS_INDEX: usize = 0;

/// Named body regions a keypoint source can be asked to track.
///
/// Index triples follow the 38-joint skeleton layout of the tracking
/// hardware: (shoulder, elbow, wrist).
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum BodyRegion {
    RightArm,
    LeftArm,
}

impl BodyRegion {
    /// Skeleton joint indices for this region as (shoulder, elbow, wrist)
    pub fn joint_indices(&self) -> [usize; 3] {
        match self {
            BodyRegion::RightArm => [13, 15, 17],
            BodyRegion::LeftArm => [12, 14, 16],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BodyRegion::RightArm => "right_arm",
            BodyRegion::LeftArm => "left_arm",
        }
    }
}

/// The ordered shoulder/elbow/wrist triple of one arm, in meters
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct ArmJoints {
    pub shoulder: Vector3<f32>,
    pub elbow: Vector3<f32>,
    pub wrist: Vector3<f32>,
}

impl ArmJoints {
    pub fn new(shoulder: Vector3<f32>, elbow: Vector3<f32>, wrist: Vector3<f32>) -> Self {
        Self {
            shoulder,
            elbow,
            wrist,
        }
    }

    /// Build a joint triple from a flat `[x, y, z] * 3` slice.
    ///
    /// Returns `None` when the slice does not hold exactly nine values;
    /// callers skip the frame rather than propagate a malformed shape.
    pub fn from_raw(values: &[f32]) -> Option<Self> {
        if values.len() != 9 {
            return None;
        }
        Some(Self {
            shoulder: Vector3::new(values[0], values[1], values[2]),
            elbow: Vector3::new(values[3], values[4], values[5]),
            wrist: Vector3::new(values[6], values[7], values[8]),
        })
    }

    /// Whether any joint carries a real (non-zero) position
    pub fn is_tracked(&self) -> bool {
        [&self.shoulder, &self.elbow, &self.wrist]
            .iter()
            .any(|j| j.iter().any(|v| v.abs() >= UNTRACKED_EPSILON))
    }
}

/// One timestamped observation from a keypoint source.
///
/// Immutable after creation; consumed synchronously by the pipeline and
/// then discarded (only derived smoothed state persists).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct KeypointSample {
    /// Monotonic seconds
    pub timestamp: f64,
    /// Shoulder/elbow/wrist triple of the tracked region
    pub joints: ArmJoints,
    /// Optional full-body snapshot, used only for the pelvis reference
    #[serde(default)]
    pub full_body: Option<Vec<Vector3<f32>>>,
}

impl KeypointSample {
    pub fn new(timestamp: f64, joints: ArmJoints) -> Self {
        Self {
            timestamp,
            joints,
            full_body: None,
        }
    }

    pub fn with_full_body(mut self, full_body: Vec<Vector3<f32>>) -> Self {
        self.full_body = Some(full_body);
        self
    }

    /// Pelvis position from the full-body snapshot, if tracked
    pub fn pelvis(&self) -> Option<Vector3<f32>> {
        let body = self.full_body.as_ref()?;
        let pelvis = body.get(PELVIS_INDEX)?;
        if pelvis.iter().any(|v| v.abs() >= UNTRACKED_EPSILON) {
            Some(*pelvis)
        } else {
            None
        }
    }
}
