use crate::analyzer::{JointDerivatives, DEGENERATE_EPSILON};
use crate::keypoint::ArmJoints;
use nalgebra::Vector3;
use serde::de::{Error as DeError, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Index;

/// Length of every feature vector; fixed by the trained scorer's input shape
pub const FEATURE_DIM: usize = 70;

/// Column indices of the feature schema.
///
/// The order is load-bearing: an externally trained scorer consumes the
/// vector positionally. Vector-valued groups store x, y, z at consecutive
/// indices starting from the named constant.
pub mod columns {
    // Group 1: positions relative to the shoulder (shoulder row is zero by
    // construction)
    pub const REL_SHOULDER: usize = 0;
    pub const REL_ELBOW: usize = 3;
    pub const REL_WRIST: usize = 6;

    // Group 2: elbow joint angle (radians) and its angular velocity
    // (reserved, no multi-frame estimate available)
    pub const ELBOW_ANGLE: usize = 9;
    pub const ELBOW_ANGULAR_VELOCITY: usize = 10;

    // Group 3: first/second/third derivatives per joint
    pub const VEL_SHOULDER: usize = 11;
    pub const VEL_ELBOW: usize = 14;
    pub const VEL_WRIST: usize = 17;
    pub const ACC_SHOULDER: usize = 20;
    pub const ACC_ELBOW: usize = 23;
    pub const ACC_WRIST: usize = 26;
    pub const JERK_SHOULDER: usize = 29;
    pub const JERK_ELBOW: usize = 32;
    pub const JERK_WRIST: usize = 35;

    // Group 4: scalar magnitudes and the wrist path-length placeholder
    pub const SPEED_ELBOW: usize = 38;
    pub const SPEED_WRIST: usize = 39;
    pub const ACC_MAG_ELBOW: usize = 40;
    pub const ACC_MAG_WRIST: usize = 41;
    pub const WRIST_PATH_LENGTH: usize = 42;

    // Group 5: derived shape descriptors
    pub const STRAIGHTNESS: usize = 43;
    pub const PLANARITY: usize = 44;
    pub const PEAK_SPEED: usize = 45;
    pub const AVG_SPEED: usize = 46;
    pub const SPEED_VARIABILITY: usize = 47;
    pub const DIRECTION_CHANGES: usize = 48;
    pub const VERTICAL_EXTENT: usize = 49;
    pub const HORIZONTAL_EXTENT: usize = 50;
    pub const VERTICAL_HORIZONTAL_RATIO: usize = 51;
    pub const TOTAL_DISPLACEMENT: usize = 52;
    pub const PATH_LENGTH: usize = 53;

    // Group 6: directional descriptors, reserved (zero) in single-frame mode
    // so the vector length matches the trained scorer's input shape
    pub const WRIST_END_REL_TORSO: usize = 54;
    pub const MOVEMENT_DIR: usize = 57;
    pub const HORIZ_VERT_RATIO: usize = 60;
    pub const DOMINANT_XY: usize = 61;
    pub const DOMINANT_YZ: usize = 62;
    pub const DOMINANT_XZ: usize = 63;
    pub const END_RIGHT: usize = 64;
    pub const END_UP: usize = 65;
    pub const END_FORWARD: usize = 66;
    pub const DIRECTIONAL_CLARITY: usize = 67;
    pub const ANGLE_FROM_HORIZONTAL: usize = 68;
    pub const ANGLE_IN_HORIZONTAL: usize = 69;
}

/// One frame's fixed-length semantic feature vector.
///
/// Always exactly [`FEATURE_DIM`] elements and always finite.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector([f32; FEATURE_DIM]);

impl FeatureVector {
    pub fn zeroed() -> Self {
        Self([0.0; FEATURE_DIM])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        FEATURE_DIM
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn set(&mut self, index: usize, value: f32) {
        self.0[index] = value;
    }

    fn set_vec3(&mut self, start: usize, value: Vector3<f32>) {
        self.0[start] = value.x;
        self.0[start + 1] = value.y;
        self.0[start + 2] = value.z;
    }

    /// Replace every NaN/Inf with 0.0
    fn sanitize(&mut self) {
        for value in self.0.iter_mut() {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
    }
}

impl Index<usize> for FeatureVector {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.0[index]
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FeatureVectorVisitor;

        impl<'de> Visitor<'de> for FeatureVectorVisitor {
            type Value = FeatureVector;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a sequence of {} floats", FEATURE_DIM)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = [0.0f32; FEATURE_DIM];
                for (i, slot) in values.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| A::Error::invalid_length(i, &self))?;
                }
                if seq.next_element::<f32>()?.is_some() {
                    return Err(A::Error::invalid_length(FEATURE_DIM + 1, &self));
                }
                Ok(FeatureVector(values))
            }
        }

        deserializer.deserialize_seq(FeatureVectorVisitor)
    }
}

/// Maps one smoothed sample plus optional derivative estimates into the
/// fixed feature schema.
///
/// Quantities that need more than a single frame (jerk, path statistics,
/// the directional group) stay 0.0 so the output shape always matches the
/// trained scorer. This function cannot fail; degenerate inputs fall back
/// to zeros.
#[derive(Debug, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(
        &self,
        joints: &ArmJoints,
        velocities: Option<&JointDerivatives>,
        accelerations: Option<&JointDerivatives>,
    ) -> FeatureVector {
        let mut features = FeatureVector::zeroed();

        // The scorer was trained on x-mirrored data; negate x consistently
        // for positions and supplied derivatives
        let shoulder = mirror_x(joints.shoulder);
        let elbow = mirror_x(joints.elbow);
        let wrist = mirror_x(joints.wrist);

        let rel_elbow = elbow - shoulder;
        let rel_wrist = wrist - shoulder;
        let forearm = wrist - elbow;

        // REL_SHOULDER stays zero by construction
        features.set_vec3(columns::REL_ELBOW, rel_elbow);
        features.set_vec3(columns::REL_WRIST, rel_wrist);

        features.set(columns::ELBOW_ANGLE, angle_between(rel_elbow, forearm));

        if let Some(vel) = velocities {
            let (v_shoulder, v_elbow, v_wrist) =
                (mirror_x(vel.shoulder), mirror_x(vel.elbow), mirror_x(vel.wrist));
            features.set_vec3(columns::VEL_SHOULDER, v_shoulder);
            features.set_vec3(columns::VEL_ELBOW, v_elbow);
            features.set_vec3(columns::VEL_WRIST, v_wrist);
            features.set(columns::SPEED_ELBOW, v_elbow.norm());
            features.set(columns::SPEED_WRIST, v_wrist.norm());
        }

        if let Some(acc) = accelerations {
            let (a_shoulder, a_elbow, a_wrist) =
                (mirror_x(acc.shoulder), mirror_x(acc.elbow), mirror_x(acc.wrist));
            features.set_vec3(columns::ACC_SHOULDER, a_shoulder);
            features.set_vec3(columns::ACC_ELBOW, a_elbow);
            features.set_vec3(columns::ACC_WRIST, a_wrist);
            features.set(columns::ACC_MAG_ELBOW, a_elbow.norm());
            features.set(columns::ACC_MAG_WRIST, a_wrist.norm());
        }

        // Jerk columns stay zero: no third-derivative data from one frame

        // Shape descriptors derivable from the current sample; the speed
        // statistics collapse to the instantaneous wrist speed
        let wrist_speed = features[columns::SPEED_WRIST];
        features.set(columns::PEAK_SPEED, wrist_speed);
        features.set(columns::AVG_SPEED, wrist_speed);

        let vertical_extent = rel_wrist.y.abs();
        let horizontal_extent = (rel_wrist.x * rel_wrist.x + rel_wrist.z * rel_wrist.z).sqrt();
        features.set(columns::VERTICAL_EXTENT, vertical_extent);
        features.set(columns::HORIZONTAL_EXTENT, horizontal_extent);
        if horizontal_extent > DEGENERATE_EPSILON {
            features.set(
                columns::VERTICAL_HORIZONTAL_RATIO,
                vertical_extent / horizontal_extent,
            );
        }
        features.set(columns::TOTAL_DISPLACEMENT, rel_wrist.norm());
        features.set(columns::PATH_LENGTH, rel_elbow.norm() + forearm.norm());

        // Directional group stays zero in single-frame mode

        features.sanitize();
        features
    }
}

fn mirror_x(v: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(-v.x, v.y, v.z)
}

/// Unclamped-input-safe angle between two vectors, in radians
fn angle_between(a: Vector3<f32>, b: Vector3<f32>) -> f32 {
    let (la, lb) = (a.norm(), b.norm());
    if la <= DEGENERATE_EPSILON || lb <= DEGENERATE_EPSILON {
        return 0.0;
    }
    (a.dot(&b) / (la * lb)).clamp(-1.0, 1.0).acos()
}
