mod motion;
mod pose;

pub use motion::{JointDerivatives, MotionFrame, MotionState};
pub use pose::{PoseAnalyzer, PoseMetrics, DEGENERATE_EPSILON};
