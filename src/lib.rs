pub mod config;
pub mod error;
pub mod events;
pub mod keypoint;
pub mod source;
pub mod analyzer;
pub mod features;
pub mod window;
pub mod processor;
pub mod classifier;
pub mod orchestration;

pub use config::GesturecamConfig;
pub use error::{GesturecamError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, GestureEvent};
pub use keypoint::{ArmJoints, BodyRegion, KeypointSample};
pub use source::{KeypointSource, MockKeypointSource, ReplayKeypointSource};
pub use analyzer::{JointDerivatives, MotionFrame, MotionState, PoseAnalyzer, PoseMetrics};
pub use features::{FeatureExtractor, FeatureVector, FEATURE_DIM};
pub use window::FrameWindow;
pub use processor::{GestureProcessor, GestureState, ProcessedFrame, StatusSnapshot};
pub use classifier::{
    ClassificationResult, GestureClassifier, GestureScorer, HeuristicDirectionScorer,
};
pub use orchestration::{GesturecamOrchestrator, ShutdownReason};
