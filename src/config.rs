use crate::keypoint::BodyRegion;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GesturecamConfig {
    pub source: SourceConfig,
    pub pose: PoseConfig,
    pub motion: MotionConfig,
    pub capture: CaptureConfig,
    pub classifier: ClassifierConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    /// Nominal sample rate of the keypoint source in Hz
    #[serde(default = "default_source_fps")]
    pub fps: u32,

    /// Body region whose joint triple feeds the pipeline
    #[serde(default = "default_source_region")]
    pub region: BodyRegion,

    /// Samples discarded after startup before the state machine runs
    #[serde(default = "default_startup_grace_frames")]
    pub startup_grace_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PoseConfig {
    /// Weight of the previous smoothed joints in the EMA (new sample gets 1 - alpha)
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f32,

    /// Minimum shoulder-wrist / arm-length ratio for an extended arm
    #[serde(default = "default_min_extension_ratio")]
    pub min_extension_ratio: f32,

    /// Lower bound of the torso-arm angle window in degrees
    #[serde(default = "default_torso_arm_angle_min")]
    pub torso_arm_angle_min: f32,

    /// Upper bound of the torso-arm angle window in degrees
    #[serde(default = "default_torso_arm_angle_max")]
    pub torso_arm_angle_max: f32,

    /// Minimum dot product of the arm direction with camera-forward
    #[serde(default = "default_min_forward_dot")]
    pub min_forward_dot: f32,

    /// Consecutive ready-pose frames required to arm the pipeline
    #[serde(default = "default_ready_pose_frames")]
    pub ready_pose_frames: u32,

    /// Consecutive untracked frames before a full reset
    #[serde(default = "default_no_body_reset_frames")]
    pub no_body_reset_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Wrist speed in m/s that counts as deliberate motion
    #[serde(default = "default_min_velocity")]
    pub min_velocity: f32,

    /// Speed-over-previous-speed ratio that signals acceleration onset
    #[serde(default = "default_velocity_spike_ratio")]
    pub velocity_spike_ratio: f32,

    /// Consecutive motion frames required to start capturing
    #[serde(default = "default_motion_detect_frames")]
    pub motion_detect_frames: u32,

    /// Rolling velocity/acceleration history length
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Feature frames collected per gesture capture
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,

    /// Minimum seconds after a completed gesture before a new one may begin
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,

    /// Seconds after entering READY during which motion is ignored
    #[serde(default = "default_settle_seconds")]
    pub settle_seconds: f64,

    /// Seconds in READY without motion before falling back to WAITING
    #[serde(default = "default_ready_timeout_seconds")]
    pub ready_timeout_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Frames per scoring window (must match the trained scorer)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Maximum overlapping windows evaluated per capture
    #[serde(default = "default_max_windows")]
    pub max_windows: usize,

    /// Minimum average confidence for a sliding-window decision
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Minimum windows agreeing on the majority label
    #[serde(default = "default_window_consistency")]
    pub window_consistency: usize,

    /// Multiplier applied to a label equal to the previous decision
    #[serde(default = "default_diversity_penalty")]
    pub diversity_penalty: f32,

    /// Confidence below which a result is presented as unclear
    #[serde(default = "default_min_result_confidence")]
    pub min_result_confidence: f32,

    /// Gesture labels in scorer output order
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Captured windows queued for classification before backpressure
    #[serde(default = "default_classify_queue_capacity")]
    pub classify_queue_capacity: usize,
}

impl GesturecamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("gesturecam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("source.fps", default_source_fps())?
            .set_default("source.region", "RightArm")?
            .set_default("source.startup_grace_frames", default_startup_grace_frames())?
            .set_default("pose.smoothing_alpha", default_smoothing_alpha() as f64)?
            .set_default(
                "pose.min_extension_ratio",
                default_min_extension_ratio() as f64,
            )?
            .set_default(
                "pose.torso_arm_angle_min",
                default_torso_arm_angle_min() as f64,
            )?
            .set_default(
                "pose.torso_arm_angle_max",
                default_torso_arm_angle_max() as f64,
            )?
            .set_default("pose.min_forward_dot", default_min_forward_dot() as f64)?
            .set_default("pose.ready_pose_frames", default_ready_pose_frames())?
            .set_default("pose.no_body_reset_frames", default_no_body_reset_frames())?
            .set_default("motion.min_velocity", default_min_velocity() as f64)?
            .set_default(
                "motion.velocity_spike_ratio",
                default_velocity_spike_ratio() as f64,
            )?
            .set_default("motion.motion_detect_frames", default_motion_detect_frames())?
            .set_default(
                "motion.history_capacity",
                default_history_capacity() as i64,
            )?
            .set_default("capture.max_frames", default_max_frames() as i64)?
            .set_default("capture.cooldown_seconds", default_cooldown_seconds())?
            .set_default("capture.settle_seconds", default_settle_seconds())?
            .set_default(
                "capture.ready_timeout_seconds",
                default_ready_timeout_seconds(),
            )?
            .set_default("classifier.window_size", default_window_size() as i64)?
            .set_default("classifier.max_windows", default_max_windows() as i64)?
            .set_default(
                "classifier.confidence_threshold",
                default_confidence_threshold() as f64,
            )?
            .set_default(
                "classifier.window_consistency",
                default_window_consistency() as i64,
            )?
            .set_default(
                "classifier.diversity_penalty",
                default_diversity_penalty() as f64,
            )?
            .set_default(
                "classifier.min_result_confidence",
                default_min_result_confidence() as f64,
            )?
            .set_default("classifier.labels", default_labels())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.classify_queue_capacity",
                default_classify_queue_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with GESTURECAM_ prefix
            .add_source(Environment::with_prefix("GESTURECAM").separator("_"))
            .build()?;

        let config: GesturecamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.fps == 0 {
            return Err(ConfigError::Message(
                "Source fps must be greater than 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.pose.smoothing_alpha) {
            return Err(ConfigError::Message(
                "Smoothing alpha must be in [0, 1)".to_string(),
            ));
        }

        if self.pose.min_extension_ratio <= 0.0 {
            return Err(ConfigError::Message(
                "Minimum extension ratio must be greater than 0".to_string(),
            ));
        }

        if self.pose.torso_arm_angle_min >= self.pose.torso_arm_angle_max {
            return Err(ConfigError::Message(
                "Torso-arm angle window must have min < max".to_string(),
            ));
        }

        if self.pose.ready_pose_frames == 0 {
            return Err(ConfigError::Message(
                "Ready pose frame count must be greater than 0".to_string(),
            ));
        }

        if self.motion.motion_detect_frames == 0 {
            return Err(ConfigError::Message(
                "Motion detect frame count must be greater than 0".to_string(),
            ));
        }

        if self.motion.history_capacity == 0 {
            return Err(ConfigError::Message(
                "Velocity history capacity must be greater than 0".to_string(),
            ));
        }

        if self.capture.max_frames == 0 {
            return Err(ConfigError::Message(
                "Capture frame cap must be greater than 0".to_string(),
            ));
        }

        if self.classifier.window_size == 0 {
            return Err(ConfigError::Message(
                "Classifier window size must be greater than 0".to_string(),
            ));
        }

        if self.classifier.max_windows == 0 {
            return Err(ConfigError::Message(
                "Classifier max windows must be greater than 0".to_string(),
            ));
        }

        if self.classifier.window_consistency > self.classifier.max_windows {
            return Err(ConfigError::Message(
                "Window consistency cannot exceed max windows".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.classifier.diversity_penalty) {
            return Err(ConfigError::Message(
                "Diversity penalty must be in [0, 1]".to_string(),
            ));
        }

        if self.classifier.labels.is_empty() {
            return Err(ConfigError::Message(
                "Classifier label set must not be empty".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.classify_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Classify queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for GesturecamConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                fps: default_source_fps(),
                region: default_source_region(),
                startup_grace_frames: default_startup_grace_frames(),
            },
            pose: PoseConfig {
                smoothing_alpha: default_smoothing_alpha(),
                min_extension_ratio: default_min_extension_ratio(),
                torso_arm_angle_min: default_torso_arm_angle_min(),
                torso_arm_angle_max: default_torso_arm_angle_max(),
                min_forward_dot: default_min_forward_dot(),
                ready_pose_frames: default_ready_pose_frames(),
                no_body_reset_frames: default_no_body_reset_frames(),
            },
            motion: MotionConfig {
                min_velocity: default_min_velocity(),
                velocity_spike_ratio: default_velocity_spike_ratio(),
                motion_detect_frames: default_motion_detect_frames(),
                history_capacity: default_history_capacity(),
            },
            capture: CaptureConfig {
                max_frames: default_max_frames(),
                cooldown_seconds: default_cooldown_seconds(),
                settle_seconds: default_settle_seconds(),
                ready_timeout_seconds: default_ready_timeout_seconds(),
            },
            classifier: ClassifierConfig {
                window_size: default_window_size(),
                max_windows: default_max_windows(),
                confidence_threshold: default_confidence_threshold(),
                window_consistency: default_window_consistency(),
                diversity_penalty: default_diversity_penalty(),
                min_result_confidence: default_min_result_confidence(),
                labels: default_labels(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                classify_queue_capacity: default_classify_queue_capacity(),
            },
        }
    }
}

// Default value functions
fn default_source_fps() -> u32 {
    30
}
fn default_source_region() -> BodyRegion {
    BodyRegion::RightArm
}
fn default_startup_grace_frames() -> u32 {
    8
}

fn default_smoothing_alpha() -> f32 {
    0.3
}
fn default_min_extension_ratio() -> f32 {
    0.65
}
fn default_torso_arm_angle_min() -> f32 {
    80.0
}
fn default_torso_arm_angle_max() -> f32 {
    130.0
}
fn default_min_forward_dot() -> f32 {
    0.5
}
fn default_ready_pose_frames() -> u32 {
    5
}
fn default_no_body_reset_frames() -> u32 {
    3
}

fn default_min_velocity() -> f32 {
    0.15
}
fn default_velocity_spike_ratio() -> f32 {
    3.0
}
fn default_motion_detect_frames() -> u32 {
    3
}
fn default_history_capacity() -> usize {
    10
}

fn default_max_frames() -> usize {
    10
}
fn default_cooldown_seconds() -> f64 {
    1.0
}
fn default_settle_seconds() -> f64 {
    1.0
}
fn default_ready_timeout_seconds() -> f64 {
    3.0
}

fn default_window_size() -> usize {
    7
}
fn default_max_windows() -> usize {
    5
}
fn default_confidence_threshold() -> f32 {
    0.5
}
fn default_window_consistency() -> usize {
    3
}
fn default_diversity_penalty() -> f32 {
    0.0
}
fn default_min_result_confidence() -> f32 {
    0.5
}
fn default_labels() -> Vec<String> {
    vec![
        "left_swipe".to_string(),
        "right_swipe".to_string(),
        "up_swipe".to_string(),
        "down_swipe".to_string(),
    ]
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_classify_queue_capacity() -> usize {
    4
}
