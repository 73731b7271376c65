use thiserror::Error;

#[derive(Error, Debug)]
pub enum GesturecamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Keypoint source error: {0}")]
    Source(#[from] SourceError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl GesturecamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors produced by keypoint sources (replay files, mocks, external devices)
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open sample source {path}: {details}")]
    Open { path: String, details: String },

    #[error("Malformed sample record at line {line}: {details}")]
    MalformedRecord { line: usize, details: String },

    #[error("Sample source disconnected: {details}")]
    Disconnected { details: String },
}

/// Errors from pose/motion analysis
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Non-monotonic timestamp: {current:.4} < {previous:.4}")]
    TimestampRegression { current: f64, previous: f64 },
}

/// Errors from the classification stage
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Scorer invocation failed: {details}")]
    ScorerFailed { details: String },

    #[error("Scorer returned {got} probabilities, expected {expected}")]
    LabelCountMismatch { expected: usize, got: usize },
}

/// Errors from the event bus
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, GesturecamError>;
