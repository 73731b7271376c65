use crate::classifier::ClassificationResult;
use crate::error::EventBusError;
use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events emitted by the gesture detection pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GestureEvent {
    /// The ready pose was held long enough to arm a capture
    ReadyPoseDetected { timestamp: SystemTime },
    /// The ready pose expired without sufficient motion
    ReadyPoseTimeout { timestamp: SystemTime },
    /// Deliberate motion confirmed, capture started
    MotionDetected {
        wrist_speed: f32,
        timestamp: SystemTime,
    },
    /// A full capture window was collected and handed to classification
    CaptureComplete {
        capture_id: String,
        frames: Vec<FeatureVector>,
        timestamp: SystemTime,
    },
    /// Classification finished for a captured window (None = no decision)
    ClassificationCompleted {
        capture_id: String,
        result: Option<ClassificationResult>,
        timestamp: SystemTime,
    },
    /// Body tracking acquired or lost
    BodyStatusChanged {
        tracked: bool,
        timestamp: SystemTime,
    },
    /// Pipeline shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl GestureEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            GestureEvent::ReadyPoseDetected { timestamp }
            | GestureEvent::ReadyPoseTimeout { timestamp }
            | GestureEvent::MotionDetected { timestamp, .. }
            | GestureEvent::CaptureComplete { timestamp, .. }
            | GestureEvent::ClassificationCompleted { timestamp, .. }
            | GestureEvent::BodyStatusChanged { timestamp, .. }
            | GestureEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            GestureEvent::ReadyPoseDetected { .. } => "Ready pose detected".to_string(),
            GestureEvent::ReadyPoseTimeout { .. } => {
                "Ready pose timed out without motion".to_string()
            }
            GestureEvent::MotionDetected { wrist_speed, .. } => {
                format!("Motion detected at {:.2} m/s", wrist_speed)
            }
            GestureEvent::CaptureComplete {
                capture_id, frames, ..
            } => {
                format!("Capture {} complete ({} frames)", capture_id, frames.len())
            }
            GestureEvent::ClassificationCompleted {
                capture_id, result, ..
            } => match result {
                Some(result) => format!(
                    "Capture {} classified as {} ({:.2})",
                    capture_id, result.label, result.confidence
                ),
                None => format!("Capture {} produced no decision", capture_id),
            },
            GestureEvent::BodyStatusChanged { tracked, .. } => {
                format!("Body {}", if *tracked { "tracked" } else { "lost" })
            }
            GestureEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            GestureEvent::ReadyPoseDetected { .. } => "ready_pose_detected",
            GestureEvent::ReadyPoseTimeout { .. } => "ready_pose_timeout",
            GestureEvent::MotionDetected { .. } => "motion_detected",
            GestureEvent::CaptureComplete { .. } => "capture_complete",
            GestureEvent::ClassificationCompleted { .. } => "classification_completed",
            GestureEvent::BodyStatusChanged { .. } => "body_status_changed",
            GestureEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<GestureEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<GestureEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: GestureEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        // Log important events at appropriate levels
        match &event {
            GestureEvent::MotionDetected { wrist_speed, .. } => {
                info!(
                    "Motion detected at {:.2} m/s - capturing gesture",
                    wrist_speed
                );
            }
            GestureEvent::CaptureComplete {
                capture_id, frames, ..
            } => {
                info!(
                    "Capture {} complete with {} frames - classifying",
                    capture_id,
                    frames.len()
                );
            }
            GestureEvent::ClassificationCompleted { result, .. } => match result {
                Some(result) => info!(
                    "Gesture recognized: {} (confidence {:.2})",
                    result.label, result.confidence
                ),
                None => info!("No consistent gesture detected"),
            },
            GestureEvent::BodyStatusChanged { tracked, .. } => {
                if *tracked {
                    info!("Body tracking acquired");
                } else {
                    warn!("Body tracking lost");
                }
            }
            GestureEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&GestureEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &GestureEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<GestureEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<GestureEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<GestureEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                    // Continue loop to get next event if this one doesn't match filter
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<GestureEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                    // Continue loop to check next event
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
