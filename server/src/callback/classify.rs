//! Event Classification
//!
//! Maps decrypted events onto a fixed action taxonomy. Total over all inputs:
//! anything unrecognized lands in a catch-all action.

use serde::Serialize;
use serde_json::{Map, Value};

use super::xml::DecryptedEvent;

/// Action assigned to a classified event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessAction {
    TextProcessed,
    ImageProcessed,
    SubscribeProcessed,
    UnsubscribeProcessed,
    MenuClickProcessed,
    /// An `event` message with an unrecognized sub-event.
    EventProcessed,
    /// Any other message type.
    UnknownProcessed,
}

impl ProcessAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TextProcessed => "text_processed",
            Self::ImageProcessed => "image_processed",
            Self::SubscribeProcessed => "subscribe_processed",
            Self::UnsubscribeProcessed => "unsubscribe_processed",
            Self::MenuClickProcessed => "menu_click_processed",
            Self::EventProcessed => "event_processed",
            Self::UnknownProcessed => "unknown_processed",
        }
    }
}

impl std::fmt::Display for ProcessAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one event. Serializes flat as `{action, response, ...metadata}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub action: ProcessAction,
    pub response: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ClassificationResult {
    fn new(action: ProcessAction, response: impl Into<String>) -> Self {
        Self {
            action,
            response: response.into(),
            metadata: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Classify an event.
pub fn classify(event: &DecryptedEvent) -> ClassificationResult {
    match event.msg_type.as_str() {
        "text" => ClassificationResult::new(ProcessAction::TextProcessed, "Text message received")
            .with("content", event.content.as_str()),
        "image" => {
            ClassificationResult::new(ProcessAction::ImageProcessed, "Image message received")
                .with("mediaId", event.media_id.clone())
        }
        "event" => classify_event(event),
        other => ClassificationResult::new(
            ProcessAction::UnknownProcessed,
            "Unknown message type received",
        )
        .with("msgType", other),
    }
}

fn classify_event(event: &DecryptedEvent) -> ClassificationResult {
    match event.event.as_deref() {
        Some("subscribe") => ClassificationResult::new(
            ProcessAction::SubscribeProcessed,
            "Subscribe event received",
        ),
        Some("unsubscribe") => ClassificationResult::new(
            ProcessAction::UnsubscribeProcessed,
            "Unsubscribe event received",
        ),
        Some("click") => ClassificationResult::new(
            ProcessAction::MenuClickProcessed,
            "Menu click event received",
        )
        .with("eventKey", event.event_key.clone()),
        other => {
            let name = other.unwrap_or_default();
            ClassificationResult::new(
                ProcessAction::EventProcessed,
                format!("Event {name} received"),
            )
            .with("event", name)
        }
    }
}

/// Audit event type: `event_<Event>`, else `message_<MsgType>`, else `unknown`.
pub fn audit_event_type(event: &DecryptedEvent) -> String {
    match (event.event.as_deref(), event.msg_type.as_str()) {
        (Some(name), _) => format!("event_{name}"),
        (None, "") => "unknown".to_string(),
        (None, msg_type) => format!("message_{msg_type}"),
    }
}

/// Short human-readable description of an event for audit details.
pub fn describe(event: &DecryptedEvent) -> String {
    if !event.content.is_empty() {
        event.content.clone()
    } else if let Some(ref name) = event.event {
        format!("event: {name}")
    } else {
        "unknown message type".to_string()
    }
}
