//! Live Panel wire protocol.
//!
//! JSON-over-WebSocket, one message per text frame. Every message carries a
//! `type` discriminator. Items are always replaced whole: there is no
//! DOM-level patching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::window::WindowConfig;

/// Rendered markup for one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemState {
    pub id: String,
    pub html: String,
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once per new connection.
    FullState {
        items: Vec<ItemState>,
        window: WindowConfig,
    },
    Add { id: String, html: String },
    Update { id: String, html: String },
    Remove { id: String },
    Clear,
    Window {
        property: WindowProperty,
        value: serde_json::Value,
    },
}

impl ServerMessage {
    /// Item id this message targets, if any.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::Add { id, .. } | Self::Update { id, .. } | Self::Remove { id } => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowProperty {
    Title,
    Theme,
    Background,
    /// Value is `{"width": n, "height": n}`.
    Resize,
    Favicon,
    Fullscreen,
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Input {
        id: String,
        event: InputEvent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
    WindowEvent {
        event: WindowEventKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    /// Requests server shutdown.
    Close,
}

/// Interaction kinds a client may send as `input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEvent {
    Click,
    Change,
    Submit,
}

impl From<InputEvent> for EventKind {
    fn from(event: InputEvent) -> Self {
        match event {
            InputEvent::Click => EventKind::Click,
            InputEvent::Change => EventKind::Change,
            InputEvent::Submit => EventKind::Submit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Click,
    Change,
    Submit,
    /// Synthesised for a client `close` request; never sent as input.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowEventKind {
    Resize,
    Close,
}

/// A normalized inbound interaction, queued for synchronous polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub seq: u64,
    pub target: String,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl PendingEvent {
    pub fn new(seq: u64, target: impl Into<String>, kind: EventKind, value: Option<serde_json::Value>) -> Self {
        Self {
            seq,
            target: target.into(),
            kind,
            value,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_message_shapes() {
        let add = ServerMessage::Add {
            id: "string_1".into(),
            html: "10".into(),
        };
        assert_eq!(
            serde_json::to_value(&add).unwrap(),
            json!({"type": "add", "id": "string_1", "html": "10"})
        );

        assert_eq!(
            serde_json::to_value(ServerMessage::Clear).unwrap(),
            json!({"type": "clear"})
        );

        let window = ServerMessage::Window {
            property: WindowProperty::Resize,
            value: json!({"width": 640, "height": 480}),
        };
        let v = serde_json::to_value(&window).unwrap();
        assert_eq!(v["type"], "window");
        assert_eq!(v["property"], "resize");
        assert_eq!(v["value"]["width"], 640);
    }

    #[test]
    fn test_full_state_shape() {
        let msg = ServerMessage::FullState {
            items: vec![ItemState {
                id: "a".into(),
                html: "<p>a</p>".into(),
            }],
            window: WindowConfig::default(),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "full_state");
        assert_eq!(v["items"][0]["id"], "a");
        assert_eq!(v["window"]["theme"], "auto");
    }

    #[test]
    fn test_parse_client_input() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"input","id":"button_1","event":"click"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Input {
                id: "button_1".into(),
                event: InputEvent::Click,
                value: None,
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"input","id":"t","event":"change","value":"hi"}"#).unwrap();
        let ClientMessage::Input { value, .. } = msg else {
            panic!("expected input");
        };
        assert_eq!(value, Some(json!("hi")));
    }

    #[test]
    fn test_parse_window_event_and_close() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"window_event","event":"resize","width":1024,"height":768}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::WindowEvent {
                event: WindowEventKind::Resize,
                width: Some(1024),
                height: Some(768),
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"close"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Close);
    }

    #[test]
    fn test_unknown_event_rejected() {
        let res = serde_json::from_str::<ClientMessage>(r#"{"type":"input","id":"x","event":"hover"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_close_is_not_an_input_event() {
        let res = serde_json::from_str::<ClientMessage>(r#"{"type":"input","id":"x","event":"close"}"#);
        assert!(res.is_err());
        assert_eq!(EventKind::from(InputEvent::Submit), EventKind::Submit);
    }
}
