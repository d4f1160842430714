//! Core types, config, errors, wire protocol and observable containers for Live Panel.

pub mod bus;
pub mod config;
pub mod error;
pub mod observable;
pub mod protocol;
pub mod render;
pub mod widgets;
pub mod window;

pub use bus::{NotificationBus, SubscriptionId, CONTAINER_CHANGED};
pub use error::{LivePanelError, Result};
pub use observable::{IdentityToken, Observable, ObservableList, ObservableMap, ObservableSet, Style};
pub use protocol::{ClientMessage, EventKind, InputEvent, ItemState, PendingEvent, ServerMessage};
pub use render::Renderable;
pub use window::{Theme, WindowConfig};
