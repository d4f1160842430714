//! Window state: one config value broadcast through the registry's channel.

use std::sync::Arc;

use livepanel_core::protocol::{WindowEventKind, WindowProperty};
use livepanel_core::{Result, ServerMessage, Theme, WindowConfig};
use livepanel_gateway::Broadcaster;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

pub type ResizeCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;

pub struct WindowState {
    config: Mutex<WindowConfig>,
    broadcaster: Arc<dyn Broadcaster>,
    on_resize: Mutex<Option<ResizeCallback>>,
    on_close: Mutex<Option<CloseCallback>>,
}

impl WindowState {
    pub fn new(config: WindowConfig, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            config: Mutex::new(config),
            broadcaster,
            on_resize: Mutex::new(None),
            on_close: Mutex::new(None),
        }
    }

    /// Current config value.
    pub fn config(&self) -> WindowConfig {
        self.config.lock().clone()
    }

    pub fn set_title(&self, title: &str) {
        self.config.lock().title = title.to_string();
        self.send(WindowProperty::Title, json!(title));
    }

    /// Set the theme from its name. Anything but light, dark or auto is rejected.
    pub fn set_theme(&self, theme: &str) -> Result<()> {
        let theme: Theme = theme.parse()?;
        self.set_theme_value(theme);
        Ok(())
    }

    pub fn set_theme_value(&self, theme: Theme) {
        self.config.lock().theme = theme;
        self.send(WindowProperty::Theme, json!(theme));
    }

    pub fn set_background(&self, background: &str) {
        self.config.lock().background = Some(background.to_string());
        self.send(WindowProperty::Background, json!(background));
    }

    pub fn resize(&self, width: u32, height: u32) {
        {
            let mut config = self.config.lock();
            config.width = width;
            config.height = height;
        }
        self.send(WindowProperty::Resize, json!({"width": width, "height": height}));
    }

    pub fn set_favicon(&self, favicon: &str) {
        self.config.lock().favicon = Some(favicon.to_string());
        self.send(WindowProperty::Favicon, json!(favicon));
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.config.lock().fullscreen = fullscreen;
        self.send(WindowProperty::Fullscreen, json!(fullscreen));
    }

    pub fn on_resize<F>(&self, f: F)
    where
        F: Fn(u32, u32) + Send + Sync + 'static,
    {
        *self.on_resize.lock() = Some(Arc::new(f));
    }

    pub fn on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_close.lock() = Some(Arc::new(f));
    }

    /// Apply an inbound window event, then run the host callback if one is set.
    pub fn handle_event(&self, event: WindowEventKind, width: Option<u32>, height: Option<u32>) {
        match event {
            WindowEventKind::Resize => {
                let (width, height) = {
                    let mut config = self.config.lock();
                    if let Some(w) = width {
                        config.width = w;
                    }
                    if let Some(h) = height {
                        config.height = h;
                    }
                    (config.width, config.height)
                };
                debug!(width, height, "Viewer resized window");
                let callback = self.on_resize.lock().clone();
                if let Some(cb) = callback {
                    cb(width, height);
                }
            }
            WindowEventKind::Close => {
                debug!("Viewer closed window");
                let callback = self.on_close.lock().clone();
                if let Some(cb) = callback {
                    cb();
                }
            }
        }
    }

    fn send(&self, property: WindowProperty, value: Value) {
        self.broadcaster
            .broadcast(ServerMessage::Window { property, value });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use livepanel_core::LivePanelError;

    use super::*;
    use crate::testing::RecordingBroadcaster;

    fn window() -> (WindowState, Arc<RecordingBroadcaster>) {
        let recorder = Arc::new(RecordingBroadcaster::default());
        (WindowState::new(WindowConfig::default(), recorder.clone()), recorder)
    }

    #[test]
    fn test_setters_update_and_broadcast() {
        let (window, recorder) = window();
        window.set_title("Monitor");
        window.resize(1024, 768);
        window.set_background("#111");
        window.set_favicon("/icon.png");
        window.set_fullscreen(true);

        let config = window.config();
        assert_eq!(config.title, "Monitor");
        assert_eq!((config.width, config.height), (1024, 768));
        assert_eq!(config.background.as_deref(), Some("#111"));
        assert_eq!(config.favicon.as_deref(), Some("/icon.png"));
        assert!(config.fullscreen);

        let sent = recorder.take();
        assert_eq!(sent.len(), 5);
        assert_eq!(
            sent[0],
            ServerMessage::Window {
                property: WindowProperty::Title,
                value: json!("Monitor")
            }
        );
        assert_eq!(
            sent[1],
            ServerMessage::Window {
                property: WindowProperty::Resize,
                value: json!({"width": 1024, "height": 768})
            }
        );
    }

    #[test]
    fn test_theme_validation() {
        let (window, recorder) = window();
        window.set_theme("dark").unwrap();
        assert_eq!(window.config().theme, Theme::Dark);
        assert_eq!(
            recorder.take(),
            vec![ServerMessage::Window {
                property: WindowProperty::Theme,
                value: json!("dark")
            }]
        );

        let err = window.set_theme("neon").unwrap_err();
        assert!(matches!(err, LivePanelError::InvalidTheme(_)));
        assert_eq!(window.config().theme, Theme::Dark);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_inbound_resize_updates_state_and_calls_back() {
        let (window, recorder) = window();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        window.on_resize(move |w, h| *seen_clone.lock() = Some((w, h)));

        window.handle_event(WindowEventKind::Resize, Some(640), Some(480));
        assert_eq!(*seen.lock(), Some((640, 480)));
        assert_eq!(window.config().width, 640);
        // Inbound events are not echoed back to viewers.
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_inbound_events_without_callback_still_update_state() {
        let (window, _) = window();
        window.handle_event(WindowEventKind::Resize, Some(300), None);
        window.handle_event(WindowEventKind::Close, None, None);
        let config = window.config();
        assert_eq!((config.width, config.height), (300, 600));
    }

    #[test]
    fn test_close_callback() {
        let (window, _) = window();
        let closes = Arc::new(AtomicUsize::new(0));
        let closes_clone = closes.clone();
        window.on_close(move || {
            closes_clone.fetch_add(1, Ordering::SeqCst);
        });
        window.handle_event(WindowEventKind::Close, None, None);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
