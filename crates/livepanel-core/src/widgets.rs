//! Minimal built-in widgets.

use std::fmt;
use std::sync::Arc;

use maud::html;

use crate::observable::Style;
use crate::protocol::{EventKind, PendingEvent};
use crate::render::Renderable;

/// Widget callback function type.
pub type Callback = Arc<dyn Fn(&PendingEvent) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct Text {
    pub content: String,
    pub style: Style,
}

impl Text {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            style: Style::default(),
        }
    }

    pub fn styled(mut self, property: &str, value: &str) -> Self {
        self.style = self.style.with(property, value);
        self
    }
}

impl Renderable for Text {
    fn render(&self) -> String {
        html! { p.lp-text style=[self.style.to_css()] { (self.content) } }.into_string()
    }

    fn kind(&self) -> &str {
        "text"
    }
}

#[derive(Clone)]
pub struct Button {
    pub label: String,
    on_click: Option<Callback>,
}

impl fmt::Debug for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Button")
            .field("label", &self.label)
            .field("on_click", &self.on_click.is_some())
            .finish()
    }
}

impl Button {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            on_click: None,
        }
    }

    pub fn on_click<F>(mut self, f: F) -> Self
    where
        F: Fn(&PendingEvent) + Send + Sync + 'static,
    {
        self.on_click = Some(Arc::new(f));
        self
    }
}

impl Renderable for Button {
    fn render(&self) -> String {
        html! { button.lp-button type="button" data-event="click" { (self.label) } }.into_string()
    }

    fn kind(&self) -> &str {
        "button"
    }

    fn on_input(&self, event: &PendingEvent) -> bool {
        match (&self.on_click, event.kind) {
            (Some(cb), EventKind::Click) => {
                cb(event);
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone, Default)]
pub struct TextInput {
    pub value: String,
    pub placeholder: Option<String>,
    on_change: Option<Callback>,
    on_submit: Option<Callback>,
}

impl fmt::Debug for TextInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextInput")
            .field("value", &self.value)
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

impl TextInput {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = Some(text.into());
        self
    }

    pub fn on_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&PendingEvent) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(f));
        self
    }

    pub fn on_submit<F>(mut self, f: F) -> Self
    where
        F: Fn(&PendingEvent) + Send + Sync + 'static,
    {
        self.on_submit = Some(Arc::new(f));
        self
    }
}

impl Renderable for TextInput {
    fn render(&self) -> String {
        html! {
            input.lp-input type="text" value=(self.value) placeholder=[self.placeholder.as_deref()];
        }
        .into_string()
    }

    fn kind(&self) -> &str {
        "input"
    }

    fn on_input(&self, event: &PendingEvent) -> bool {
        let cb = match event.kind {
            EventKind::Change => &self.on_change,
            EventKind::Submit => &self.on_submit,
            _ => return false,
        };
        match cb {
            Some(cb) => {
                cb(event);
                true
            }
            None => false,
        }
    }
}
