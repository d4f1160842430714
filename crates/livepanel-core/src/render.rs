//! The render capability every displayed item provides.

use maud::html;

use crate::observable::IdentityToken;
use crate::protocol::PendingEvent;

/// A value that can produce its current markup.
///
/// Only [`render`](Renderable::render) is required. The registry never
/// inspects an item beyond these methods.
pub trait Renderable: Send + Sync {
    /// Produce the current markup for this item.
    fn render(&self) -> String;

    /// Short type name used for auto-generated ids (`"{kind}_{n}"`).
    fn kind(&self) -> &str {
        "item"
    }

    /// Copy-stable token for values that publish change events.
    fn identity(&self) -> Option<IdentityToken> {
        None
    }

    /// Run this item's callback for an inbound interaction.
    ///
    /// Returns false when the item has no callback for the event kind.
    fn on_input(&self, _event: &PendingEvent) -> bool {
        false
    }
}

macro_rules! plain_renderable {
    ($kind:literal => $($ty:ty),+) => {
        $(
            impl Renderable for $ty {
                fn render(&self) -> String {
                    html! { (self.to_string()) }.into_string()
                }

                fn kind(&self) -> &str {
                    $kind
                }
            }
        )+
    };
}

plain_renderable!("string" => String, &'static str);
plain_renderable!("int" => i32, i64, u32, u64);
plain_renderable!("float" => f64);
plain_renderable!("bool" => bool);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_values_render_escaped() {
        assert_eq!("10".render(), "10");
        assert_eq!(String::from("<b>&</b>").render(), "&lt;b&gt;&amp;&lt;/b&gt;");
        assert_eq!(42i64.render(), "42");
        assert_eq!(true.render(), "true");
    }

    #[test]
    fn test_plain_value_kinds() {
        assert_eq!("x".kind(), "string");
        assert_eq!(String::new().kind(), "string");
        assert_eq!(7u64.kind(), "int");
        assert_eq!(1.5f64.kind(), "float");
        assert!(42i32.identity().is_none());
    }
}
