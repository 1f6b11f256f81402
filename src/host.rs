//! Collaborator contracts provided by the embedding host.
//!
//! The pipeline itself is host-agnostic; the embedding application supplies
//! an isolated rendering subtree ([`RenderHost`]), a rendering-frame
//! scheduler ([`FrameScheduler`]), and a viewport-visibility detector
//! ([`VisibilitySource`]). Trait objects keep the seams mockable, the same
//! way the fetch layer abstracts its transport.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::{Arc, Mutex};

/// The isolated rendering subtree plus the host element's inline-style
/// surface. The isolation mechanism (style containment in both directions)
/// is the host's responsibility.
pub trait RenderHost: Send + Sync {
    /// Replace the entire subtree content in one operation.
    fn replace_subtree(&self, html: &str);

    /// Current inline style of the host element, if any.
    fn inline_style(&self) -> Option<String>;

    /// Overwrite the host element's inline style.
    fn set_inline_style(&self, style: &str);
}

impl<T: RenderHost + ?Sized> RenderHost for Arc<T> {
    fn replace_subtree(&self, html: &str) {
        (**self).replace_subtree(html)
    }

    fn inline_style(&self) -> Option<String> {
        (**self).inline_style()
    }

    fn set_inline_style(&self, style: &str) {
        (**self).set_inline_style(style)
    }
}

/// Next-rendering-frame scheduling primitive. Injection awaits one frame so
/// all writes of a pipeline run batch into a single layout pass.
pub trait FrameScheduler: Send + Sync {
    fn next_frame(&self) -> BoxFuture<'static, ()>;
}

/// Default scheduler: yields to the cooperative scheduler once per frame
/// boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateFrames;

impl FrameScheduler for ImmediateFrames {
    fn next_frame(&self) -> BoxFuture<'static, ()> {
        tokio::task::yield_now().boxed()
    }
}

/// Viewport-visibility detection primitive supporting margin and threshold
/// configuration. The environment calls back into
/// [`ImportElement::on_visible`](crate::element::ImportElement::on_visible)
/// when the watched element intersects.
pub trait VisibilitySource: Send + Sync {
    /// Whether visibility detection is available in this host environment.
    /// When false, lazy instances load immediately.
    fn is_supported(&self) -> bool {
        true
    }

    /// Register interest in the element's visibility.
    fn watch(&self, margin_px: u32, threshold: f32);

    /// Drop visibility interest.
    fn unwatch(&self);
}

/// Visibility source for environments without viewport detection; forces the
/// immediate-start path for lazy instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedVisibility;

impl VisibilitySource for UnsupportedVisibility {
    fn is_supported(&self) -> bool {
        false
    }

    fn watch(&self, _margin_px: u32, _threshold: f32) {}

    fn unwatch(&self) {}
}

#[derive(Default)]
struct MemoryHostState {
    subtree: Option<String>,
    inline_style: Option<String>,
}

/// In-memory [`RenderHost`] recording the last committed subtree. Used by
/// embedding tests and host tooling.
#[derive(Default)]
pub struct MemoryHost {
    state: Mutex<MemoryHostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last committed subtree markup, if any write happened.
    pub fn subtree(&self) -> Option<String> {
        self.state.lock().unwrap().subtree.clone()
    }
}

impl RenderHost for MemoryHost {
    fn replace_subtree(&self, html: &str) {
        self.state.lock().unwrap().subtree = Some(html.to_string());
    }

    fn inline_style(&self) -> Option<String> {
        self.state.lock().unwrap().inline_style.clone()
    }

    fn set_inline_style(&self, style: &str) {
        self.state.lock().unwrap().inline_style = Some(style.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_host_records_last_subtree() {
        let host = MemoryHost::new();
        assert!(host.subtree().is_none());
        host.replace_subtree("<p>a</p>");
        host.replace_subtree("<p>b</p>");
        assert_eq!(host.subtree().as_deref(), Some("<p>b</p>"));
    }

    #[test]
    fn memory_host_tracks_inline_style() {
        let host = MemoryHost::new();
        assert!(host.inline_style().is_none());
        host.set_inline_style("color: red");
        assert_eq!(host.inline_style().as_deref(), Some("color: red"));
    }

    #[test]
    fn unsupported_visibility_reports_unsupported() {
        assert!(!UnsupportedVisibility.is_supported());
    }

    #[tokio::test]
    async fn immediate_frames_resolve() {
        ImmediateFrames.next_frame().await;
    }
}
