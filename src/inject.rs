//! Batched injection into the isolated rendering subtree.
//!
//! The injector builds one composite structure (base style, combined
//! extracted style, tagged stylesheet links, content markup), waits for the
//! next rendering-frame boundary so all writes land in a single layout pass,
//! and then replaces the subtree in one atomic operation. Incremental
//! patching is never performed.

use crate::host::{FrameScheduler, RenderHost};
use crate::transform::{StylesheetRef, TransformResult};
use std::fmt::Write;

/// Host display rules injected ahead of any extracted style.
pub const BASE_STYLE: &str = ":host { display: block; }";

/// Marker attribute on injected stylesheet links, for introspection of
/// externally-sourced styles.
pub const IMPORTED_LINK_ATTR: &str = "data-imported";

/// Success signal emitted once a pipeline run has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSignal {
    /// Resolved source URL of the fragment.
    pub src: String,
    /// Number of extracted style blocks.
    pub styles_extracted: usize,
    /// Number of resolved external stylesheet references.
    pub links_resolved: usize,
    /// Whether a detached inline style was applied to the host.
    pub host_style_applied: bool,
}

/// The composite structure committed into the isolated subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeDocument {
    /// All extracted style text joined into one block, if any.
    pub combined_style: Option<String>,
    /// External stylesheet references, in extraction order.
    pub stylesheet_refs: Vec<StylesheetRef>,
    /// Transformed content markup.
    pub content_html: String,
}

impl CompositeDocument {
    pub fn from_transform(result: &TransformResult) -> Self {
        let combined_style = if result.styles.is_empty() {
            None
        } else {
            Some(result.styles.join("\n"))
        };
        Self {
            combined_style,
            stylesheet_refs: result.stylesheet_refs.clone(),
            content_html: result.content_html.clone(),
        }
    }

    /// Render the full subtree markup: base style block, optional combined
    /// style block, externally-tagged stylesheet links, then content.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "<style>{}</style>", BASE_STYLE);
        if let Some(css) = &self.combined_style {
            let _ = write!(out, "<style>{}</style>", css);
        }
        for link in &self.stylesheet_refs {
            let _ = write!(
                out,
                r#"<link rel="stylesheet" href="{}" {}>"#,
                link.url, IMPORTED_LINK_ATTR
            );
        }
        out.push_str(&self.content_html);
        out
    }
}

/// Commit a transform result into the host's isolated subtree.
///
/// Waits for the next rendering-frame boundary, then re-checks
/// `still_connected`: if the owning instance disconnected meanwhile the
/// write is skipped entirely and `None` is returned (no signal fires).
/// Otherwise the subtree is replaced in one operation, a detached host style
/// is merged into the host's existing inline style (appended with a
/// delimiter, never overwriting), and the success signal is returned.
pub async fn inject(
    host: &dyn RenderHost,
    frames: &dyn FrameScheduler,
    src: &str,
    result: &TransformResult,
    still_connected: impl Fn() -> bool,
) -> Option<LoadedSignal> {
    frames.next_frame().await;
    if !still_connected() {
        log::debug!("skipping injection for {src}: instance disconnected");
        return None;
    }

    let composite = CompositeDocument::from_transform(result);
    host.replace_subtree(&composite.render());

    let host_style_applied = match &result.host_style {
        Some(style) => {
            match host.inline_style().filter(|existing| !existing.trim().is_empty()) {
                Some(existing) => host.set_inline_style(&format!("{existing}; {style}")),
                None => host.set_inline_style(style),
            }
            true
        }
        None => false,
    };

    Some(LoadedSignal {
        src: src.to_string(),
        styles_extracted: result.styles.len(),
        links_resolved: result.stylesheet_refs.len(),
        host_style_applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ImmediateFrames, MemoryHost};
    use crate::transform::transform;

    fn sample_result() -> TransformResult {
        transform(
            r#"<style>.a{}</style><link rel="stylesheet" href="a.css"><div style="color:red"><p>hi</p></div>"#,
            "https://x/y/z.html",
        )
        .unwrap()
    }

    #[test]
    fn composite_orders_base_style_combined_style_links_then_content() {
        let composite = CompositeDocument::from_transform(&sample_result());
        let html = composite.render();

        let base = html.find(BASE_STYLE).expect("base style present");
        let combined = html.find(".a{}").expect("combined style present");
        let link = html.find("https://x/y/a.css").expect("link present");
        let content = html.find("<p>hi</p>").expect("content present");
        assert!(base < combined && combined < link && link < content);
        assert!(html.contains(IMPORTED_LINK_ATTR));
    }

    #[test]
    fn composite_omits_style_block_when_no_styles_extracted() {
        let result = transform("<p>plain</p>", "https://x/y/z.html").unwrap();
        let html = CompositeDocument::from_transform(&result).render();
        assert_eq!(html.matches("<style>").count(), 1, "only the base style block");
    }

    #[tokio::test]
    async fn inject_commits_subtree_and_merges_host_style() {
        let host = MemoryHost::new();
        host.set_inline_style("margin: 0");
        let result = sample_result();

        let signal = inject(&host, &ImmediateFrames, "https://x/y/z.html", &result, || true)
            .await
            .expect("connected instance injects");

        assert_eq!(signal.styles_extracted, 1);
        assert_eq!(signal.links_resolved, 1);
        assert!(signal.host_style_applied);
        assert_eq!(host.inline_style().as_deref(), Some("margin: 0; color:red"));
        assert!(host.subtree().unwrap().contains("<p>hi</p>"));
    }

    #[tokio::test]
    async fn inject_sets_host_style_directly_when_host_had_none() {
        let host = MemoryHost::new();
        let result = sample_result();

        inject(&host, &ImmediateFrames, "https://x/y/z.html", &result, || true)
            .await
            .unwrap();
        assert_eq!(host.inline_style().as_deref(), Some("color:red"));
    }

    #[tokio::test]
    async fn inject_skips_disconnected_instance_entirely() {
        let host = MemoryHost::new();
        let result = sample_result();

        let signal = inject(&host, &ImmediateFrames, "https://x/y/z.html", &result, || false).await;

        assert!(signal.is_none(), "no signal for a skipped write");
        assert!(host.subtree().is_none(), "no write happened");
        assert!(host.inline_style().is_none());
    }
}
