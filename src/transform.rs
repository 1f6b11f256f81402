//! Content-splitting and URL-rewriting transform.
//!
//! [`transform`] takes raw fetched markup plus its source URL and separates
//! style information from content before injection:
//!
//! 1. embedded `<style>` text is extracted in document order and the blocks
//!    are removed (they are re-injected separately, never left in place)
//! 2. external stylesheet `<link>`s are resolved against the base URL and
//!    retained as standalone references
//! 3. an inline `style` on the body's first element child is detached and
//!    reported for the *host* wrapper
//! 4. navigable/resource attributes (`src`, `href`, `action`, `poster`,
//!    `srcset`) are rewritten from relative to absolute, best-effort per
//!    element
//! 5. the remaining body content is serialized back to markup
//!
//! The transform is pure: identical `(raw_html, base_url)` input yields
//! byte-identical output, and nothing here touches ambient state. Raw fetch
//! results are what the cache stores, so repeated views of a cached URL run
//! this transform independently.

use crate::error::TransformError;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{local_name, namespace_url, ns, parse_document, Attribute, LocalName, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use std::rc::Rc;
use url::Url;

/// An external stylesheet reference extracted from the fragment, already
/// resolved to an absolute URL. The original element's position is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetRef {
    pub url: String,
}

/// Output of the content transform. Transient: produced and consumed within
/// one pipeline run, never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformResult {
    /// Extracted `<style>` text, in document order.
    pub styles: Vec<String>,
    /// Resolved external stylesheet references, in document order.
    pub stylesheet_refs: Vec<StylesheetRef>,
    /// Inline style detached from the body's first element child, meant for
    /// the host wrapper rather than the content itself.
    pub host_style: Option<String>,
    /// Serialized body content with relative references resolved to absolute.
    pub content_html: String,
}

/// Split `raw_html` into styles, stylesheet references, a host inline style,
/// and URL-rewritten content markup.
pub fn transform(raw_html: &str, base_url: &str) -> Result<TransformResult, TransformError> {
    let base = Url::parse(base_url).map_err(|err| TransformError::Parse {
        reason: format!("invalid base URL '{base_url}': {err}"),
    })?;

    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(raw_html);

    let mut styles = Vec::new();
    let mut stylesheet_refs = Vec::new();
    let mut doomed = Vec::new();

    walk(&dom.document, &mut |node| {
        let NodeData::Element { name, attrs, .. } = &node.data else {
            return;
        };
        if name.ns != ns!(html) {
            return;
        }
        if name.local == local_name!("style") {
            styles.push(text_content(node));
            doomed.push(node.clone());
        } else if name.local == local_name!("link") {
            let attrs = attrs.borrow();
            let is_stylesheet = attr_value(&attrs, &local_name!("rel"))
                .map(|rel| rel_list_contains_stylesheet(&rel))
                .unwrap_or(false);
            if is_stylesheet {
                if let Some(resolved) = attr_value(&attrs, &local_name!("href"))
                    .and_then(|href| resolve_reference(&base, &href))
                {
                    stylesheet_refs.push(StylesheetRef { url: resolved });
                }
                // Unresolvable hrefs still must not leak into the content.
                doomed.push(node.clone());
            }
        }
    });
    for node in &doomed {
        detach(node);
    }

    let body = find_body(&dom.document);

    // One-root-only convention: only the first element child of the body is
    // inspected for a host style, no merging across multiple roots.
    let mut host_style = None;
    if let Some(body) = &body {
        let children = body.children.borrow();
        if let Some(first) = children
            .iter()
            .find(|child| matches!(child.data, NodeData::Element { .. }))
        {
            if let NodeData::Element { attrs, .. } = &first.data {
                let mut attrs = attrs.borrow_mut();
                if let Some(pos) = attrs
                    .iter()
                    .position(|attr| attr.name.local == local_name!("style"))
                {
                    host_style = Some(attrs.remove(pos).value.to_string());
                }
            }
        }
    }

    walk(&dom.document, &mut |node| {
        if let NodeData::Element { attrs, .. } = &node.data {
            rewrite_resource_attrs(&base, &mut attrs.borrow_mut());
        }
    });

    let content_html = match &body {
        Some(body) => serialize_children(body)?,
        None => String::new(),
    };

    Ok(TransformResult {
        styles,
        stylesheet_refs,
        host_style,
        content_html,
    })
}

/// Resolve a possibly-relative reference against the base document URL.
///
/// Returns `None` (leave the value untouched) for empty values, pure
/// same-page fragments, embedded `data:` payloads, script-like schemes, and
/// values the URL parser rejects. Rewriting is best-effort per element; a
/// malformed reference never fails the whole transform.
pub fn resolve_reference(base: &Url, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("data:")
        || lower.starts_with("javascript:")
        || lower.starts_with("vbscript:")
        || lower.starts_with("mailto:")
    {
        return None;
    }
    base.join(trimmed).ok().map(|url| url.to_string())
}

/// True when a tokenized `rel` list contains the `stylesheet` keyword.
fn rel_list_contains_stylesheet(rel: &str) -> bool {
    rel
        .split_ascii_whitespace()
        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
}

fn rewrite_resource_attrs(base: &Url, attrs: &mut [Attribute]) {
    for attr in attrs.iter_mut() {
        let rewritten = match attr.name.local {
            local_name!("src")
            | local_name!("href")
            | local_name!("action")
            | local_name!("poster") => resolve_reference(base, &attr.value),
            local_name!("srcset") => rewrite_srcset(base, &attr.value),
            _ => None,
        };
        if let Some(new_value) = rewritten {
            attr.value = new_value.as_str().into();
        }
    }
}

/// Rewrite each comma-separated `srcset` candidate's URL portion, preserving
/// descriptors and entry order. Candidates whose URL cannot be resolved keep
/// their original text.
fn rewrite_srcset(base: &Url, value: &str) -> Option<String> {
    let mut entries = Vec::new();
    let mut changed = false;
    for candidate in value.split(',') {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let raw_url = parts.next().unwrap_or("");
        let descriptor = parts.collect::<Vec<_>>().join(" ");
        let entry_url = match resolve_reference(base, raw_url) {
            Some(resolved) => {
                changed = true;
                resolved
            }
            None => raw_url.to_string(),
        };
        if descriptor.is_empty() {
            entries.push(entry_url);
        } else {
            entries.push(format!("{entry_url} {descriptor}"));
        }
    }
    if changed {
        Some(entries.join(", "))
    } else {
        None
    }
}

fn walk(handle: &Handle, visit: &mut impl FnMut(&Handle)) {
    visit(handle);
    let children = handle.children.borrow().clone();
    for child in &children {
        walk(child, visit);
    }
}

fn attr_value(attrs: &[Attribute], name: &LocalName) -> Option<String> {
    attrs
        .iter()
        .find(|attr| attr.name.local == *name)
        .map(|attr| attr.value.to_string())
}

fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    for child in node.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            out.push_str(&contents.borrow());
        }
    }
    out
}

fn detach(node: &Handle) {
    if let Some(parent) = node.parent.take().and_then(|weak| weak.upgrade()) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
}

fn is_html_element(node: &Handle, local: &LocalName) -> bool {
    match &node.data {
        NodeData::Element { name, .. } => name.ns == ns!(html) && name.local == *local,
        _ => false,
    }
}

fn find_body(document: &Handle) -> Option<Handle> {
    let html = document
        .children
        .borrow()
        .iter()
        .find(|child| is_html_element(child, &local_name!("html")))
        .cloned()?;
    let body = html
        .children
        .borrow()
        .iter()
        .find(|child| is_html_element(child, &local_name!("body")))
        .cloned();
    body
}

fn serialize_children(node: &Handle) -> Result<String, TransformError> {
    let mut out = Vec::new();
    let serializable = SerializableHandle::from(node.clone());
    serialize(
        &mut out,
        &serializable,
        SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        },
    )
    .map_err(|err| TransformError::Serialize {
        reason: err.to_string(),
    })?;
    String::from_utf8(out).map_err(|err| TransformError::Serialize {
        reason: err.to_string(),
    })
}
