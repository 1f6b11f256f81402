//! Embeddable HTML-fragment import pipeline.
//!
//! An [`ImportElement`] fetches an external HTML fragment, splits its style
//! information from its markup, and commits the result into an isolated
//! rendering subtree supplied by the host application, with lazy triggering
//! tied to viewport visibility.
//!
//! The pipeline has four cooperating components:
//!
//! - [`FragmentCache`]: process-wide URL-keyed cache with in-flight request
//!   deduplication, so at most one network retrieval per URL is in flight
//! - [`trigger::VisibilityTrigger`]: per-instance decision of *when* to
//!   start (eagerly, or when the element nears the viewport)
//! - [`transform::transform`]: pure content-splitting and URL-rewriting pass
//! - [`inject::inject`]: one batched write at the next frame boundary
//!
//! # Security
//!
//! Fetched markup is injected without sanitization. Importing a fragment
//! from an untrusted URL executes attacker-controlled HTML inside the host
//! subtree; only import sources you control.
//!
//! # Example
//!
//! ```rust,ignore
//! use html_import::{FragmentCache, HttpFetcher, ImportElement, MemoryHost};
//! use std::sync::Arc;
//! use url::Url;
//!
//! let cache = FragmentCache::new(Arc::new(HttpFetcher::new()));
//! let host = Arc::new(MemoryHost::new());
//! let base = Url::parse("https://example.com/index.html")?;
//! let (element, mut events) = ImportElement::new(cache, host, base);
//! element.set_src("fragments/header.html");
//! element.connected();
//! // events.recv().await yields Loaded { .. } or Error { .. }
//! ```

pub mod cache;
pub mod element;
pub mod error;
pub mod host;
pub mod inject;
pub mod resource;
pub mod transform;
pub mod trigger;

pub use cache::FragmentCache;
pub use element::{DisplayState, ImportElement, ImportEvent};
pub use error::{Error, FetchError, Result, TransformError};
pub use host::{
    FrameScheduler, ImmediateFrames, MemoryHost, RenderHost, UnsupportedVisibility,
    VisibilitySource,
};
pub use inject::{CompositeDocument, LoadedSignal, BASE_STYLE};
pub use resource::{FetchedFragment, HttpFetcher, ResourceFetcher};
pub use transform::{transform, StylesheetRef, TransformResult};
pub use trigger::{LoadingMode, TriggerState, VisibilityTrigger};
