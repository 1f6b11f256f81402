//! The import element: per-instance state, attribute wiring, and pipeline
//! orchestration.
//!
//! An [`ImportElement`] owns one widget instance's configuration
//! (`src`, `loading`), its trigger state machine, and an epoch counter used
//! for cancellation. The element is a cheap clonable handle; pipeline runs
//! execute as spawned tasks and check a [`PipelineToken`] after every
//! suspension point, so disconnecting the instance or changing its
//! configuration stops a stale run from acting on its result without
//! aborting the shared retrieval other instances may be borrowing.
//!
//! Failures during fetch or transform are caught here, converted into the
//! error event, and never unwind into the host. Cancellation is filtered
//! out before the error signal path.

use crate::cache::FragmentCache;
use crate::error::{Error, FetchError, Result};
use crate::host::{
    FrameScheduler, ImmediateFrames, RenderHost, UnsupportedVisibility, VisibilitySource,
};
use crate::inject::{inject, LoadedSignal};
use crate::transform::transform;
use crate::trigger::{Activation, LoadingMode, VisibilityTrigger};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

/// Visible load state, usable for CSS-driven loading indicators without
/// script involvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayState {
    #[default]
    Idle,
    Busy,
    Loaded,
    Errored,
}

impl DisplayState {
    /// Attribute-style value reflected on the host element.
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayState::Idle => "idle",
            DisplayState::Busy => "busy",
            DisplayState::Loaded => "loaded",
            DisplayState::Errored => "error",
        }
    }
}

/// Signals emitted by an instance and consumed by external observers.
#[derive(Debug, Clone)]
pub enum ImportEvent {
    /// A pipeline run committed successfully.
    Loaded(LoadedSignal),
    /// A pipeline run failed. Cancellations never produce this event.
    Error { src: String, error: Error },
}

struct ElementState {
    src: Option<String>,
    loading: LoadingMode,
    trigger: VisibilityTrigger,
    connected: bool,
    /// Bumped on every configuration or connection change; pipeline runs
    /// carry the epoch they were started under and go silent once it is
    /// stale.
    epoch: u64,
    display: DisplayState,
}

/// Cancellation token carried through every suspension point of a pipeline
/// run. Cancelling a run only stops this instance from acting on the
/// result; a shared retrieval keeps running for its other borrowers.
struct PipelineToken {
    state: Arc<Mutex<ElementState>>,
    epoch: u64,
}

impl PipelineToken {
    fn is_live(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.connected && state.epoch == self.epoch
    }

    fn check(&self) -> std::result::Result<(), FetchError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(FetchError::Cancelled)
        }
    }
}

/// One import widget instance.
///
/// Collaborators (cache, render host, frame scheduler, visibility source)
/// are injected at construction; methods must be called from within a tokio
/// runtime since pipeline runs execute as spawned tasks.
#[derive(Clone)]
pub struct ImportElement {
    state: Arc<Mutex<ElementState>>,
    cache: FragmentCache,
    host: Arc<dyn RenderHost>,
    frames: Arc<dyn FrameScheduler>,
    visibility: Arc<dyn VisibilitySource>,
    base_url: Url,
    events: UnboundedSender<ImportEvent>,
}

impl ImportElement {
    /// Create an instance. `base_url` is the owning document's URL; `src`
    /// values are resolved against it before use as cache keys.
    ///
    /// Returns the element together with the receiver its signals are
    /// delivered on.
    pub fn new(
        cache: FragmentCache,
        host: Arc<dyn RenderHost>,
        base_url: Url,
    ) -> (Self, UnboundedReceiver<ImportEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let element = Self {
            state: Arc::new(Mutex::new(ElementState {
                src: None,
                loading: LoadingMode::default(),
                trigger: VisibilityTrigger::new(),
                connected: false,
                epoch: 0,
                display: DisplayState::Idle,
            })),
            cache,
            host,
            frames: Arc::new(ImmediateFrames),
            visibility: Arc::new(UnsupportedVisibility),
            base_url,
            events,
        };
        (element, receiver)
    }

    /// Replace the default frame scheduler.
    pub fn with_frames(mut self, frames: Arc<dyn FrameScheduler>) -> Self {
        self.frames = frames;
        self
    }

    /// Replace the default (unsupported) visibility source.
    pub fn with_visibility(mut self, visibility: Arc<dyn VisibilitySource>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn src(&self) -> Option<String> {
        self.state.lock().unwrap().src.clone()
    }

    pub fn loading(&self) -> LoadingMode {
        self.state.lock().unwrap().loading
    }

    pub fn display_state(&self) -> DisplayState {
        self.state.lock().unwrap().display
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    /// The instance joined the document.
    pub fn connected(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.connected {
                return;
            }
            state.connected = true;
            state.epoch += 1;
            state.trigger.reset();
            state.display = DisplayState::Idle;
        }
        self.activate();
    }

    /// The instance left the document. Cancels this instance's in-flight
    /// pipeline and drops visibility interest without triggering.
    pub fn disconnected(&self) {
        let was_observing = {
            let mut state = self.state.lock().unwrap();
            if !state.connected {
                return;
            }
            state.connected = false;
            state.epoch += 1;
            state.display = DisplayState::Idle;
            state.trigger.deactivate()
        };
        if was_observing {
            self.visibility.unwatch();
        }
    }

    /// Set the fragment URL. While connected, a change cancels the stale
    /// pipeline, clears the loaded guard, and re-evaluates activation.
    pub fn set_src(&self, src: impl Into<String>) {
        let src = src.into();
        let was_observing = {
            let mut state = self.state.lock().unwrap();
            if state.src.as_deref() == Some(src.as_str()) {
                return;
            }
            state.src = Some(src);
            if !state.connected {
                return;
            }
            state.epoch += 1;
            state.display = DisplayState::Idle;
            state.trigger.reset()
        };
        if was_observing {
            self.visibility.unwatch();
        }
        self.activate();
    }

    /// Set the loading mode, with the same re-arming semantics as
    /// [`ImportElement::set_src`].
    pub fn set_loading(&self, loading: LoadingMode) {
        let was_observing = {
            let mut state = self.state.lock().unwrap();
            if state.loading == loading {
                return;
            }
            state.loading = loading;
            if !state.connected {
                return;
            }
            state.epoch += 1;
            state.display = DisplayState::Idle;
            state.trigger.reset()
        };
        if was_observing {
            self.visibility.unwatch();
        }
        self.activate();
    }

    /// Positive visibility signal from the host environment. Triggers at most
    /// once per configuration.
    pub fn on_visible(&self) {
        let src = {
            let mut state = self.state.lock().unwrap();
            if !state.trigger.on_visible() {
                return;
            }
            state.src.clone()
        };
        self.visibility.unwatch();
        if let Some(src) = src {
            self.start_pipeline(src);
        }
    }

    /// Evict this instance's current URL from the cache and re-run the
    /// pipeline unconditionally, bypassing the loaded guard.
    pub fn reload(&self) {
        let (src, was_observing) = {
            let mut state = self.state.lock().unwrap();
            if !state.connected {
                return;
            }
            let Some(src) = state.src.clone() else {
                return;
            };
            state.epoch += 1;
            let was_observing = state.trigger.force_trigger();
            (src, was_observing)
        };
        if was_observing {
            self.visibility.unwatch();
        }
        if let Ok(url) = self.resolve_src(&src) {
            self.cache.evict(url.as_str());
        }
        self.start_pipeline(src);
    }

    /// Evaluate the trigger for the current configuration and either start
    /// the pipeline or register visibility interest.
    fn activate(&self) {
        let (src, decision) = {
            let mut state = self.state.lock().unwrap();
            let Some(src) = state.src.clone() else {
                return;
            };
            if !state.connected {
                return;
            }
            let loading = state.loading;
            let decision = state.trigger.activate(loading, self.visibility.is_supported());
            (src, decision)
        };
        match decision {
            Activation::StartNow => self.start_pipeline(src),
            Activation::Observe { margin_px, threshold } => {
                self.visibility.watch(margin_px, threshold)
            }
            Activation::None => {}
        }
    }

    /// Spawn one pipeline run for the current epoch.
    fn start_pipeline(&self, src: String) {
        let epoch = {
            let mut state = self.state.lock().unwrap();
            state.display = DisplayState::Busy;
            state.epoch
        };
        let element = self.clone();
        tokio::spawn(async move {
            element.run_pipeline(src, epoch).await;
        });
    }

    async fn run_pipeline(&self, src: String, epoch: u64) {
        let token = PipelineToken {
            state: Arc::clone(&self.state),
            epoch,
        };
        match self.execute(&src, &token).await {
            Ok(signal) => {
                {
                    let mut state = self.state.lock().unwrap();
                    if state.epoch == epoch {
                        state.trigger.mark_loaded();
                        state.display = DisplayState::Loaded;
                    }
                }
                let _ = self.events.send(ImportEvent::Loaded(signal));
            }
            Err(err) if err.is_cancelled() => {
                log::debug!("import pipeline for {src} cancelled");
            }
            Err(error) => {
                // A failure from a shared retrieval can surface after this run's
                // configuration was replaced; such a run is cancelled and must not
                // reach the error signal path.
                let live = {
                    let mut state = self.state.lock().unwrap();
                    let live = state.connected && state.epoch == epoch;
                    if live {
                        state.display = DisplayState::Errored;
                    }
                    live
                };
                if !live {
                    log::debug!("import pipeline for {src} cancelled");
                    return;
                }
                log::warn!("import of {src} failed: {error}");
                let _ = self.events.send(ImportEvent::Error { src, error });
            }
        }
    }

    async fn execute(&self, src: &str, token: &PipelineToken) -> Result<LoadedSignal> {
        let url = self.resolve_src(src)?;
        let text = self.cache.fetch(url.as_str()).await?;
        token.check()?;
        let result = transform(&text, url.as_str())?;
        let signal = inject(&*self.host, &*self.frames, url.as_str(), &result, || {
            token.is_live()
        })
        .await
        .ok_or(FetchError::Cancelled)?;
        Ok(signal)
    }

    fn resolve_src(&self, src: &str) -> std::result::Result<Url, FetchError> {
        self.base_url.join(src).map_err(|err| FetchError::Transport {
            url: src.to_string(),
            reason: format!("invalid src: {err}"),
        })
    }
}
