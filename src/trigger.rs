//! Lazy-load trigger state machine.
//!
//! Each import instance decides *when* to start its pipeline: immediately
//! (`eager`, or when visibility detection is unavailable in the host
//! environment), or deferred until the element nears the viewport (`lazy`).
//!
//! The machine is pure; the element wires its decisions to the host's
//! visibility source and reports visibility signals back via
//! [`VisibilityTrigger::on_visible`].

use std::fmt;
use std::str::FromStr;

/// Pre-trigger margin: start loading when the element is within this many
/// pixels of the viewport, not only when visible.
pub const LAZY_MARGIN_PX: u32 = 300;

/// Zero-area intersection threshold: any visible pixel triggers the load.
pub const LAZY_THRESHOLD: f32 = 0.0;

/// When an instance starts its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingMode {
    /// Defer until the element nears the viewport.
    #[default]
    Lazy,
    /// Start as soon as the instance is activated.
    Eager,
}

impl FromStr for LoadingMode {
    type Err = ();

    /// Attribute-style parsing: case-insensitive, unknown values fall back to
    /// the lazy default rather than erroring.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("eager") {
            Ok(LoadingMode::Eager)
        } else {
            Ok(LoadingMode::Lazy)
        }
    }
}

impl fmt::Display for LoadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadingMode::Lazy => write!(f, "lazy"),
            LoadingMode::Eager => write!(f, "eager"),
        }
    }
}

/// Trigger states. Lazy path: `Idle → Observing → Triggered → Loaded`;
/// eager path skips `Observing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    #[default]
    Idle,
    Observing,
    Triggered,
    Loaded,
}

/// Decision returned by [`VisibilityTrigger::activate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    /// Begin the pipeline now.
    StartNow,
    /// Register visibility interest and wait for the first positive signal.
    Observe { margin_px: u32, threshold: f32 },
    /// Already triggered or loaded for this configuration; do nothing.
    None,
}

/// Per-instance lazy-trigger state machine.
#[derive(Debug, Clone, Default)]
pub struct VisibilityTrigger {
    state: TriggerState,
}

impl VisibilityTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Evaluate activation (connection, or a relevant attribute change while
    /// connected).
    ///
    /// Eager mode and hosts without visibility detection transition straight
    /// to `Triggered`. Lazy mode transitions to `Observing` and asks the
    /// caller to register visibility interest with the pre-trigger margin and
    /// zero-area threshold.
    pub fn activate(&mut self, mode: LoadingMode, visibility_supported: bool) -> Activation {
        if self.state != TriggerState::Idle {
            return Activation::None;
        }
        if mode == LoadingMode::Eager || !visibility_supported {
            self.state = TriggerState::Triggered;
            Activation::StartNow
        } else {
            self.state = TriggerState::Observing;
            Activation::Observe {
                margin_px: LAZY_MARGIN_PX,
                threshold: LAZY_THRESHOLD,
            }
        }
    }

    /// First positive visibility signal. Returns true exactly once per
    /// configuration; the caller must then drop its visibility interest.
    pub fn on_visible(&mut self) -> bool {
        if self.state == TriggerState::Observing {
            self.state = TriggerState::Triggered;
            true
        } else {
            false
        }
    }

    /// Deactivation (disconnection) while observing: discard without
    /// triggering. Returns true when visibility interest should be dropped.
    pub fn deactivate(&mut self) -> bool {
        let was_observing = self.state == TriggerState::Observing;
        self.state = TriggerState::Idle;
        was_observing
    }

    /// Full reset to `Idle`, clearing the already-loaded guard. Used when the
    /// source URL or loading mode changes while connected.
    pub fn reset(&mut self) -> bool {
        let was_observing = self.state == TriggerState::Observing;
        self.state = TriggerState::Idle;
        was_observing
    }

    /// The pipeline for the current configuration completed.
    pub fn mark_loaded(&mut self) {
        if self.state == TriggerState::Triggered {
            self.state = TriggerState::Loaded;
        }
    }

    /// Force the machine into `Triggered`, bypassing the loaded guard.
    /// Used by forced reload. Returns true when visibility interest should be
    /// dropped.
    pub fn force_trigger(&mut self) -> bool {
        let was_observing = self.state == TriggerState::Observing;
        self.state = TriggerState::Triggered;
        was_observing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eager_path_skips_observing() {
        let mut trigger = VisibilityTrigger::new();
        assert_eq!(
            trigger.activate(LoadingMode::Eager, true),
            Activation::StartNow
        );
        assert_eq!(trigger.state(), TriggerState::Triggered);
        trigger.mark_loaded();
        assert_eq!(trigger.state(), TriggerState::Loaded);
    }

    #[test]
    fn lazy_path_observes_then_triggers_once() {
        let mut trigger = VisibilityTrigger::new();
        match trigger.activate(LoadingMode::Lazy, true) {
            Activation::Observe { margin_px, threshold } => {
                assert_eq!(margin_px, LAZY_MARGIN_PX);
                assert_eq!(threshold, LAZY_THRESHOLD);
            }
            other => panic!("expected Observe, got {other:?}"),
        }
        assert!(trigger.on_visible());
        assert!(!trigger.on_visible(), "exactly one trigger per configuration");
        assert_eq!(trigger.state(), TriggerState::Triggered);
    }

    #[test]
    fn missing_visibility_support_forces_immediate_start() {
        let mut trigger = VisibilityTrigger::new();
        assert_eq!(
            trigger.activate(LoadingMode::Lazy, false),
            Activation::StartNow
        );
    }

    #[test]
    fn activate_is_idempotent_until_reset() {
        let mut trigger = VisibilityTrigger::new();
        trigger.activate(LoadingMode::Eager, true);
        assert_eq!(trigger.activate(LoadingMode::Eager, true), Activation::None);
        trigger.reset();
        assert_eq!(
            trigger.activate(LoadingMode::Eager, true),
            Activation::StartNow
        );
    }

    #[test]
    fn deactivate_while_observing_discards_without_trigger() {
        let mut trigger = VisibilityTrigger::new();
        trigger.activate(LoadingMode::Lazy, true);
        assert!(trigger.deactivate(), "observer interest should be dropped");
        assert_eq!(trigger.state(), TriggerState::Idle);
        assert!(!trigger.on_visible(), "no trigger after deactivation");
    }

    #[test]
    fn reset_clears_loaded_guard() {
        let mut trigger = VisibilityTrigger::new();
        trigger.activate(LoadingMode::Eager, true);
        trigger.mark_loaded();
        trigger.reset();
        assert_eq!(trigger.state(), TriggerState::Idle);
        assert_eq!(
            trigger.activate(LoadingMode::Eager, true),
            Activation::StartNow
        );
    }

    #[test]
    fn force_trigger_reports_dropped_observation() {
        let mut trigger = VisibilityTrigger::new();
        trigger.activate(LoadingMode::Lazy, true);
        assert!(trigger.force_trigger(), "observer interest should be dropped");
        assert_eq!(trigger.state(), TriggerState::Triggered);

        let mut eager = VisibilityTrigger::new();
        eager.activate(LoadingMode::Eager, true);
        eager.mark_loaded();
        assert!(!eager.force_trigger(), "nothing was being observed");
        assert_eq!(eager.state(), TriggerState::Triggered);
    }

    #[test]
    fn loading_mode_parsing_is_forgiving() {
        assert_eq!("eager".parse::<LoadingMode>().unwrap(), LoadingMode::Eager);
        assert_eq!("EAGER".parse::<LoadingMode>().unwrap(), LoadingMode::Eager);
        assert_eq!("lazy".parse::<LoadingMode>().unwrap(), LoadingMode::Lazy);
        assert_eq!("bogus".parse::<LoadingMode>().unwrap(), LoadingMode::Lazy);
        assert_eq!(LoadingMode::default(), LoadingMode::Lazy);
    }
}
