//! Routes the externally selected editing mode to timeline configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{events::TimelineEvent, timeline::TimelineCoordinator, track::TrackKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthoringMode {
    #[default]
    Off,
    Animation,
    Music,
}

impl AuthoringMode {
    /// Track kind new tracks default to while this mode is active.
    pub fn track_kind(self) -> Option<TrackKind> {
        match self {
            Self::Off => None,
            Self::Animation => Some(TrackKind::Animation),
            Self::Music => Some(TrackKind::Music),
        }
    }
}

/// Editing overlay shown while its mode is active.
pub trait AuthoringOverlay {
    fn activate(&mut self);
    fn deactivate(&mut self);
}

/// Outcome of a mode change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSwitch {
    pub previous: AuthoringMode,
    pub current: AuthoringMode,
}

impl ModeSwitch {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Keeps exactly one mode active. A switch deactivates the outgoing overlay,
/// points the coordinator at the incoming mode's track kind, then activates
/// the incoming overlay.
#[derive(Default)]
pub struct AuthoringModeRouter {
    active: AuthoringMode,
    animation_overlay: Option<Box<dyn AuthoringOverlay>>,
    music_overlay: Option<Box<dyn AuthoringOverlay>>,
}

impl AuthoringModeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> AuthoringMode {
        self.active
    }

    /// Installs the overlay for `mode`. Overlays for [`AuthoringMode::Off`]
    /// are ignored. Attaching to the active mode activates it straight away.
    pub fn attach_overlay(&mut self, mode: AuthoringMode, mut overlay: Box<dyn AuthoringOverlay>) {
        let active = mode == self.active;
        let Some(slot) = self.slot(mode) else {
            return;
        };
        if active {
            overlay.activate();
        }
        if let Some(mut previous) = slot.replace(overlay) {
            if active {
                previous.deactivate();
            }
        }
    }

    /// Switches to `mode`. Requesting the active mode is a no-op.
    pub fn set_mode(
        &mut self,
        mode: AuthoringMode,
        timeline: &mut TimelineCoordinator,
    ) -> ModeSwitch {
        let previous = self.active;
        if previous == mode {
            return ModeSwitch {
                previous,
                current: mode,
            };
        }

        if let Some(overlay) = self.slot(previous).and_then(Option::as_mut) {
            overlay.deactivate();
        }
        self.active = mode;
        // Off leaves the last default kind in place.
        if let Some(kind) = mode.track_kind() {
            timeline.set_default_track_kind(kind);
        }
        if let Some(overlay) = self.slot(mode).and_then(Option::as_mut) {
            overlay.activate();
        }
        tracing::debug!(?previous, current = ?mode, "authoring mode switched");
        timeline.emit(TimelineEvent::AuthoringModeChanged {
            previous,
            current: mode,
        });

        ModeSwitch {
            previous,
            current: mode,
        }
    }

    /// Activates `mode`, or returns to [`AuthoringMode::Off`] when `mode` is
    /// the one already active.
    pub fn toggle_mode(
        &mut self,
        mode: AuthoringMode,
        timeline: &mut TimelineCoordinator,
    ) -> ModeSwitch {
        if self.active == mode {
            self.set_mode(AuthoringMode::Off, timeline)
        } else {
            self.set_mode(mode, timeline)
        }
    }

    fn slot(&mut self, mode: AuthoringMode) -> Option<&mut Option<Box<dyn AuthoringOverlay>>> {
        match mode {
            AuthoringMode::Off => None,
            AuthoringMode::Animation => Some(&mut self.animation_overlay),
            AuthoringMode::Music => Some(&mut self.music_overlay),
        }
    }
}

impl fmt::Debug for AuthoringModeRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthoringModeRouter")
            .field("active", &self.active)
            .field("animation_overlay", &self.animation_overlay.is_some())
            .field("music_overlay", &self.music_overlay.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        events::EventRecorder,
        time::{Tempo, TimeSignature},
    };

    struct LoggingOverlay {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl AuthoringOverlay for LoggingOverlay {
        fn activate(&mut self) {
            self.log.borrow_mut().push(format!("{} on", self.name));
        }

        fn deactivate(&mut self) {
            self.log.borrow_mut().push(format!("{} off", self.name));
        }
    }

    fn timeline() -> TimelineCoordinator {
        TimelineCoordinator::new(Tempo::default(), TimeSignature::COMMON, 8.0)
    }

    fn router_with_overlays() -> (AuthoringModeRouter, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut router = AuthoringModeRouter::new();
        for (mode, name) in [
            (AuthoringMode::Animation, "animation"),
            (AuthoringMode::Music, "music"),
        ] {
            router.attach_overlay(
                mode,
                Box::new(LoggingOverlay {
                    name,
                    log: log.clone(),
                }),
            );
        }
        (router, log)
    }

    #[test]
    fn deactivates_before_activating() {
        let (mut router, log) = router_with_overlays();
        let mut timeline = timeline();
        router.set_mode(AuthoringMode::Animation, &mut timeline);
        let switch = router.set_mode(AuthoringMode::Music, &mut timeline);

        assert_eq!(switch.previous, AuthoringMode::Animation);
        assert_eq!(switch.current, AuthoringMode::Music);
        assert_eq!(
            *log.borrow(),
            vec!["animation on", "animation off", "music on"]
        );
        assert_eq!(timeline.default_track_kind(), TrackKind::Music);
    }

    #[test]
    fn selecting_the_active_mode_changes_nothing() {
        let (mut router, log) = router_with_overlays();
        let mut timeline = timeline();
        let recorder = EventRecorder::new();
        timeline.subscribe(recorder.clone());

        router.set_mode(AuthoringMode::Music, &mut timeline);
        let switch = router.set_mode(AuthoringMode::Music, &mut timeline);

        assert!(!switch.changed());
        assert_eq!(*log.borrow(), vec!["music on"]);
        assert_eq!(
            recorder.events(),
            vec![TimelineEvent::AuthoringModeChanged {
                previous: AuthoringMode::Off,
                current: AuthoringMode::Music,
            }]
        );
    }

    #[test]
    fn toggling_the_only_active_mode_turns_authoring_off() {
        let (mut router, log) = router_with_overlays();
        let mut timeline = timeline();
        router.toggle_mode(AuthoringMode::Music, &mut timeline);
        let switch = router.toggle_mode(AuthoringMode::Music, &mut timeline);

        assert_eq!(switch.current, AuthoringMode::Off);
        assert_eq!(router.active(), AuthoringMode::Off);
        assert_eq!(*log.borrow(), vec!["music on", "music off"]);
        // Off keeps the last configured kind.
        assert_eq!(timeline.default_track_kind(), TrackKind::Music);
    }

    #[test]
    fn attaching_to_the_active_mode_swaps_overlays() {
        let (mut router, log) = router_with_overlays();
        let mut timeline = timeline();
        router.set_mode(AuthoringMode::Animation, &mut timeline);
        router.attach_overlay(
            AuthoringMode::Animation,
            Box::new(LoggingOverlay {
                name: "rig",
                log: log.clone(),
            }),
        );

        assert_eq!(
            *log.borrow(),
            vec!["animation on", "rig on", "animation off"]
        );
    }

    #[test]
    fn off_mode_has_no_overlay_or_track_kind() {
        let (mut router, log) = router_with_overlays();
        let mut timeline = timeline();
        router.attach_overlay(
            AuthoringMode::Off,
            Box::new(LoggingOverlay {
                name: "off",
                log: log.clone(),
            }),
        );
        router.set_mode(AuthoringMode::Off, &mut timeline);

        assert!(log.borrow().is_empty());
        assert_eq!(AuthoringMode::Off.track_kind(), None);
        assert_eq!(AuthoringMode::Music.track_kind(), Some(TrackKind::Music));
    }
}
