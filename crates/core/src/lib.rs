//! Core library for the tempo timeline engine.
//!
//! Keeps animation keyframes, music keyframes and the playback position
//! aligned to one musical time base. Each module owns a distinct subsystem
//! (time conversion, beat grid, playback clock, track storage, authoring
//! modes) and [`engine::TimelineEngine`] wires them together behind the
//! command surface a UI layer talks to.

pub mod assets;
pub mod audio;
pub mod authoring;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod grid;
pub mod time;
pub mod timeline;
pub mod track;

pub use assets::{AssetEntry, AssetResolver, AssetStore};
pub use audio::{ActiveVoice, SilentSink, SoundSink, VoiceTracker};
pub use authoring::{AuthoringMode, AuthoringModeRouter, AuthoringOverlay, ModeSwitch};
pub use clock::{
    ManualClock, MonotonicClock, PlaybackClock, PlaybackState, PlaybackStatus, SystemClock,
};
pub use command::{CommandQueue, EngineCommand};
pub use config::{AuthoringConfig, EngineConfig, GridConfig, TimelineConfig};
pub use engine::TimelineEngine;
pub use error::{Result, TimelineError};
pub use events::{EventRecorder, ListenerId, TimelineEvent, TimelineListener};
pub use grid::{BeatGridGenerator, BeatMarker, Subdivision};
pub use time::{MusicalPosition, Tempo, TimeSignature};
pub use timeline::{KeyframePlacement, TimelineCoordinator};
pub use track::{Keyframe, KeyframePayload, Track, TrackId, TrackKind};
