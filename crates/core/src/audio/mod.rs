use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::track::{Keyframe, KeyframePayload, TrackId};

/// Output side of the audio subsystem as seen by the timeline.
///
/// The engine calls [`SoundSink::release_all`] synchronously from `pause` and
/// `stop`; nothing may keep sounding once either returns.
pub trait SoundSink {
    /// Starts whatever sound a fired music keyframe describes.
    fn trigger(&mut self, keyframe: &Keyframe, at_seconds: f64);

    /// Silences every active voice and returns how many were released.
    fn release_all(&mut self) -> usize;
}

/// Sink that produces no sound. Used when no audio backend is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl SoundSink for SilentSink {
    fn trigger(&mut self, _keyframe: &Keyframe, _at_seconds: f64) {}

    fn release_all(&mut self) -> usize {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveVoice {
    pub track: TrackId,
    pub beat: f64,
    pub started_at: f64,
    pub payload: KeyframePayload,
}

impl ActiveVoice {
    /// Beat at which the voice stops sounding. Notes last `length_beats`;
    /// samples and cues are one-shots.
    pub fn end_beat(&self) -> f64 {
        match self.payload {
            KeyframePayload::Note { length_beats, .. } => self.beat + length_beats.max(0.0),
            _ => self.beat,
        }
    }
}

/// Sink that keeps the set of sounding voices. Each trigger retires voices
/// that started earlier and have ended by the new keyframe's beat; the rest
/// sound until [`SoundSink::release_all`]. Clones share state so a handle
/// can be inspected after the tracker is handed to the engine.
#[derive(Debug, Default, Clone)]
pub struct VoiceTracker {
    voices: Rc<RefCell<Vec<ActiveVoice>>>,
}

impl VoiceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_voices(&self) -> Vec<ActiveVoice> {
        self.voices.borrow().clone()
    }

    pub fn active_count(&self) -> usize {
        self.voices.borrow().len()
    }
}

impl SoundSink for VoiceTracker {
    fn trigger(&mut self, keyframe: &Keyframe, at_seconds: f64) {
        let mut voices = self.voices.borrow_mut();
        voices.retain(|voice| voice.beat >= keyframe.beat || voice.end_beat() > keyframe.beat);
        voices.push(ActiveVoice {
            track: keyframe.track_id.clone(),
            beat: keyframe.beat,
            started_at: at_seconds,
            payload: keyframe.payload.clone(),
        });
    }

    fn release_all(&mut self) -> usize {
        let released = self.voices.borrow_mut().drain(..).count();
        if released > 0 {
            tracing::debug!(released, "released active voices");
        }
        released
    }
}
