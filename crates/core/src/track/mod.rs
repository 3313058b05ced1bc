//! Tracks and keyframes. Keyframes are stored in beats so that tempo changes
//! move their position in seconds without touching the stored data.

use serde::{Deserialize, Serialize};

use crate::time::BEAT_EPSILON;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TrackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackKind {
    #[default]
    Animation,
    Music,
}

/// Data carried by a keyframe. Asset-backed payloads are resolved during
/// playback; a missing asset is reported but never stops the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KeyframePayload {
    /// Rig pose or drawing referenced by asset id.
    Pose { asset: String },
    /// Audio sample triggered at the keyframe.
    Sample { asset: String },
    Note {
        pitch: u8,
        velocity: u8,
        length_beats: f64,
    },
    /// Free-form marker for external collaborators.
    Cue { label: String },
}

impl KeyframePayload {
    pub fn asset(&self) -> Option<&str> {
        match self {
            Self::Pose { asset } | Self::Sample { asset } => Some(asset),
            Self::Note { .. } | Self::Cue { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub beat: f64,
    pub track_id: TrackId,
    pub payload: KeyframePayload,
}

/// Ordered keyframe sequence with at most one keyframe per beat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    /// Muted tracks keep their data but are skipped during playback.
    #[serde(default)]
    pub muted: bool,
    keyframes: Vec<Keyframe>,
}

impl Track {
    pub fn new(id: impl Into<TrackId>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            muted: false,
            keyframes: Vec::new(),
        }
    }

    /// Inserts a keyframe keeping beat order. An existing keyframe at the same
    /// beat is replaced; the return value says whether that happened.
    pub fn insert(&mut self, beat: f64, payload: KeyframePayload) -> bool {
        let keyframe = Keyframe {
            beat,
            track_id: self.id.clone(),
            payload,
        };
        match self.locate(beat) {
            Ok(index) => {
                self.keyframes[index] = keyframe;
                true
            }
            Err(index) => {
                self.keyframes.insert(index, keyframe);
                false
            }
        }
    }

    pub fn remove(&mut self, beat: f64) -> Option<Keyframe> {
        self.locate(beat).ok().map(|index| self.keyframes.remove(index))
    }

    pub fn keyframe_at(&self, beat: f64) -> Option<&Keyframe> {
        self.locate(beat).ok().map(|index| &self.keyframes[index])
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Keyframes with `start < beat <= end`, or `start <= beat <= end` when
    /// `include_start` is set.
    pub fn keyframes_between(&self, start: f64, end: f64, include_start: bool) -> &[Keyframe] {
        let from = self.keyframes.partition_point(|k| {
            if include_start {
                k.beat < start - BEAT_EPSILON
            } else {
                k.beat <= start + BEAT_EPSILON
            }
        });
        let to = self
            .keyframes
            .partition_point(|k| k.beat <= end + BEAT_EPSILON);
        &self.keyframes[from..to.max(from)]
    }

    fn locate(&self, beat: f64) -> std::result::Result<usize, usize> {
        let index = self
            .keyframes
            .partition_point(|k| k.beat < beat - BEAT_EPSILON);
        match self.keyframes.get(index) {
            Some(existing) if (existing.beat - beat).abs() <= BEAT_EPSILON => Ok(index),
            _ => Err(index),
        }
    }
}
