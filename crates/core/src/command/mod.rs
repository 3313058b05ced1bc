//! Named engine commands, and the queue listeners use to request them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    authoring::AuthoringMode,
    track::{KeyframePayload, TrackId},
};

/// A command accepted by [`crate::TimelineEngine::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum EngineCommand {
    Play {
        #[serde(default)]
        from: Option<f64>,
    },
    Pause,
    Stop,
    Seek {
        time: f64,
    },
    SetTempo {
        bpm: f64,
    },
    SetTimeSignature {
        numerator: u32,
        denominator: u32,
    },
    SetDuration {
        seconds: f64,
    },
    AddKeyframe {
        track: TrackId,
        time: f64,
        payload: KeyframePayload,
    },
    RemoveKeyframe {
        track: TrackId,
        beat: f64,
    },
    SetAuthoringMode {
        mode: AuthoringMode,
    },
}

/// Commands deferred until the current notification round has finished.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommandQueue {
    pending: VecDeque<EngineCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: EngineCommand) {
        self.pending.push_back(command);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Removes and returns every queued command in submission order.
    pub fn drain(&mut self) -> Vec<EngineCommand> {
        self.pending.drain(..).collect()
    }
}
