//! Notifications emitted by the timeline and the listener registry that fans
//! them out.
//!
//! Listeners are called in registration order and all observe the same event
//! value. They never receive a handle to the engine: follow-up work is pushed
//! onto a [`CommandQueue`] and runs once the current dispatch has returned,
//! which rules out re-entrant `tick`/`play`/`pause` calls from inside a
//! notification. Duplicate `time-update` events with an unchanged time are
//! possible, so listeners must treat them idempotently.

use std::{cell::RefCell, fmt, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    authoring::AuthoringMode,
    command::{CommandQueue, EngineCommand},
    grid::BeatMarker,
    time::TimeSignature,
    track::{KeyframePayload, TrackId},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TimelineEvent {
    TimeUpdate {
        current_time: f64,
    },
    BeatMarkersUpdated {
        markers: Vec<BeatMarker>,
    },
    KeyframeAdded {
        track: TrackId,
        beat: f64,
        replaced: bool,
    },
    KeyframeRemoved {
        track: TrackId,
        beat: f64,
    },
    KeyframeMoved {
        track: TrackId,
        from_beat: f64,
        to_beat: f64,
        replaced: bool,
    },
    /// Playback crossed a keyframe.
    KeyframeReached {
        track: TrackId,
        beat: f64,
        payload: KeyframePayload,
    },
    /// A crossed keyframe references an asset nobody could resolve.
    AssetMissing {
        track: TrackId,
        beat: f64,
        asset: String,
    },
    PlaybackStarted {
        from: f64,
    },
    PlaybackPaused {
        at: f64,
    },
    PlaybackStopped,
    TempoChanged {
        old: f64,
        new: f64,
    },
    TimeSignatureChanged {
        old: TimeSignature,
        new: TimeSignature,
    },
    DurationChanged {
        old: f64,
        new: f64,
    },
    AuthoringModeChanged {
        previous: AuthoringMode,
        current: AuthoringMode,
    },
}

pub trait TimelineListener {
    fn on_event(&mut self, event: &TimelineEvent, commands: &mut CommandQueue);
}

impl<F> TimelineListener for F
where
    F: FnMut(&TimelineEvent, &mut CommandQueue),
{
    fn on_event(&mut self, event: &TimelineEvent, commands: &mut CommandQueue) {
        self(event, commands);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerId, Box<dyn TimelineListener>)>,
    next_id: u64,
    deferred: CommandQueue,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl TimelineListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` when `id` was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn emit(&mut self, event: TimelineEvent) {
        for (_, listener) in &mut self.listeners {
            listener.on_event(&event, &mut self.deferred);
        }
    }

    /// Commands queued by listeners since the last call.
    pub fn take_deferred(&mut self) -> Vec<EngineCommand> {
        self.deferred.drain()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

/// Listener that stores every event it sees. Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<TimelineEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TimelineEvent> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<TimelineEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn count(&self, predicate: impl Fn(&TimelineEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|event| predicate(event)).count()
    }
}

impl TimelineListener for EventRecorder {
    fn on_event(&mut self, event: &TimelineEvent, _commands: &mut CommandQueue) {
        self.events.borrow_mut().push(event.clone());
    }
}
