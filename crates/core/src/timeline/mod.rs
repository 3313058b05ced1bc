//! Track ownership, keyframe placement through the beat grid, and fan-out of
//! time updates to registered listeners.

use crate::{
    command::EngineCommand,
    config::{validate_duration, EngineConfig},
    events::{EventBus, ListenerId, TimelineEvent, TimelineListener},
    grid::{BeatGridGenerator, BeatMarker, Subdivision},
    time::{beats_to_seconds, seconds_to_beats, Tempo, TimeSignature},
    track::{Keyframe, KeyframePayload, Track, TrackId, TrackKind},
    Result, TimelineError,
};

/// Where a keyframe ended up after snapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframePlacement {
    pub beat: f64,
    /// An existing keyframe at `beat` was overwritten.
    pub replaced: bool,
    /// The target track did not exist and was created with the default kind.
    pub created_track: bool,
}

#[derive(Debug)]
pub struct TimelineCoordinator {
    tempo: Tempo,
    signature: TimeSignature,
    duration_seconds: f64,
    subdivision: Subdivision,
    snap_enabled: bool,
    default_track_kind: TrackKind,
    tracks: Vec<Track>,
    /// `None` until first queried after a configuration change.
    grid: Option<Vec<BeatMarker>>,
    bus: EventBus,
}

impl TimelineCoordinator {
    pub fn new(tempo: Tempo, signature: TimeSignature, duration_seconds: f64) -> Self {
        Self {
            tempo,
            signature,
            duration_seconds: duration_seconds.max(0.0),
            subdivision: Subdivision::default(),
            snap_enabled: true,
            default_track_kind: TrackKind::default(),
            tracks: Vec::new(),
            grid: None,
            bus: EventBus::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut coordinator = Self::new(
            config.tempo()?,
            config.time_signature()?,
            config.timeline.duration()?,
        );
        coordinator.subdivision = config.subdivision()?;
        coordinator.snap_enabled = config.grid.snap_enabled;
        if let Some(kind) = config.authoring.initial_mode.track_kind() {
            coordinator.default_track_kind = kind;
        }
        Ok(coordinator)
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.signature
    }

    pub fn duration(&self) -> f64 {
        self.duration_seconds
    }

    pub fn subdivision(&self) -> Subdivision {
        self.subdivision
    }

    pub fn snap_enabled(&self) -> bool {
        self.snap_enabled
    }

    pub fn default_track_kind(&self) -> TrackKind {
        self.default_track_kind
    }

    /// Changes the tempo and returns the previous bpm. Keyframes keep their
    /// beat positions, so their positions in seconds move with the tempo.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<f64> {
        let tempo = Tempo::new(bpm)?;
        BeatGridGenerator::marker_count(self.duration_seconds, bpm, self.subdivision)?;
        let old = self.tempo.bpm();
        if tempo == self.tempo {
            return Ok(old);
        }
        self.tempo = tempo;
        self.invalidate_grid();
        self.bus.emit(TimelineEvent::TempoChanged { old, new: bpm });
        Ok(old)
    }

    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) -> Result<()> {
        let signature = TimeSignature::new(numerator, denominator)?;
        if signature == self.signature {
            return Ok(());
        }
        let old = std::mem::replace(&mut self.signature, signature);
        self.invalidate_grid();
        self.bus.emit(TimelineEvent::TimeSignatureChanged {
            old,
            new: signature,
        });
        Ok(())
    }

    pub fn set_duration(&mut self, seconds: f64) -> Result<()> {
        let seconds = validate_duration(seconds)?;
        BeatGridGenerator::marker_count(seconds, self.tempo.bpm(), self.subdivision)?;
        if seconds == self.duration_seconds {
            return Ok(());
        }
        let old = std::mem::replace(&mut self.duration_seconds, seconds);
        self.invalidate_grid();
        self.bus.emit(TimelineEvent::DurationChanged { old, new: seconds });
        Ok(())
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) -> Result<()> {
        BeatGridGenerator::marker_count(self.duration_seconds, self.tempo.bpm(), subdivision)?;
        if subdivision != self.subdivision {
            self.subdivision = subdivision;
            self.invalidate_grid();
        }
        Ok(())
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.snap_enabled = enabled;
    }

    pub fn set_default_track_kind(&mut self, kind: TrackKind) {
        self.default_track_kind = kind;
    }

    pub fn grid_is_stale(&self) -> bool {
        self.grid.is_none()
    }

    /// Current beat markers, regenerated first if the configuration changed
    /// since the last query. Regeneration publishes `beat-markers-updated`.
    pub fn beat_markers(&mut self) -> &[BeatMarker] {
        if self.grid.is_none() {
            let markers = BeatGridGenerator::generate_with(
                self.duration_seconds,
                self.tempo.bpm(),
                self.signature,
                self.subdivision,
            );
            tracing::debug!(count = markers.len(), "regenerated beat grid");
            self.bus.emit(TimelineEvent::BeatMarkersUpdated {
                markers: markers.clone(),
            });
            self.grid = Some(markers);
        }
        self.grid.as_deref().unwrap_or_default()
    }

    pub fn nearest_marker(&mut self, time_seconds: f64) -> Option<BeatMarker> {
        BeatGridGenerator::nearest_marker(self.beat_markers(), time_seconds).copied()
    }

    pub fn add_track(&mut self, id: impl Into<TrackId>, kind: TrackKind) -> Result<()> {
        let id = id.into();
        if self.track(&id).is_some() {
            return Err(TimelineError::DuplicateTrack(id.to_string()));
        }
        self.tracks.push(Track::new(id, kind));
        Ok(())
    }

    pub fn remove_track(&mut self, id: &TrackId) -> Option<Track> {
        let index = self.tracks.iter().position(|track| &track.id == id)?;
        Some(self.tracks.remove(index))
    }

    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|track| &track.id == id)
    }

    /// Tracks in creation order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn set_track_muted(&mut self, id: &TrackId, muted: bool) -> Result<()> {
        let track = self
            .track_mut(id)
            .ok_or_else(|| TimelineError::UnknownTrack(id.to_string()))?;
        track.muted = muted;
        Ok(())
    }

    /// Beat a keyframe dropped at `time_seconds` lands on, after snapping.
    pub fn placement_beat(&self, time_seconds: f64) -> Result<f64> {
        if !time_seconds.is_finite() || time_seconds < 0.0 {
            return Err(TimelineError::invalid(format!(
                "keyframe time must be a non-negative number of seconds, got {time_seconds}"
            )));
        }
        let beats = seconds_to_beats(time_seconds, self.tempo.bpm());
        Ok(if self.snap_enabled {
            BeatGridGenerator::quantize_beats(beats, self.subdivision)
        } else {
            beats
        })
    }

    /// Places a keyframe at `time_seconds`, snapped to the grid when snapping
    /// is enabled. Unknown tracks are created with the default track kind.
    pub fn add_keyframe(
        &mut self,
        track_id: impl Into<TrackId>,
        time_seconds: f64,
        payload: KeyframePayload,
    ) -> Result<KeyframePlacement> {
        let track_id = track_id.into();
        let beat = self.placement_beat(time_seconds)?;

        let created_track = self.track(&track_id).is_none();
        if created_track {
            self.tracks
                .push(Track::new(track_id.clone(), self.default_track_kind));
        }
        let replaced = self
            .track_mut(&track_id)
            .map(|track| track.insert(beat, payload))
            .unwrap_or_default();

        self.bus.emit(TimelineEvent::KeyframeAdded {
            track: track_id,
            beat,
            replaced,
        });
        Ok(KeyframePlacement {
            beat,
            replaced,
            created_track,
        })
    }

    /// Removes the keyframe at `beat`. Absent keyframes and unknown tracks are
    /// ignored.
    pub fn remove_keyframe(&mut self, track_id: &TrackId, beat: f64) -> Option<Keyframe> {
        let removed = self.track_mut(track_id)?.remove(beat)?;
        self.bus.emit(TimelineEvent::KeyframeRemoved {
            track: track_id.clone(),
            beat: removed.beat,
        });
        Some(removed)
    }

    /// Moves the keyframe at `from_beat` to `to_seconds`, snapping like
    /// [`TimelineCoordinator::add_keyframe`].
    pub fn move_keyframe(
        &mut self,
        track_id: &TrackId,
        from_beat: f64,
        to_seconds: f64,
    ) -> Result<KeyframePlacement> {
        let to_beat = self.placement_beat(to_seconds)?;
        let track = self
            .track_mut(track_id)
            .ok_or_else(|| TimelineError::UnknownTrack(track_id.to_string()))?;
        let keyframe = track.remove(from_beat).ok_or_else(|| {
            TimelineError::invalid(format!("no keyframe at beat {from_beat} on `{track_id}`"))
        })?;
        let replaced = track.insert(to_beat, keyframe.payload);

        self.bus.emit(TimelineEvent::KeyframeMoved {
            track: track_id.clone(),
            from_beat: keyframe.beat,
            to_beat,
            replaced,
        });
        Ok(KeyframePlacement {
            beat: to_beat,
            replaced,
            created_track: false,
        })
    }

    /// Position of `beat` in seconds under the current tempo.
    pub fn beat_to_seconds(&self, beat: f64) -> f64 {
        beats_to_seconds(beat, self.tempo.bpm())
    }

    /// Keyframes of unmuted tracks whose time falls in the window from
    /// `start_seconds` to `end_seconds`. The window end is inclusive; the
    /// start is inclusive only when `include_start` is set. Ordered by beat,
    /// then by track creation order.
    pub fn keyframes_crossed(
        &self,
        start_seconds: f64,
        end_seconds: f64,
        include_start: bool,
    ) -> Vec<Keyframe> {
        let bpm = self.tempo.bpm();
        let start = seconds_to_beats(start_seconds, bpm);
        let end = seconds_to_beats(end_seconds, bpm);

        let mut crossed: Vec<Keyframe> = self
            .tracks
            .iter()
            .filter(|track| !track.muted)
            .flat_map(|track| track.keyframes_between(start, end, include_start))
            .cloned()
            .collect();
        // Stable sort keeps track order for keyframes on the same beat.
        crossed.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        crossed
    }

    /// Broadcasts the current time to every listener. Holds no time state of
    /// its own; the playback clock owns "now".
    pub fn on_tick(&mut self, current_time_seconds: f64) {
        self.bus.emit(TimelineEvent::TimeUpdate {
            current_time: current_time_seconds,
        });
    }

    pub fn emit(&mut self, event: TimelineEvent) {
        self.bus.emit(event);
    }

    pub fn subscribe(&mut self, listener: impl TimelineListener + 'static) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Commands listeners queued while handling notifications.
    pub fn take_deferred(&mut self) -> Vec<EngineCommand> {
        self.bus.take_deferred()
    }

    fn track_mut(&mut self, id: &TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|track| &track.id == id)
    }

    fn invalidate_grid(&mut self) {
        self.grid = None;
    }
}
