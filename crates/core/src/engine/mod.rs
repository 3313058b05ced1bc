//! Wiring of the playback clock, the coordinator and the authoring router
//! behind the command surface used by the UI layer.
//!
//! The engine owns no timer. An external driver calls [`TimelineEngine::tick`]
//! once per rendered frame while [`TimelineEngine::wants_frames`] is true.

use std::fmt;

use crate::{
    assets::AssetResolver,
    audio::{SilentSink, SoundSink},
    authoring::{AuthoringMode, AuthoringModeRouter, AuthoringOverlay, ModeSwitch},
    clock::{MonotonicClock, PlaybackClock, PlaybackState, PlaybackStatus, Transition},
    command::EngineCommand,
    config::EngineConfig,
    events::{ListenerId, TimelineEvent, TimelineListener},
    grid::{BeatMarker, Subdivision},
    time::{position_at, MusicalPosition},
    timeline::{KeyframePlacement, TimelineCoordinator},
    track::{Keyframe, KeyframePayload, Track, TrackId, TrackKind},
    Result, TimelineError,
};

/// Upper bound on follow-up rounds of listener-queued commands.
const MAX_DEFERRED_ROUNDS: usize = 16;

pub struct TimelineEngine<C> {
    clock: PlaybackClock<C>,
    timeline: TimelineCoordinator,
    router: AuthoringModeRouter,
    sound: Box<dyn SoundSink>,
    assets: Option<Box<dyn AssetResolver>>,
    /// Keyframes after this time (or at it, when inclusive) fire on the next
    /// tick.
    scan_from: f64,
    scan_inclusive: bool,
    driver_attached: bool,
}

impl<C: MonotonicClock> TimelineEngine<C> {
    /// Builds an engine around `clock`. The clock still has to be acquired
    /// with [`TimelineEngine::initialize`] before playback can start.
    pub fn new(clock: C, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut timeline = TimelineCoordinator::from_config(config)?;
        let mut router = AuthoringModeRouter::new();
        router.set_mode(config.authoring.initial_mode, &mut timeline);

        Ok(Self {
            clock: PlaybackClock::new(clock, timeline.duration()),
            timeline,
            router,
            sound: Box::new(SilentSink),
            assets: None,
            scan_from: 0.0,
            scan_inclusive: true,
            driver_attached: false,
        })
    }

    pub fn with_sound_sink(mut self, sink: impl SoundSink + 'static) -> Self {
        self.sound = Box::new(sink);
        self
    }

    /// Enables asset checks for fired keyframes. Without a resolver every
    /// asset is assumed present.
    pub fn with_assets(mut self, assets: impl AssetResolver + 'static) -> Self {
        self.assets = Some(Box::new(assets));
        self
    }

    /// One-time acquisition of the clock resource. Failure is fatal to
    /// startup and reported as [`crate::TimelineError::ResourceUnavailable`].
    pub fn initialize(&mut self) -> Result<()> {
        self.clock.initialize().map_err(|err| {
            tracing::error!(%err, "failed to acquire playback clock");
            err
        })
    }

    pub fn is_ready(&self) -> bool {
        self.clock.is_ready()
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.clock.status()
    }

    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    pub fn position(&self) -> MusicalPosition {
        position_at(
            self.clock.current_time(),
            self.timeline.bpm(),
            self.timeline.time_signature(),
        )
    }

    /// Whether the frame driver should keep calling [`TimelineEngine::tick`].
    pub fn wants_frames(&self) -> bool {
        self.driver_attached
    }

    /// Read access to tracks, tempo and grid settings.
    pub fn timeline(&self) -> &TimelineCoordinator {
        &self.timeline
    }

    pub fn authoring_mode(&self) -> AuthoringMode {
        self.router.active()
    }

    pub fn beat_markers(&mut self) -> &[BeatMarker] {
        if self.timeline.grid_is_stale() {
            self.timeline.beat_markers();
            self.run_deferred();
        }
        self.timeline.beat_markers()
    }

    pub fn subscribe(&mut self, listener: impl TimelineListener + 'static) -> ListenerId {
        self.timeline.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.timeline.unsubscribe(id)
    }

    pub fn attach_overlay(&mut self, mode: AuthoringMode, overlay: impl AuthoringOverlay + 'static) {
        self.router.attach_overlay(mode, Box::new(overlay));
    }

    /// Runs a named command. Results other than success or failure are
    /// dropped; use the dedicated methods to read them.
    pub fn apply(&mut self, command: EngineCommand) -> Result<()> {
        let result = self.execute(command);
        self.run_deferred();
        result
    }

    pub fn play(&mut self, from: Option<f64>) -> Result<()> {
        self.apply(EngineCommand::Play { from })
    }

    /// Pauses playback and returns the frozen time.
    pub fn pause(&mut self) -> f64 {
        self.pause_now();
        self.run_deferred();
        self.clock.current_time()
    }

    /// Halts playback and sound, detaches the frame driver and rewinds to zero.
    /// Nothing fires after this returns until `play` is called again.
    pub fn stop(&mut self) {
        self.stop_now();
        self.run_deferred();
    }

    /// Seeks to `time_seconds`, clamped to the timeline. Returns the applied
    /// position.
    pub fn seek(&mut self, time_seconds: f64) -> f64 {
        let target = self.seek_now(time_seconds);
        self.run_deferred();
        target
    }

    /// Per-frame entry point. While playing, derives the current time, fires
    /// crossed keyframes and broadcasts `time-update`. Otherwise returns the
    /// frozen time without notifying anyone.
    pub fn tick(&mut self) -> f64 {
        let now = self.tick_now();
        self.run_deferred();
        now
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        self.apply(EngineCommand::SetTempo { bpm })
    }

    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) -> Result<()> {
        self.apply(EngineCommand::SetTimeSignature {
            numerator,
            denominator,
        })
    }

    pub fn set_duration(&mut self, seconds: f64) -> Result<()> {
        self.apply(EngineCommand::SetDuration { seconds })
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) -> Result<()> {
        self.timeline.set_subdivision(subdivision)?;
        self.publish_grid();
        self.run_deferred();
        Ok(())
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.timeline.set_snap_enabled(enabled);
    }

    pub fn add_track(&mut self, id: impl Into<TrackId>, kind: TrackKind) -> Result<()> {
        self.timeline.add_track(id, kind)
    }

    pub fn remove_track(&mut self, id: &TrackId) -> Option<Track> {
        self.timeline.remove_track(id)
    }

    pub fn set_track_muted(&mut self, id: &TrackId, muted: bool) -> Result<()> {
        self.timeline.set_track_muted(id, muted)
    }

    pub fn add_keyframe(
        &mut self,
        track: impl Into<TrackId>,
        time_seconds: f64,
        payload: KeyframePayload,
    ) -> Result<KeyframePlacement> {
        let placement = self.timeline.add_keyframe(track, time_seconds, payload);
        self.run_deferred();
        placement
    }

    pub fn remove_keyframe(&mut self, track: &TrackId, beat: f64) -> Option<Keyframe> {
        let removed = self.timeline.remove_keyframe(track, beat);
        self.run_deferred();
        removed
    }

    pub fn move_keyframe(
        &mut self,
        track: &TrackId,
        from_beat: f64,
        to_seconds: f64,
    ) -> Result<KeyframePlacement> {
        let placement = self.timeline.move_keyframe(track, from_beat, to_seconds);
        self.run_deferred();
        placement
    }

    pub fn set_authoring_mode(&mut self, mode: AuthoringMode) -> ModeSwitch {
        let switch = self.router.set_mode(mode, &mut self.timeline);
        self.run_deferred();
        switch
    }

    pub fn toggle_authoring_mode(&mut self, mode: AuthoringMode) -> ModeSwitch {
        let switch = self.router.toggle_mode(mode, &mut self.timeline);
        self.run_deferred();
        switch
    }

    fn execute(&mut self, command: EngineCommand) -> Result<()> {
        match command {
            EngineCommand::Play { from } => self.play_now(from),
            EngineCommand::Pause => {
                self.pause_now();
                Ok(())
            }
            EngineCommand::Stop => {
                self.stop_now();
                Ok(())
            }
            EngineCommand::Seek { time } => {
                self.seek_now(time);
                Ok(())
            }
            EngineCommand::SetTempo { bpm } => {
                let old = self.timeline.set_tempo(bpm)?;
                if old != bpm {
                    tracing::info!(old, new = bpm, "tempo changed");
                }
                self.publish_grid();
                Ok(())
            }
            EngineCommand::SetTimeSignature {
                numerator,
                denominator,
            } => {
                self.timeline.set_time_signature(numerator, denominator)?;
                self.publish_grid();
                Ok(())
            }
            EngineCommand::SetDuration { seconds } => {
                self.timeline.set_duration(seconds)?;
                self.clock.set_duration(seconds);
                self.publish_grid();
                Ok(())
            }
            EngineCommand::AddKeyframe {
                track,
                time,
                payload,
            } => self.timeline.add_keyframe(track, time, payload).map(|_| ()),
            EngineCommand::RemoveKeyframe { track, beat } => {
                self.timeline.remove_keyframe(&track, beat);
                Ok(())
            }
            EngineCommand::SetAuthoringMode { mode } => {
                self.router.set_mode(mode, &mut self.timeline);
                Ok(())
            }
        }
    }

    fn play_now(&mut self, requested: Option<f64>) -> Result<()> {
        if let Transition::Started { from } = self.clock.play(requested)? {
            self.driver_attached = true;
            // A plain resume where the last scan ended must not fire its
            // keyframes twice; an explicit start position rescans it.
            if requested.is_some() || from != self.scan_from {
                self.scan_from = from;
                self.scan_inclusive = true;
            }
            tracing::info!(from, "playback started");
            self.timeline.emit(TimelineEvent::PlaybackStarted { from });
        }
        Ok(())
    }

    fn pause_now(&mut self) {
        if let Transition::Paused { at } = self.clock.pause() {
            self.halt();
            tracing::info!(at, "playback paused");
            self.timeline.emit(TimelineEvent::PlaybackPaused { at });
        }
    }

    fn stop_now(&mut self) {
        let transition = self.clock.stop();
        self.halt();
        self.scan_from = 0.0;
        self.scan_inclusive = true;
        if transition == Transition::Stopped {
            tracing::info!("playback stopped");
            self.timeline.emit(TimelineEvent::PlaybackStopped);
        }
    }

    fn seek_now(&mut self, time_seconds: f64) -> f64 {
        let target = self.clock.seek(time_seconds);
        self.scan_from = target;
        self.scan_inclusive = true;
        self.timeline.on_tick(target);
        target
    }

    fn tick_now(&mut self) -> f64 {
        if !self.driver_attached || !self.clock.is_playing() {
            return self.clock.current_time();
        }

        let end = self.clock.duration();
        let mut now = self.clock.tick();
        let reached_end = now >= end;
        if reached_end {
            now = self.clock.seek(end);
        }

        self.fire_keyframes(now);
        self.timeline.on_tick(now);

        if reached_end {
            self.pause_now();
        }
        now
    }

    fn fire_keyframes(&mut self, now: f64) {
        let crossed = self
            .timeline
            .keyframes_crossed(self.scan_from, now, self.scan_inclusive);
        self.scan_from = now;
        self.scan_inclusive = false;

        for keyframe in crossed {
            let resolved = match &self.assets {
                Some(assets) => assets.resolve(&keyframe.payload),
                None => Ok(()),
            };
            if let Err(TimelineError::MissingAsset(asset)) = resolved {
                tracing::warn!(
                    track = %keyframe.track_id,
                    beat = keyframe.beat,
                    %asset,
                    "keyframe references a missing asset; playback continues"
                );
                self.timeline.emit(TimelineEvent::AssetMissing {
                    track: keyframe.track_id,
                    beat: keyframe.beat,
                    asset,
                });
                continue;
            }

            let kind = self.timeline.track(&keyframe.track_id).map(|t| t.kind);
            if kind == Some(TrackKind::Music) {
                self.sound.trigger(&keyframe, now);
            }
            self.timeline.emit(TimelineEvent::KeyframeReached {
                track: keyframe.track_id,
                beat: keyframe.beat,
                payload: keyframe.payload,
            });
        }
    }

    /// Releases sound and detaches the frame driver.
    fn halt(&mut self) {
        self.sound.release_all();
        self.driver_attached = false;
    }

    /// Regenerates the grid if a configuration change invalidated it, which
    /// publishes `beat-markers-updated` once per change.
    fn publish_grid(&mut self) {
        if self.timeline.grid_is_stale() {
            self.timeline.beat_markers();
        }
    }

    fn run_deferred(&mut self) {
        for _ in 0..MAX_DEFERRED_ROUNDS {
            let commands = self.timeline.take_deferred();
            if commands.is_empty() {
                return;
            }
            for command in commands {
                if let Err(err) = self.execute(command) {
                    tracing::warn!(%err, "deferred command failed");
                }
            }
        }

        let dropped = self.timeline.take_deferred().len();
        if dropped > 0 {
            tracing::warn!(dropped, "dropping listener commands after too many follow-up rounds");
        }
    }
}

impl<C: MonotonicClock> fmt::Debug for TimelineEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineEngine")
            .field("state", &self.clock.state())
            .field("timeline", &self.timeline)
            .field("router", &self.router)
            .field("driver_attached", &self.driver_attached)
            .finish()
    }
}
