//! Beat grid generation and quantisation.

use serde::{Deserialize, Serialize};

use crate::{
    time::{beats_to_seconds, seconds_to_beats, snap_to_integer, TimeSignature, BEAT_EPSILON},
    Result, TimelineError,
};

/// Grid step expressed as a fraction of one beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Subdivision(f64);

impl Subdivision {
    pub const BEAT: Self = Self(1.0);
    pub const HALF_BEAT: Self = Self(0.5);
    pub const QUARTER_BEAT: Self = Self(0.25);
    pub const EIGHTH_BEAT: Self = Self(0.125);

    pub fn new(beats: f64) -> Result<Self> {
        if !beats.is_finite() || beats <= 0.0 {
            return Err(TimelineError::invalid(format!(
                "grid subdivision must be a positive fraction of a beat, got {beats}"
            )));
        }
        Ok(Self(beats))
    }

    pub fn beats(self) -> f64 {
        self.0
    }
}

impl Default for Subdivision {
    fn default() -> Self {
        Self::QUARTER_BEAT
    }
}

impl TryFrom<f64> for Subdivision {
    type Error = TimelineError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Subdivision> for f64 {
    fn from(value: Subdivision) -> Self {
        value.0
    }
}

/// One point of the generated grid. Markers are derived data: they are
/// regenerated whenever tempo, signature or duration change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMarker {
    pub time_seconds: f64,
    pub beat: f64,
    pub measure: u64,
    pub is_measure_start: bool,
    pub is_beat_start: bool,
    /// Position inside the enclosing beat, in `[0, 1)`.
    pub subdivision_fraction: f64,
}

impl BeatMarker {
    /// Rendering priority: measure start 3, beat start 2, subdivision 1.
    pub fn weight(&self) -> u8 {
        if self.is_measure_start {
            3
        } else if self.is_beat_start {
            2
        } else {
            1
        }
    }
}

pub struct BeatGridGenerator;

impl BeatGridGenerator {
    /// Largest grid the generator will build. Tempo, duration and subdivision
    /// changes that would exceed it are rejected before they take effect.
    pub const MAX_MARKERS: u64 = 1_000_000;

    /// Number of markers a grid over `duration_seconds` would hold. Fails
    /// when it would exceed [`BeatGridGenerator::MAX_MARKERS`] or the inputs
    /// do not describe a finite grid.
    pub fn marker_count(duration_seconds: f64, bpm: f64, subdivision: Subdivision) -> Result<u64> {
        let steps = Self::step_count(duration_seconds, bpm, subdivision);
        if !steps.is_finite() || steps >= Self::MAX_MARKERS as f64 {
            return Err(TimelineError::invalid(format!(
                "a {duration_seconds} s grid at {bpm} bpm in steps of {} beats exceeds {} markers",
                subdivision.beats(),
                Self::MAX_MARKERS
            )));
        }
        Ok(steps as u64 + 1)
    }

    /// Generates markers every quarter beat from zero up to and including the
    /// beat equivalent of `duration_seconds`.
    pub fn generate(duration_seconds: f64, bpm: f64, signature: TimeSignature) -> Vec<BeatMarker> {
        Self::generate_with(duration_seconds, bpm, signature, Subdivision::default())
    }

    /// Same as [`BeatGridGenerator::generate`] with an explicit step. Markers
    /// come out in strictly ascending time order.
    pub fn generate_with(
        duration_seconds: f64,
        bpm: f64,
        signature: TimeSignature,
        subdivision: Subdivision,
    ) -> Vec<BeatMarker> {
        let step = subdivision.beats();
        // Callers validate with `marker_count`; the cap keeps unchecked input
        // from exhausting memory.
        let steps = (Self::step_count(duration_seconds, bpm, subdivision) as u64)
            .min(Self::MAX_MARKERS - 1);
        let per_measure = signature.beats_per_measure();

        (0..=steps)
            .map(|index| {
                // Multiply rather than accumulate so long grids do not drift.
                let beat = snap_to_integer(index as f64 * step);
                let measures = snap_to_integer(beat / per_measure);
                let whole_beat = beat.floor();

                BeatMarker {
                    time_seconds: beats_to_seconds(beat, bpm),
                    beat,
                    measure: measures.floor() as u64,
                    is_measure_start: measures.fract() == 0.0,
                    is_beat_start: beat.fract() == 0.0,
                    subdivision_fraction: beat - whole_beat,
                }
            })
            .collect()
    }

    fn step_count(duration_seconds: f64, bpm: f64, subdivision: Subdivision) -> f64 {
        let total_beats = seconds_to_beats(duration_seconds.max(0.0), bpm);
        (total_beats / subdivision.beats() + BEAT_EPSILON).floor()
    }

    /// Snaps `time_seconds` to the nearest multiple of `subdivision` beats.
    ///
    /// With snapping disabled the time is returned untouched and the
    /// subdivision is not inspected.
    pub fn quantize(
        time_seconds: f64,
        bpm: f64,
        subdivision: f64,
        snap_enabled: bool,
    ) -> Result<f64> {
        if !snap_enabled {
            return Ok(time_seconds);
        }
        let subdivision = Subdivision::new(subdivision)?;
        let beats = Self::quantize_beats(seconds_to_beats(time_seconds, bpm), subdivision);
        Ok(beats_to_seconds(beats, bpm))
    }

    /// Rounds a beat position to the grid. Exact half-step distances round up,
    /// towards the later beat.
    pub fn quantize_beats(beats: f64, subdivision: Subdivision) -> f64 {
        let step = subdivision.beats();
        // Beat values that are already on the grid can carry representation
        // error from the seconds round trip; snap the ratio first.
        let steps = snap_to_integer(beats / step);
        (steps + 0.5).floor() * step
    }

    /// Marker closest in time to `time_seconds`. Equidistant candidates
    /// resolve to the earlier marker. `markers` must be in ascending order.
    pub fn nearest_marker(markers: &[BeatMarker], time_seconds: f64) -> Option<&BeatMarker> {
        let index = markers.partition_point(|marker| marker.time_seconds < time_seconds);
        match (index.checked_sub(1).and_then(|i| markers.get(i)), markers.get(index)) {
            (Some(before), Some(after)) => {
                if time_seconds - before.time_seconds <= after.time_seconds - time_seconds {
                    Some(before)
                } else {
                    Some(after)
                }
            }
            (before, after) => before.or(after),
        }
    }

    pub fn marker_weight(marker: &BeatMarker) -> u8 {
        marker.weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn generates_quarter_beat_grid_for_two_seconds() {
        let markers = BeatGridGenerator::generate(2.0, 120.0, TimeSignature::COMMON);

        assert_eq!(markers.len(), 17);
        for (index, marker) in markers.iter().enumerate() {
            assert!((marker.beat - index as f64 * 0.25).abs() < TOLERANCE);
        }

        let last = markers.last().unwrap();
        assert_eq!(last.beat, 4.0);
        assert!((last.time_seconds - 2.0).abs() < TOLERANCE);
        assert!(last.is_measure_start);
        assert_eq!(last.measure, 1);
    }

    #[test]
    fn flags_measure_and_beat_starts() {
        let waltz = TimeSignature::new(3, 4).unwrap();
        let markers =
            BeatGridGenerator::generate_with(3.0, 60.0, waltz, Subdivision::HALF_BEAT);

        let measure_starts: Vec<f64> = markers
            .iter()
            .filter(|m| m.is_measure_start)
            .map(|m| m.beat)
            .collect();
        assert_eq!(measure_starts, vec![0.0, 3.0]);

        let half = markers.iter().find(|m| m.beat == 1.5).unwrap();
        assert!(!half.is_beat_start);
        assert!((half.subdivision_fraction - 0.5).abs() < TOLERANCE);
        assert_eq!(half.measure, 0);
    }

    #[test]
    fn markers_are_strictly_ascending() {
        for subdivision in [0.1, 0.25, 1.0 / 3.0, 1.0] {
            let markers = BeatGridGenerator::generate_with(
                17.3,
                133.0,
                TimeSignature::new(7, 8).unwrap(),
                Subdivision::new(subdivision).unwrap(),
            );
            assert!(markers
                .windows(2)
                .all(|pair| pair[0].time_seconds < pair[1].time_seconds));
        }
    }

    #[test]
    fn counts_markers_and_rejects_oversized_grids() {
        let quarter = Subdivision::QUARTER_BEAT;
        assert_eq!(BeatGridGenerator::marker_count(2.0, 120.0, quarter).unwrap(), 17);
        assert_eq!(BeatGridGenerator::marker_count(0.0, 120.0, quarter).unwrap(), 1);

        for (duration, bpm) in [(30.0, 1e300), (f64::INFINITY, 120.0), (1e15, 120.0)] {
            let err = BeatGridGenerator::marker_count(duration, bpm, quarter).unwrap_err();
            assert!(matches!(err, TimelineError::InvalidParameter(_)));
        }
    }

    #[test]
    fn unchecked_generation_is_capped() {
        let markers =
            BeatGridGenerator::generate_with(1e6, 120.0, TimeSignature::COMMON, Subdivision::BEAT);
        assert_eq!(markers.len() as u64, BeatGridGenerator::MAX_MARKERS);
    }

    #[test]
    fn zero_duration_yields_origin_marker() {
        let markers = BeatGridGenerator::generate(0.0, 120.0, TimeSignature::COMMON);
        assert_eq!(markers.len(), 1);
        assert!(markers[0].is_measure_start);
        assert_eq!(markers[0].weight(), 3);
    }

    #[test]
    fn snaps_to_nearest_subdivision() {
        // 0.97 s at 120 bpm is beat 1.94, which snaps to beat 2.0 (1.0 s).
        let snapped = BeatGridGenerator::quantize(0.97, 120.0, 0.25, true).unwrap();
        assert!((snapped - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn half_step_ties_round_towards_later_beat() {
        // Beat 0.125 lies exactly between 0.0 and 0.25.
        let snapped = BeatGridGenerator::quantize(0.0625, 120.0, 0.25, true).unwrap();
        assert!((snapped - 0.125).abs() < TOLERANCE);
        assert_eq!(
            BeatGridGenerator::quantize_beats(2.375, Subdivision::QUARTER_BEAT),
            2.5
        );
    }

    #[test]
    fn quantisation_is_idempotent() {
        for time in [0.0, 0.013, 0.49, 0.97, 1.2345, 7.77, 59.999] {
            for subdivision in [0.1, 0.25, 0.5, 1.0 / 3.0] {
                let once = BeatGridGenerator::quantize(time, 97.0, subdivision, true).unwrap();
                let twice = BeatGridGenerator::quantize(once, 97.0, subdivision, true).unwrap();
                assert_eq!(once, twice, "time {time} subdivision {subdivision}");
            }
        }
    }

    #[test]
    fn disabled_snapping_is_identity() {
        let time = BeatGridGenerator::quantize(0.97, 120.0, 0.25, false).unwrap();
        assert_eq!(time, 0.97);
        // The subdivision is not consulted when snapping is off.
        assert!(BeatGridGenerator::quantize(0.97, 120.0, 0.0, false).is_ok());
    }

    #[test]
    fn rejects_non_positive_subdivision() {
        assert!(BeatGridGenerator::quantize(1.0, 120.0, 0.0, true).is_err());
        assert!(BeatGridGenerator::quantize(1.0, 120.0, -0.25, true).is_err());
        assert!(Subdivision::new(f64::INFINITY).is_err());
    }

    #[test]
    fn nearest_marker_prefers_earlier_on_ties() {
        let markers = BeatGridGenerator::generate(2.0, 120.0, TimeSignature::COMMON);
        // Markers every 0.125 s; 0.0625 is exactly between the first two.
        let nearest = BeatGridGenerator::nearest_marker(&markers, 0.0625).unwrap();
        assert_eq!(nearest.beat, 0.0);

        let nearest = BeatGridGenerator::nearest_marker(&markers, 0.07).unwrap();
        assert_eq!(nearest.beat, 0.25);

        let nearest = BeatGridGenerator::nearest_marker(&markers, 10.0).unwrap();
        assert_eq!(nearest.beat, 4.0);

        let nearest = BeatGridGenerator::nearest_marker(&markers, -1.0).unwrap();
        assert_eq!(nearest.beat, 0.0);

        assert!(BeatGridGenerator::nearest_marker(&[], 1.0).is_none());
    }

    #[test]
    fn weights_rank_measure_beat_subdivision() {
        let markers = BeatGridGenerator::generate(2.0, 120.0, TimeSignature::COMMON);
        let weights: Vec<u8> = markers[..5].iter().map(BeatGridGenerator::marker_weight).collect();
        assert_eq!(weights, vec![3, 1, 1, 1, 2]);
    }
}
