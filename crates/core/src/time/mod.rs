//! Beat, second and measure conversions.
//!
//! The free functions in this module are pure and trust their caller: `bpm`
//! must already be validated as positive and finite. Validation happens once,
//! where tempo and signature values enter the engine ([`Tempo::new`],
//! [`TimeSignature::new`]).

use serde::{Deserialize, Serialize};

use crate::{Result, TimelineError};

/// Tolerance used when deciding whether a fractional beat lies on a boundary.
pub(crate) const BEAT_EPSILON: f64 = 1e-9;

/// Musical meter, e.g. 4/4 or 6/8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats per measure.
    pub numerator: u32,
    /// Note value that receives one beat. Validated, but a beat is always
    /// `60 / bpm` seconds long regardless of this value.
    pub denominator: u32,
}

impl TimeSignature {
    pub const COMMON: Self = Self {
        numerator: 4,
        denominator: 4,
    };

    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        if numerator == 0 || denominator == 0 {
            return Err(TimelineError::invalid(format!(
                "time signature {numerator}/{denominator} must have a positive numerator and denominator"
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn beats_per_measure(&self) -> f64 {
        f64::from(self.numerator)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Validated tempo in beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tempo(f64);

impl Tempo {
    pub fn new(bpm: f64) -> Result<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(TimelineError::invalid(format!(
                "tempo must be a positive number of beats per minute, got {bpm}"
            )));
        }
        Ok(Self(bpm))
    }

    pub fn bpm(self) -> f64 {
        self.0
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(120.0)
    }
}

impl TryFrom<f64> for Tempo {
    type Error = TimelineError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Tempo> for f64 {
    fn from(value: Tempo) -> Self {
        value.0
    }
}

pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    beats * 60.0 / bpm
}

pub fn seconds_to_beats(seconds: f64, bpm: f64) -> f64 {
    seconds * bpm / 60.0
}

pub fn measure_to_seconds(measure: f64, bpm: f64, signature: TimeSignature) -> f64 {
    beats_to_seconds(measure * signature.beats_per_measure(), bpm)
}

pub fn seconds_to_measure(seconds: f64, bpm: f64, signature: TimeSignature) -> f64 {
    seconds_to_beats(seconds, bpm) / signature.beats_per_measure()
}

/// Zero-based measure/beat position of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MusicalPosition {
    pub measure: u64,
    pub beat_in_measure: u32,
    /// Fraction of the current beat already elapsed, in `[0, 1)`.
    pub subdivision_fraction: f64,
}

impl std::fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bar and beat are shown one-based, the way transports display them.
        write!(
            f,
            "{}.{}.{:03}",
            self.measure + 1,
            self.beat_in_measure + 1,
            // A fraction just under one beat must not print as 1000.
            ((self.subdivision_fraction * 1000.0).round() as u32).min(999)
        )
    }
}

/// Splits `seconds` into measure, beat within the measure and the elapsed
/// fraction of that beat. Negative times are treated as zero.
pub fn position_at(seconds: f64, bpm: f64, signature: TimeSignature) -> MusicalPosition {
    let beats = snap_to_integer(seconds_to_beats(seconds.max(0.0), bpm));
    let whole = beats.floor();
    let per_measure = signature.beats_per_measure();

    MusicalPosition {
        measure: (whole / per_measure).floor() as u64,
        beat_in_measure: whole.rem_euclid(per_measure) as u32,
        subdivision_fraction: beats - whole,
    }
}

/// Rounds values that sit within [`BEAT_EPSILON`] of an integer onto it.
pub(crate) fn snap_to_integer(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < BEAT_EPSILON {
        rounded
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn position_display_stays_within_the_beat() {
        let position = MusicalPosition {
            measure: 0,
            beat_in_measure: 2,
            subdivision_fraction: 0.9996,
        };
        assert_eq!(position.to_string(), "1.3.999");
    }

    #[test]
    fn converts_beats_and_seconds() {
        assert!((beats_to_seconds(4.0, 120.0) - 2.0).abs() < TOLERANCE);
        assert!((seconds_to_beats(2.0, 120.0) - 4.0).abs() < TOLERANCE);
        assert!((seconds_to_beats(0.97, 120.0) - 1.94).abs() < TOLERANCE);
    }

    #[test]
    fn beats_survive_a_round_trip() {
        for bpm in [1.0, 60.0, 97.5, 120.0, 333.3] {
            for beats in [0.0, 0.25, 1.0, 7.75, 128.0, 1_000.125] {
                let back = seconds_to_beats(beats_to_seconds(beats, bpm), bpm);
                assert!((back - beats).abs() < 1e-6, "bpm {bpm} beats {beats}");
            }
        }
    }

    #[test]
    fn converts_measures_using_the_numerator() {
        let waltz = TimeSignature::new(3, 4).unwrap();
        assert!((measure_to_seconds(2.0, 60.0, waltz) - 6.0).abs() < TOLERANCE);
        assert!((seconds_to_measure(6.0, 60.0, waltz) - 2.0).abs() < TOLERANCE);
        assert!((measure_to_seconds(1.0, 120.0, TimeSignature::COMMON) - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn rejects_invalid_tempo_and_signature() {
        assert!(Tempo::new(0.0).is_err());
        assert!(Tempo::new(-10.0).is_err());
        assert!(Tempo::new(f64::NAN).is_err());
        assert!(TimeSignature::new(0, 4).is_err());
        assert!(TimeSignature::new(4, 0).is_err());
        assert_eq!(Tempo::new(90.0).unwrap().bpm(), 90.0);
    }

    #[test]
    fn tempo_deserialises_through_validation() {
        let tempo: Tempo = serde_json::from_str("140.0").unwrap();
        assert_eq!(tempo.bpm(), 140.0);
        assert!(serde_json::from_str::<Tempo>("-1.0").is_err());
    }

    #[test]
    fn reports_musical_position() {
        // 120 bpm: 2.25 s is beat 4.5, i.e. second measure, first beat, half way.
        let position = position_at(2.25, 120.0, TimeSignature::COMMON);
        assert_eq!(position.measure, 1);
        assert_eq!(position.beat_in_measure, 0);
        assert!((position.subdivision_fraction - 0.5).abs() < TOLERANCE);
        assert_eq!(position.to_string(), "2.1.500");
    }

    #[test]
    fn position_of_negative_time_is_origin() {
        let position = position_at(-3.0, 120.0, TimeSignature::COMMON);
        assert_eq!((position.measure, position.beat_in_measure), (0, 0));
        assert_eq!(position.subdivision_fraction, 0.0);
    }
}
