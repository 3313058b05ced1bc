use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    authoring::AuthoringMode,
    grid::{BeatGridGenerator, Subdivision},
    time::{Tempo, TimeSignature},
    Result, TimelineError,
};

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timeline: TimelineConfig,
    pub grid: GridConfig,
    pub authoring: AuthoringConfig,
}

impl EngineConfig {
    /// Parses and validates a JSON document. Missing sections and fields fall
    /// back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        tracing::debug!(?path, "loaded engine configuration");
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let tempo = self.tempo()?;
        self.time_signature()?;
        let subdivision = self.subdivision()?;
        let duration = self.timeline.duration()?;
        BeatGridGenerator::marker_count(duration, tempo.bpm(), subdivision)?;
        Ok(())
    }

    pub fn tempo(&self) -> Result<Tempo> {
        Tempo::new(self.timeline.bpm)
    }

    pub fn time_signature(&self) -> Result<TimeSignature> {
        TimeSignature::new(self.timeline.numerator, self.timeline.denominator)
    }

    pub fn subdivision(&self) -> Result<Subdivision> {
        Subdivision::new(self.grid.subdivision)
    }
}

/// Tempo, meter and length of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub bpm: f64,
    pub numerator: u32,
    pub denominator: u32,
    pub duration_seconds: f64,
}

impl TimelineConfig {
    pub fn duration(&self) -> Result<f64> {
        validate_duration(self.duration_seconds)
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            numerator: 4,
            denominator: 4,
            duration_seconds: 30.0,
        }
    }
}

/// Snapping behaviour for keyframe placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Grid step as a fraction of one beat.
    pub subdivision: f64,
    pub snap_enabled: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            subdivision: Subdivision::QUARTER_BEAT.beats(),
            snap_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthoringConfig {
    pub initial_mode: AuthoringMode,
}

pub(crate) fn validate_duration(seconds: f64) -> Result<f64> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(TimelineError::invalid(format!(
            "duration must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tempo().unwrap().bpm(), 120.0);
        assert_eq!(config.time_signature().unwrap(), TimeSignature::COMMON);
        assert!(config.grid.snap_enabled);
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "timeline": { "bpm": 90 }, "authoring": { "initial_mode": "music" } }"#,
        )
        .unwrap();

        assert_eq!(config.timeline.bpm, 90.0);
        assert_eq!(config.timeline.numerator, 4);
        assert_eq!(config.grid.subdivision, 0.25);
        assert_eq!(config.authoring.initial_mode, AuthoringMode::Music);
    }

    #[test]
    fn rejects_invalid_values() {
        for json in [
            r#"{ "timeline": { "bpm": 0 } }"#,
            r#"{ "timeline": { "numerator": 0 } }"#,
            r#"{ "timeline": { "duration_seconds": -1 } }"#,
            r#"{ "grid": { "subdivision": 0 } }"#,
            r#"{ "timeline": { "bpm": 1e300 } }"#,
            r#"{ "timeline": { "duration_seconds": 1e15 } }"#,
        ] {
            let err = EngineConfig::from_json_str(json).unwrap_err();
            assert!(matches!(err, TimelineError::InvalidParameter(_)), "{json}");
        }
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json_str("{ timeline").unwrap_err();
        assert!(matches!(err, TimelineError::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, TimelineError::Io(_)));
    }
}
