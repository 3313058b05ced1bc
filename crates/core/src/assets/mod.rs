use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{track::KeyframePayload, Result, TimelineError};

/// Answers whether an asset referenced by a keyframe can be loaded.
pub trait AssetResolver {
    fn contains(&self, asset: &str) -> bool;

    /// Checks the asset a payload points at, if any. Fails with
    /// [`TimelineError::MissingAsset`] naming the unknown asset.
    fn resolve(&self, payload: &KeyframePayload) -> Result<()> {
        match payload.asset() {
            Some(asset) if !self.contains(asset) => {
                Err(TimelineError::MissingAsset(asset.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Descriptor for an asset keyframes may reference (rig pose, drawing,
/// audio sample).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub id: String,
}

impl AssetEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Registry for all assets referenced by keyframes.
#[derive(Debug, Default, Clone)]
pub struct AssetStore {
    entries: HashMap<String, AssetEntry>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, entry: AssetEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn unregister(&mut self, id: &str) -> Option<AssetEntry> {
        self.entries.remove(id)
    }

    pub fn entry(&self, id: &str) -> Option<&AssetEntry> {
        self.entries.get(id)
    }
}

impl AssetResolver for AssetStore {
    fn contains(&self, asset: &str) -> bool {
        self.entries.contains_key(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_assets() {
        let mut store = AssetStore::new();
        store.register(AssetEntry::new("arm_up"));

        let payload = KeyframePayload::Pose {
            asset: "arm_up".to_string(),
        };

        assert!(store.resolve(&payload).is_ok());
        assert!(store.contains("arm_up"));
    }

    #[test]
    fn errors_on_missing_assets() {
        let store = AssetStore::new();
        let payload = KeyframePayload::Sample {
            asset: "missing.wav".to_string(),
        };

        let err = store.resolve(&payload).unwrap_err();
        assert!(matches!(&err, TimelineError::MissingAsset(asset) if asset == "missing.wav"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn payloads_without_assets_always_resolve() {
        let store = AssetStore::new();
        let payload = KeyframePayload::Cue {
            label: "drop".to_string(),
        };
        assert!(store.resolve(&payload).is_ok());
    }

    #[test]
    fn unregistering_makes_assets_missing_again() {
        let mut store = AssetStore::new();
        store.register(AssetEntry::new("kick.wav"));
        assert_eq!(store.entry("kick.wav").map(|e| e.id.as_str()), Some("kick.wav"));
        assert!(store.unregister("kick.wav").is_some());
        assert!(!store.contains("kick.wav"));
        assert!(store.entry("kick.wav").is_none());
    }
}
