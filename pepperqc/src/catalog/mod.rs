//! Preset catalog.
//!
//! The catalog owns the live presets. Jobs never read from it after
//! submission; they carry their own snapshot.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::preset::DEFAULT_PRESET_NAME;
use crate::domain::{Preset, PresetWarning};
use crate::{Error, Result};

/// Result of storing a preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetUpsert {
    pub preset: Preset,
    pub created: bool,
    #[serde(default)]
    pub warnings: Vec<PresetWarning>,
}

/// Storage port for presets.
#[async_trait]
pub trait PresetCatalog: Send + Sync {
    /// Get a preset by ID.
    async fn get_preset(&self, id: &str) -> Result<Option<Preset>>;

    /// Get a preset by name (case-insensitive).
    async fn get_preset_by_name(&self, name: &str) -> Result<Option<Preset>>;

    /// List all presets in creation order.
    async fn list_presets(&self) -> Result<Vec<Preset>>;

    /// Create or update a preset, keyed by ID.
    ///
    /// Parameters are normalized before storage. Authoring problems are
    /// returned as warnings and never block the write. Flagging a preset as
    /// default clears the flag everywhere else.
    async fn upsert_preset(&self, preset: Preset) -> Result<PresetUpsert>;

    /// Delete a preset.
    async fn delete_preset(&self, id: &str) -> Result<()>;

    /// The preset used when a submission names none.
    async fn resolve_default(&self) -> Result<Preset> {
        let presets = self.list_presets().await?;
        resolve_default_in(&presets)
            .cloned()
            .ok_or(Error::NoPresetAvailable)
    }
}

/// Pick the default preset: the flagged one, else the one named "Default",
/// else the earliest created. Deterministic for a fixed slice.
pub fn resolve_default_in(presets: &[Preset]) -> Option<&Preset> {
    presets
        .iter()
        .find(|p| p.is_default)
        .or_else(|| {
            presets
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(DEFAULT_PRESET_NAME))
        })
        .or_else(|| presets.iter().min_by_key(|p| p.created_at))
}

/// In-memory catalog backed by a lock-protected vector.
pub struct InMemoryPresetCatalog {
    presets: RwLock<Vec<Preset>>,
}

impl Default for InMemoryPresetCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPresetCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            presets: RwLock::new(Vec::new()),
        }
    }

    /// Create a catalog seeded with the built-in "Default" preset.
    pub fn with_builtin_default() -> Self {
        Self::with_presets(vec![Preset::builtin_default()])
    }

    pub fn with_presets(presets: Vec<Preset>) -> Self {
        Self {
            presets: RwLock::new(presets),
        }
    }

    pub fn len(&self) -> usize {
        self.presets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.read().is_empty()
    }
}

#[async_trait]
impl PresetCatalog for InMemoryPresetCatalog {
    async fn get_preset(&self, id: &str) -> Result<Option<Preset>> {
        Ok(self.presets.read().iter().find(|p| p.id == id).cloned())
    }

    async fn get_preset_by_name(&self, name: &str) -> Result<Option<Preset>> {
        let name = name.trim();
        Ok(self
            .presets
            .read()
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn list_presets(&self) -> Result<Vec<Preset>> {
        Ok(self.presets.read().clone())
    }

    async fn upsert_preset(&self, mut preset: Preset) -> Result<PresetUpsert> {
        preset.name = preset.name.trim().to_string();
        if preset.name.is_empty() {
            return Err(Error::validation("Preset name cannot be empty"));
        }
        preset.parameters = preset.parameters.normalize();
        let warnings = preset.parameters.validate();

        let mut presets = self.presets.write();
        if presets
            .iter()
            .any(|p| p.id != preset.id && p.name.eq_ignore_ascii_case(&preset.name))
        {
            return Err(Error::validation(format!(
                "Preset name '{}' is already in use",
                preset.name
            )));
        }

        if preset.is_default {
            for other in presets.iter_mut().filter(|p| p.id != preset.id) {
                other.is_default = false;
            }
        }

        let now = Utc::now();
        let created = match presets.iter_mut().find(|p| p.id == preset.id) {
            Some(existing) => {
                preset.created_at = existing.created_at;
                preset.updated_at = now;
                *existing = preset.clone();
                false
            }
            None => {
                preset.updated_at = now;
                presets.push(preset.clone());
                true
            }
        };
        drop(presets);

        for warning in &warnings {
            warn!(preset = %preset.name, "Preset warning: {}", warning);
        }
        info!(
            preset_id = %preset.id,
            preset = %preset.name,
            created,
            "Stored preset"
        );

        Ok(PresetUpsert {
            preset,
            created,
            warnings,
        })
    }

    async fn delete_preset(&self, id: &str) -> Result<()> {
        let mut presets = self.presets.write();
        let index = presets
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::not_found("Preset", id))?;
        let removed = presets.remove(index);
        info!(preset_id = %id, preset = %removed.name, "Deleted preset");
        Ok(())
    }
}
