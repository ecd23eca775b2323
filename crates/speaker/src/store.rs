//! Durable per-author speaker preferences backed by a single JSON file.
//!
//! Grounded on `user_settings.py`'s `UserSettings`: re-parses the file
//! before every read to observe external edits, writes atomically via a
//! temp file + rename, and tolerates a parse failure on reload by keeping
//! the in-memory view unchanged rather than clearing it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use voice_relay_core::model::UserVoicePreference;
use voice_relay_core::{Error, PreferenceStore, Result};

use crate::mapping;

pub struct JsonPreferenceStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, UserVoicePreference>>,
}

impl JsonPreferenceStore {
    /// `path: None` resolves to the platform config directory, matching
    /// `user_settings.py`'s XDG/APPDATA fallback.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => default_settings_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::ConfigInvalid(format!("cannot create settings directory: {e}")))?;
        }
        let store = Self { path, cache: RwLock::new(HashMap::new()) };
        store.reload_blocking();
        store.migrate_legacy_entries();
        Ok(store)
    }

    fn reload_blocking(&self) {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            debug!(path = %self.path.display(), "no existing settings file, starting fresh");
            return;
        };
        match serde_json::from_str::<HashMap<String, UserVoicePreference>>(&contents) {
            Ok(loaded) => {
                *self.cache.write() = loaded;
            }
            Err(e) => {
                error!(error = %e, "failed to parse settings file, keeping in-memory view");
            }
        }
    }

    fn migrate_legacy_entries(&self) {
        let mut migrated_any = false;
        {
            let mut cache = self.cache.write();
            for (author_id, pref) in cache.iter_mut() {
                if pref.engine_tag.is_empty() {
                    pref.engine_tag = mapping::detect_engine(pref.speaker_id).to_string();
                    info!(author_id, engine = %pref.engine_tag, "migrated legacy preference entry");
                    migrated_any = true;
                }
            }
        }
        if migrated_any {
            if let Err(e) = self.save_blocking() {
                warn!(error = %e, "failed to persist migrated settings");
            }
        }
    }

    fn save_blocking(&self) -> Result<()> {
        let snapshot = self.cache.read().clone();
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Fatal(format!("failed to serialize preferences: {e}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .map_err(|e| Error::Fatal(format!("failed to write temp settings file: {e}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| Error::Fatal(format!("failed to rename temp settings file: {e}")))?;
        Ok(())
    }
}

fn default_settings_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "discord-voice-bot")
        .ok_or_else(|| Error::ConfigInvalid("cannot resolve platform config directory".to_string()))?;
    Ok(dirs.config_dir().join("user_settings.json"))
}

#[async_trait]
impl PreferenceStore for JsonPreferenceStore {
    async fn get(&self, author_id: &str) -> Option<UserVoicePreference> {
        self.reload_blocking();
        self.cache.read().get(author_id).cloned()
    }

    async fn set(&self, author_id: &str, pref: UserVoicePreference) -> Result<()> {
        if !mapping::is_known_engine(&pref.engine_tag) {
            return Err(Error::ConfigInvalid(format!("unknown engine tag: {}", pref.engine_tag)));
        }
        self.cache.write().insert(author_id.to_string(), pref);
        self.save_blocking()
    }
}

/// Exposed separately from the trait so callers can check a path without
/// touching the file.
pub fn settings_path(store: &JsonPreferenceStore) -> &Path {
    &store.path
}
