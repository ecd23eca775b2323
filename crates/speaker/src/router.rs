//! Resolves `(author_id, current_engine_tag) -> speaker_id`.

use std::sync::Arc;

use voice_relay_core::model::UserVoicePreference;
use voice_relay_core::{Error, PreferenceStore, Result};

use crate::mapping;

pub struct SpeakerRouter {
    store: Arc<dyn PreferenceStore>,
}

impl SpeakerRouter {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Returns `None` when the author has no stored preference, meaning
    /// "use the engine default" — the caller substitutes its own default.
    pub async fn resolve_speaker(&self, author_id: &str, current_engine_tag: &str) -> Option<i64> {
        let pref = self.store.get(author_id).await?;
        if pref.engine_tag == current_engine_tag {
            return Some(pref.speaker_id);
        }
        Some(mapping::compatible_speaker(pref.speaker_id, &pref.engine_tag, current_engine_tag))
    }

    /// `engine_tag: None` infers the engine from `speaker_id`'s magnitude,
    /// matching the original bot's auto-detection on write.
    pub async fn set_preference(
        &self,
        author_id: &str,
        speaker_id: i64,
        speaker_display_name: String,
        engine_tag: Option<String>,
    ) -> Result<()> {
        let engine_tag = match engine_tag {
            Some(tag) => {
                let tag = tag.to_lowercase();
                if !mapping::is_known_engine(&tag) {
                    return Err(Error::ConfigInvalid(format!("unknown engine tag: {tag}")));
                }
                tag
            }
            None => mapping::detect_engine(speaker_id).to_string(),
        };
        self.store
            .set(author_id, UserVoicePreference { speaker_id, speaker_display_name, engine_tag })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeStore {
        data: Mutex<HashMap<String, UserVoicePreference>>,
    }

    #[async_trait]
    impl PreferenceStore for FakeStore {
        async fn get(&self, author_id: &str) -> Option<UserVoicePreference> {
            self.data.lock().get(author_id).cloned()
        }
        async fn set(&self, author_id: &str, pref: UserVoicePreference) -> Result<()> {
            self.data.lock().insert(author_id.to_string(), pref);
            Ok(())
        }
    }

    #[tokio::test]
    async fn missing_preference_resolves_to_none() {
        let router = SpeakerRouter::new(Arc::new(FakeStore::default()));
        assert_eq!(router.resolve_speaker("42", mapping::VOICEVOX).await, None);
    }

    #[tokio::test]
    async fn same_engine_preference_is_returned_unmapped() {
        let store = Arc::new(FakeStore::default());
        let router = SpeakerRouter::new(store.clone());
        router.set_preference("1", 3, "Zundamon".into(), Some(mapping::VOICEVOX.into())).await.unwrap();
        assert_eq!(router.resolve_speaker("1", mapping::VOICEVOX).await, Some(3));
    }

    #[tokio::test]
    async fn cross_engine_preference_is_mapped() {
        let store = Arc::new(FakeStore::default());
        let router = SpeakerRouter::new(store.clone());
        router.set_preference("1", 3, "Zundamon".into(), Some(mapping::VOICEVOX.into())).await.unwrap();
        assert_eq!(router.resolve_speaker("1", mapping::AIVIS).await, Some(1512153250));
    }

    #[tokio::test]
    async fn set_preference_infers_engine_from_speaker_id() {
        let store = Arc::new(FakeStore::default());
        let router = SpeakerRouter::new(store.clone());
        router.set_preference("1", 1512153250, "Anneli".into(), None).await.unwrap();
        let pref = store.get("1").await.unwrap();
        assert_eq!(pref.engine_tag, mapping::AIVIS);
    }

    #[tokio::test]
    async fn set_preference_rejects_unknown_engine_tag() {
        let router = SpeakerRouter::new(Arc::new(FakeStore::default()));
        let result = router.set_preference("1", 3, "x".into(), Some("nope".into())).await;
        assert!(result.is_err());
    }
}
