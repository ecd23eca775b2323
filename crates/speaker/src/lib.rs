//! Per-user speaker preferences and cross-engine speaker mapping.

pub mod mapping;
pub mod router;
pub mod store;

pub use mapping::{compatible_speaker, default_speaker, detect_engine, speaker_display_name};
pub use router::SpeakerRouter;
pub use store::JsonPreferenceStore;
