//! Static cross-engine speaker mapping.
//!
//! Grounded on `speaker_mapping.py`'s `SPEAKER_MAPPING` table: hand-maintained
//! voice-equivalence data, kept here as configuration rather than branching
//! code, per the design's resolution of that module's open ambiguity.

pub const VOICEVOX: &str = "voicevox";
pub const AIVIS: &str = "aivis";

/// `(from_engine, from_speaker_id) -> to_speaker_id`, one direction at a time.
const VOICEVOX_TO_AIVIS: &[(i64, i64)] = &[
    (3, 1512153250),
    (1, 1512153249),
    (7, 1512153252),
    (5, 1512153251),
    (22, 1512153253),
    (38, 1512153254),
    (75, 1512153250),
    (76, 1512153250),
];

const AIVIS_TO_VOICEVOX: &[(i64, i64)] = &[
    (1512153250, 3),
    (1512153249, 1),
    (1512153252, 7),
    (1512153251, 5),
    (1512153253, 22),
    (1512153254, 38),
    (1512153248, 3),
    (888753760, 3),
    (888753761, 3),
    (888753762, 3),
    (888753763, 3),
    (888753764, 3),
    (888753765, 3),
    (1431611904, 3),
    (604166016, 3),
];

const SPEAKER_INFO_VOICEVOX: &[(i64, &str)] = &[
    (1, "Zundamon (Sweet)"),
    (3, "Zundamon (Normal)"),
    (5, "Zundamon (Seductive)"),
    (7, "Zundamon (Tsundere)"),
    (22, "Zundamon (Whisper)"),
    (38, "Zundamon (Murmur)"),
    (75, "Zundamon (Flirty)"),
    (76, "Zundamon (Tearful)"),
];

const SPEAKER_INFO_AIVIS: &[(i64, &str)] = &[
    (1512153248, "Unofficial Zundamon (Reading)"),
    (1512153249, "Unofficial Zundamon (Sweet)"),
    (1512153250, "Unofficial Zundamon (Normal)"),
    (1512153251, "Unofficial Zundamon (Seductive)"),
    (1512153252, "Unofficial Zundamon (Tsundere)"),
    (1512153253, "Unofficial Zundamon (Whisper)"),
    (1512153254, "Unofficial Zundamon (Murmur)"),
    (888753760, "Anneli (Normal)"),
    (888753761, "Anneli (Standard)"),
    (888753762, "Anneli (High Tension)"),
    (888753763, "Anneli (Calm)"),
    (888753764, "Anneli (Happy)"),
    (888753765, "Anneli (Angry/Sad)"),
    (1431611904, "Mai"),
    (604166016, "Chuunibyou"),
];

/// VOICEVOX speaker ids are small integers; AIVIS ids run into the billions.
/// Used to infer an `engine_tag` when a write omits it.
pub fn detect_engine(speaker_id: i64) -> &'static str {
    if speaker_id > 100_000 {
        AIVIS
    } else {
        VOICEVOX
    }
}

pub fn default_speaker(engine_tag: &str) -> i64 {
    match engine_tag {
        AIVIS => 1512153250,
        _ => 3,
    }
}

pub fn is_known_engine(engine_tag: &str) -> bool {
    matches!(engine_tag, VOICEVOX | AIVIS)
}

/// Maps a speaker id between engines, falling back to the target engine's
/// default speaker when no direct mapping entry exists.
pub fn compatible_speaker(speaker_id: i64, from_engine: &str, to_engine: &str) -> i64 {
    if from_engine == to_engine {
        return speaker_id;
    }
    let table = match (from_engine, to_engine) {
        (VOICEVOX, AIVIS) => VOICEVOX_TO_AIVIS,
        (AIVIS, VOICEVOX) => AIVIS_TO_VOICEVOX,
        _ => &[],
    };
    table
        .iter()
        .find(|(from, _)| *from == speaker_id)
        .map(|(_, to)| *to)
        .unwrap_or_else(|| default_speaker(to_engine))
}

/// Display name for logging and the status snapshot; never user-facing
/// command output.
pub fn speaker_display_name(speaker_id: i64, engine_tag: &str) -> String {
    let table = match engine_tag {
        VOICEVOX => SPEAKER_INFO_VOICEVOX,
        AIVIS => SPEAKER_INFO_AIVIS,
        _ => &[],
    };
    table
        .iter()
        .find(|(id, _)| *id == speaker_id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Unknown ({speaker_id})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_engine_is_identity() {
        assert_eq!(compatible_speaker(3, VOICEVOX, VOICEVOX), 3);
    }

    #[test]
    fn known_mapping_is_applied() {
        assert_eq!(compatible_speaker(3, VOICEVOX, AIVIS), 1512153250);
        assert_eq!(compatible_speaker(1512153250, AIVIS, VOICEVOX), 3);
    }

    #[test]
    fn unmapped_speaker_falls_back_to_target_default() {
        assert_eq!(compatible_speaker(999_999, VOICEVOX, AIVIS), default_speaker(AIVIS));
    }

    #[test]
    fn detect_engine_splits_on_id_magnitude() {
        assert_eq!(detect_engine(3), VOICEVOX);
        assert_eq!(detect_engine(1512153250), AIVIS);
    }
}
