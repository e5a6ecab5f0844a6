use std::collections::HashMap;

use tracing::debug;

/// Final label resolution for one visit
#[derive(Debug, Clone)]
pub struct SpeakerResolution {
    /// Complete `diarization label -> display name` map
    pub names: HashMap<String, String>,
    /// Labels locked by voiceprint matching
    pub fingerprint_resolved: Vec<String>,
    /// Labels filled in by language-model inference
    pub llm_resolved: Vec<String>,
}

/// Labels still needing identification after the voiceprint pass
///
/// The language-model call receives exactly this list; labels already
/// resolved by fingerprint matching are excluded so the model can never
/// override them.
pub fn unresolved_labels(labels: &[String], fingerprint: &HashMap<String, String>) -> Vec<String> {
    labels
        .iter()
        .filter(|l| !fingerprint.contains_key(*l))
        .cloned()
        .collect()
}

/// Merge voiceprint matches and language-model inference into one name map
///
/// Voiceprint matching is the higher-confidence source: any label it
/// resolved is locked and a language-model entry for it is discarded. A
/// label neither source identified keeps its raw diarization tag as the
/// display name, so downstream substitution is total over `labels`.
pub fn resolve_speaker_names(
    labels: &[String],
    fingerprint: &HashMap<String, String>,
    llm: &HashMap<String, String>,
) -> SpeakerResolution {
    let mut names = HashMap::with_capacity(labels.len());
    let mut fingerprint_resolved = Vec::new();
    let mut llm_resolved = Vec::new();

    for label in labels {
        if let Some(name) = fingerprint.get(label) {
            names.insert(label.clone(), name.clone());
            fingerprint_resolved.push(label.clone());
        } else if let Some(name) = llm.get(label) {
            names.insert(label.clone(), name.clone());
            llm_resolved.push(label.clone());
        } else {
            names.insert(label.clone(), label.clone());
        }
    }

    debug!(
        total = labels.len(),
        by_fingerprint = fingerprint_resolved.len(),
        by_llm = llm_resolved.len(),
        "resolved speaker names"
    );

    SpeakerResolution {
        names,
        fingerprint_resolved,
        llm_resolved,
    }
}
