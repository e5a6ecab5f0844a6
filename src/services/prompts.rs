use crate::services::SpeakerInferenceRequest;

/// System prompt for speaker-name inference
pub fn speaker_system_prompt() -> String {
    r#"You are an expert at identifying speakers in care-visit conversation transcripts.

Your task is to match diarization labels (SPEAKER_00, SPEAKER_01, ...) to real names based on evidence in the transcript.

## Guidelines

1. **Look for self-introductions**: "Hi, I'm Maria from the agency"
2. **Listen for names used by others**: "Thank you, Maria" or "Mrs. Alvarez, how are you feeling?"
3. **Consider roles**: the caregiver directs tasks, the client receives care

## Important Rules

- Only identify a speaker with CLEAR evidence; never guess
- Only answer for the labels you are asked about - other labels are already identified and must not appear in your answer
- It is better to leave a label unidentified than to guess incorrectly

Use the submit_speaker_names tool to answer."#
        .to_string()
}

/// User prompt for speaker-name inference
pub fn speaker_user_prompt(request: &SpeakerInferenceRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str("# Labels to Identify\n\n");
    prompt.push_str(&format!(
        "Identify ONLY these labels: {}\n\n",
        request.labels_to_resolve.join(", ")
    ));

    if !request.known_names.is_empty() {
        prompt.push_str("# Names Known to Be Present\n\n");
        for name in &request.known_names {
            prompt.push_str(&format!("- {}\n", name));
        }
        prompt.push('\n');
    }

    prompt.push_str("# Transcript Excerpts by Label\n\n");
    for (label, excerpts) in &request.excerpts {
        prompt.push_str(&format!("## {}\n\n", label));
        for excerpt in excerpts {
            prompt.push_str(&format!("- {}\n", excerpt));
        }
        prompt.push('\n');
    }

    prompt.push_str("# Task\n\n");
    prompt.push_str(
        "Match each requested label to a name where the evidence is clear. \
         Use the submit_speaker_names tool; omit labels you cannot identify.\n",
    );

    prompt
}

/// Tool schema for speaker-name inference
pub fn speaker_tool_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "names": {
                "type": "object",
                "description": "Mapping from diarization label to identified display name. Include only labels with clear evidence.",
                "additionalProperties": {"type": "string"}
            }
        },
        "required": ["names"]
    })
}

/// System prompt for the visit-note draft
pub fn note_system_prompt() -> String {
    r#"You write concise, factual home-care visit notes from conversation transcripts.

Report only what the transcript supports. Never invent clinical observations. Write in plain language a family member could read.

Use the submit_visit_note tool to answer."#
        .to_string()
}

/// User prompt for the visit-note draft
pub fn note_user_prompt(transcript: &str, billing_summary: &str) -> String {
    format!(
        "# Visit Transcript\n\n{}\n\n# Detected Services\n\n{}\n\n# Task\n\n\
         Draft the visit note: a short narrative summary, notable observations \
         about the client, tasks the caregiver performed, and any follow-ups \
         the agency should know about. Use the submit_visit_note tool.\n",
        transcript, billing_summary
    )
}

/// Tool schema for the visit-note draft
pub fn note_tool_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": {"type": "string", "description": "One-paragraph narrative summary"},
            "observations": {"type": "array", "items": {"type": "string"}},
            "tasks_performed": {"type": "array", "items": {"type": "string"}},
            "follow_ups": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["summary"]
    })
}

/// System prompt for the contract draft
pub fn contract_system_prompt() -> String {
    r#"You extract draft service-contract terms from care-visit conversations.

Extract only terms actually discussed: schedules, rates, and service expectations. Leave fields empty rather than inventing terms.

Use the submit_contract tool to answer."#
        .to_string()
}

/// User prompt for the contract draft
pub fn contract_user_prompt(
    transcript: &str,
    billing_summary: &str,
    client_name: &str,
    caregiver_name: &str,
) -> String {
    format!(
        "# Parties\n\nClient: {}\nCaregiver: {}\n\n# Visit Transcript\n\n{}\n\n\
         # Services Observed This Visit\n\n{}\n\n# Task\n\n\
         Extract any schedule, rate, or service terms discussed. \
         Use the submit_contract tool.\n",
        client_name, caregiver_name, transcript, billing_summary
    )
}

/// Tool schema for the contract draft
pub fn contract_tool_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "schedule": {
                "type": ["string", "null"],
                "description": "Proposed visit schedule in plain language, or null"
            },
            "hourly_rate": {
                "type": ["number", "null"],
                "description": "Hourly rate if one was discussed, or null"
            },
            "notes": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Other contract-relevant terms from the conversation"
            }
        },
        "required": []
    })
}
