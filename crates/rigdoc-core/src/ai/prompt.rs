//! Prompt templates shared by every adapter
//!
//! All three backends receive the same instructions so their answers can be
//! normalized by one parser.

use crate::types::{ChatMessage, DiagnosisRequest, Role};

/// System prompt for diagnoses - asks for a strict JSON object
pub const DIAGNOSIS_SYSTEM_PROMPT: &str = "\
You are an expert heavy-duty truck diagnostic technician with deep knowledge of \
diesel engines, air brake systems, drivetrains and truck electrical systems.

Respond with ONLY a JSON object, no prose and no markdown, using these keys:
- \"diagnosis\": one or two sentence summary of the most likely problem
- \"possibleCauses\": array of strings, most likely first
- \"recommendations\": array of strings, most urgent first
- \"confidence\": number between 0 and 1
- \"estimatedCost\": repair cost range in USD as a string, e.g. \"$500 - $1,200\"
- \"urgency\": one of \"low\", \"medium\", \"high\"
- \"toolsNeeded\": array of strings
- \"safetyNotes\": array of strings

If a symptom could compromise braking, steering or cause fire, say so in \
safetyNotes and set urgency to \"high\".";

/// System prompt for free-form assistant chat
pub const CHAT_SYSTEM_PROMPT: &str = "\
You are a helpful heavy-duty truck maintenance assistant. Give practical, \
safety-first answers. When a problem could affect brakes, steering or fire \
risk, tell the driver to stop and get the truck inspected.";

/// Message used by probes; the answer is ignored
pub const PROBE_MESSAGE: &str = "ping";

/// Render the user message for a diagnosis request
pub fn diagnosis_prompt(request: &DiagnosisRequest) -> String {
    let truck = &request.truck;
    let mut prompt = format!(
        "Diagnose the following truck problem.\n\n\
         Truck: {} {} ({})\n\
         Engine: {}\n\
         Reported urgency: {}\n\n\
         Symptoms:\n",
        truck.make, truck.model, truck.year, truck.engine, request.urgency
    );

    for symptom in request.symptom_list() {
        prompt.push_str("- ");
        prompt.push_str(symptom);
        prompt.push('\n');
    }

    if let Some(context) = request.context_text() {
        prompt.push_str(&format!("\nAdditional context from the driver:\n{}\n", context));
    }

    prompt
}

/// Build the full message list for a diagnosis call
pub fn diagnosis_messages(request: &DiagnosisRequest) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(DIAGNOSIS_SYSTEM_PROMPT),
        ChatMessage::user(diagnosis_prompt(request)),
    ]
}

/// Prepend the chat system prompt unless the caller supplied one
pub fn chat_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !messages.iter().any(|m| m.role == Role::System) {
        out.push(ChatMessage::system(CHAT_SYSTEM_PROMPT));
    }
    out.extend(messages.iter().cloned());
    out
}

/// Flatten a conversation into one text block
///
/// Agent threads accept a single user message per turn, so prior turns are
/// carried as a transcript.
pub fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// OpenAI-style wire representation
pub fn to_wire(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": m.content,
            })
        })
        .collect()
}
