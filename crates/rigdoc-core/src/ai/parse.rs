//! Response normalization
//!
//! Backends are asked for JSON but do not always comply. Parsing tries, in
//! order: the whole text as JSON, a fenced ```json block, then the outermost
//! `{...}` span. Whatever is found is normalized into a [`DiagnosisResult`];
//! when nothing usable is found the answer degrades to a templated result that
//! still carries the backend's prose.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::constants;
use crate::error::ProviderError;
use crate::types::{DiagnosisRequest, DiagnosisResult, Urgency};

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("fenced json pattern is valid")
});

/// Longest prose kept as the diagnosis text of a templated answer
const MAX_TEMPLATED_DIAGNOSIS: usize = 600;

/// Find a JSON object inside free text
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(caps) = FENCED_JSON.captures(trimmed) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Normalize a JSON object into the shared result shape
pub fn normalize(
    value: &Value,
    request: &DiagnosisRequest,
    provider: &str,
) -> Result<DiagnosisResult, ProviderError> {
    let possible_causes = string_list(value, &["possibleCauses", "possible_causes", "causes"]);
    let recommendations = string_list(
        value,
        &["recommendations", "recommendedActions", "recommended_actions", "actions"],
    );
    let diagnosis = text_field(value, &["diagnosis", "summary", "assessment"])
        .or_else(|| possible_causes.first().cloned());

    let Some(diagnosis) = diagnosis else {
        return Err(ProviderError::Parse(
            "JSON has no diagnosis, summary or causes".to_string(),
        ));
    };
    if possible_causes.is_empty() && recommendations.is_empty() {
        return Err(ProviderError::Parse(
            "JSON has neither causes nor recommendations".to_string(),
        ));
    }

    let confidence = number_field(value, &["confidence", "confidenceScore", "confidence_score"])
        .map(|raw| if raw > 1.0 { raw / 100.0 } else { raw })
        .unwrap_or(constants::ai::TEMPLATED_CONFIDENCE);

    let estimated_cost = cost_field(value).unwrap_or_else(|| "Unknown".to_string());

    let urgency = text_field(value, &["urgency", "severity"])
        .and_then(|u| u.parse::<Urgency>().ok())
        .unwrap_or(request.urgency);

    Ok(DiagnosisResult {
        possible_causes: if possible_causes.is_empty() {
            vec![diagnosis.clone()]
        } else {
            possible_causes
        },
        diagnosis,
        recommendations,
        confidence: DiagnosisResult::clamp_confidence(confidence),
        estimated_cost,
        urgency,
        provider: provider.to_string(),
        tools_needed: string_list(value, &["toolsNeeded", "tools_needed", "tools"]),
        safety_notes: string_list(
            value,
            &["safetyNotes", "safety_notes", "safetyWarnings", "safety_warnings"],
        ),
    })
}

/// Structured answer built around prose the backend returned instead of JSON
pub fn templated(text: &str, request: &DiagnosisRequest, provider: &str) -> DiagnosisResult {
    let prose = text.trim();
    let diagnosis = if prose.is_empty() {
        format!(
            "The assistant returned no details for: {}",
            request.symptom_list().join(", ")
        )
    } else if prose.chars().count() > MAX_TEMPLATED_DIAGNOSIS {
        let cut: String = prose.chars().take(MAX_TEMPLATED_DIAGNOSIS).collect();
        format!("{}...", cut.trim_end())
    } else {
        prose.to_string()
    };

    DiagnosisResult {
        possible_causes: vec![diagnosis.clone()],
        diagnosis,
        recommendations: vec![
            "Perform a hands-on inspection to confirm the suggested cause".to_string(),
            "Read active and inactive fault codes with a diagnostic scan tool".to_string(),
            "Consult a qualified heavy-duty truck technician before further operation"
                .to_string(),
        ],
        confidence: constants::ai::TEMPLATED_CONFIDENCE,
        estimated_cost: "Varies - inspection required".to_string(),
        urgency: request.urgency,
        provider: provider.to_string(),
        tools_needed: vec![
            "Diagnostic scan tool (J1939)".to_string(),
            "Multimeter".to_string(),
            "Basic hand tools".to_string(),
        ],
        safety_notes: vec![
            "Park on level ground, chock the wheels and shut down the engine before inspecting"
                .to_string(),
        ],
    }
}

/// Strict parse first, templated answer otherwise
pub fn parse_or_degrade(text: &str, request: &DiagnosisRequest, provider: &str) -> DiagnosisResult {
    let parsed = extract_json(text)
        .ok_or_else(|| ProviderError::Parse("no JSON object in response".to_string()))
        .and_then(|value| normalize(&value, request, provider));

    match parsed {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(provider, error = %e, "Degrading to templated diagnosis");
            templated(text, request, provider)
        }
    }
}

fn lookup<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| value.get(*k)).filter(|v| !v.is_null())
}

fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    lookup(value, keys)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn number_field(value: &Value, keys: &[&str]) -> Option<f64> {
    match lookup(value, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn cost_field(value: &Value) -> Option<String> {
    match lookup(value, &["estimatedCost", "estimated_cost", "cost", "costEstimate"])? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(format!("${}", n)),
        Value::Object(range) => {
            let min = range.get("min").and_then(|v| v.as_f64())?;
            let max = range.get("max").and_then(|v| v.as_f64())?;
            Some(format!("${:.0} - ${:.0}", min, max))
        }
        _ => None,
    }
}

/// Accept an array of strings, an array of objects with a text-ish field, or
/// a single string
fn string_list(value: &Value, keys: &[&str]) -> Vec<String> {
    match lookup(value, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(_) => ["cause", "description", "action", "text", "title", "name"]
                    .iter()
                    .find_map(|k| item.get(*k).and_then(|v| v.as_str()))
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TruckInfo;
    use serde_json::json;

    fn request() -> DiagnosisRequest {
        DiagnosisRequest {
            truck: TruckInfo {
                make: "International".into(),
                model: "LT".into(),
                year: 2020,
                engine: "A26".into(),
            },
            symptoms: vec!["Check engine light".into()],
            context: None,
            urgency: Urgency::Low,
        }
    }

    #[test]
    fn test_extract_plain_fenced_and_embedded() {
        assert!(extract_json(r#"{"diagnosis": "x"}"#).is_some());
        assert!(extract_json("Here you go:\n```json\n{\"diagnosis\": \"x\"}\n```").is_some());
        assert!(extract_json("Sure! {\"diagnosis\": \"x\"} Hope that helps.").is_some());
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("[1, 2]").is_none());
    }

    #[test]
    fn test_normalize_camel_case() {
        let value = json!({
            "diagnosis": "Failed EGR cooler",
            "possibleCauses": ["Cracked EGR cooler", {"cause": "Stuck EGR valve"}],
            "recommendations": ["Pressure test cooling system"],
            "confidence": 85,
            "estimatedCost": {"min": 1500, "max": 3000},
            "urgency": "HIGH",
            "toolsNeeded": "Pressure tester"
        });
        let result = normalize(&value, &request(), "azure-openai").unwrap();
        assert_eq!(result.possible_causes.len(), 2);
        assert_eq!(result.possible_causes[1], "Stuck EGR valve");
        assert!((result.confidence - 0.85).abs() < 1e-9);
        assert_eq!(result.estimated_cost, "$1500 - $3000");
        assert_eq!(result.urgency, Urgency::High);
        assert_eq!(result.tools_needed, vec!["Pressure tester"]);
        assert_eq!(result.provider, "azure-openai");
    }

    #[test]
    fn test_normalize_snake_case_and_defaults() {
        let value = json!({
            "possible_causes": ["Loose gas cap"],
            "confidence": "150%",
        });
        let result = normalize(&value, &request(), "inference").unwrap();
        assert_eq!(result.diagnosis, "Loose gas cap");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.urgency, Urgency::Low);
        assert_eq!(result.estimated_cost, "Unknown");
    }

    #[test]
    fn test_normalize_rejects_empty_object() {
        assert!(normalize(&json!({"confidence": 0.5}), &request(), "inference").is_err());
        assert!(normalize(&json!({"diagnosis": "ok"}), &request(), "inference").is_err());
    }

    #[test]
    fn test_parse_or_degrade_falls_back_to_template() {
        let result = parse_or_degrade("Probably a bad sensor.", &request(), "azure-agent");
        assert_eq!(result.diagnosis, "Probably a bad sensor.");
        assert_eq!(result.confidence, constants::ai::TEMPLATED_CONFIDENCE);
        assert!(!result.recommendations.is_empty());
        assert!(!result.safety_notes.is_empty());
        assert_eq!(result.urgency, Urgency::Low);
    }

    #[test]
    fn test_templated_truncates_long_prose() {
        let long = "word ".repeat(400);
        let result = templated(&long, &request(), "inference");
        assert!(result.diagnosis.ends_with("..."));
        assert!(result.diagnosis.chars().count() <= MAX_TEMPLATED_DIAGNOSIS + 3);
    }
}
