//! Offline diagnosis synthesis
//!
//! Rule-based, network-free answers used when every provider has failed.
//! Symptom text is matched against fixed keyword categories, and each matched
//! category contributes canned causes, recommendations, tools and a cost
//! range. Output depends only on the input, so identical requests always get
//! identical answers.

use regex::Regex;
use std::sync::LazyLock;

use crate::constants;
use crate::types::{ChatMessage, DiagnosisRequest, DiagnosisResult, Role, Urgency};

/// Confidence reported for every offline answer
pub const OFFLINE_CONFIDENCE: f64 = 0.3;

const CONSULT_TECHNICIAN: &str =
    "Consult a qualified heavy-duty truck technician to confirm the diagnosis before repair";

const IMMEDIATE_ACTION: &str = "IMMEDIATE: Pull over when safe, shut down the engine and do not \
     continue operating the truck until it has been inspected";

/// Words that make a symptom a safety concern regardless of category
const SAFETY_KEYWORDS: &[&str] = &[
    "brake", "braking", "stopping", "steering", "abs", "air pressure", "air leak", "smoke",
    "fire", "burning", "fuel leak",
];

static SAFETY_PATTERN: LazyLock<Regex> = LazyLock::new(|| keyword_pattern(SAFETY_KEYWORDS));

/// One pattern per entry of `CATEGORIES`, same order
static CATEGORY_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| CATEGORIES.iter().map(|c| keyword_pattern(c.keywords)).collect());

/// Whole words only, allowing plural and common verb endings
///
/// Keeps "abs" out of "absent" and "fire" out of "misfire".
fn keyword_pattern(keywords: &[&str]) -> Regex {
    let alternatives: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
    let pattern = format!(r"\b(?:{})(?:s|es|ed|ing|er|ers)?\b", alternatives.join("|"));
    Regex::new(&pattern).expect("escaped keywords form a valid pattern")
}

struct Category {
    label: &'static str,
    keywords: &'static [&'static str],
    causes: &'static [&'static str],
    recommendations: &'static [&'static str],
    tools: &'static [&'static str],
    cost: (u32, u32),
}


/// Fixed evaluation order; brake rules come first so their items lead
const CATEGORIES: &[Category] = &[
    Category {
        label: "brake system",
        keywords: &[
            "brake", "braking", "stopping", "abs", "air pressure", "air leak", "pulls to",
            "slack adjuster", "air dryer",
        ],
        causes: &[
            "Worn brake linings or drums",
            "Air system leak or failing air compressor",
            "Out-of-adjustment slack adjusters",
            "ABS sensor or modulator valve fault",
        ],
        recommendations: &[
            "Inspect brake linings, drums and slack adjuster stroke",
            "Perform an air brake leak-down test and check compressor build-up time",
            "Scan for ABS fault codes",
        ],
        tools: &["Air pressure gauge", "Brake stroke ruler", "Diagnostic scan tool (J1939)"],
        cost: (300, 2500),
    },
    Category {
        label: "engine cooling",
        keywords: &[
            "overheat", "coolant", "radiator", "temperature", "temp gauge", "water pump",
            "thermostat", "antifreeze",
        ],
        causes: &[
            "Coolant leak from hoses, radiator or water pump",
            "Failed thermostat",
            "Failing water pump",
            "Clogged radiator or inoperative fan clutch",
        ],
        recommendations: &[
            "Check coolant level with the engine cold and pressure test the cooling system",
            "Inspect hoses, clamps, radiator and water pump weep hole for leaks",
            "Verify thermostat and fan clutch operation",
        ],
        tools: &["Cooling system pressure tester", "Infrared thermometer"],
        cost: (200, 3000),
    },
    Category {
        label: "engine",
        keywords: &[
            "engine", "power", "stall", "misfire", "misfiring", "knock", "smoke", "smoking",
            "idle", "idling", "start", "starting",
            "check engine", "oil", "turbo", "dpf", "regen", "exhaust",
        ],
        causes: &[
            "Restricted fuel filters or failing fuel injectors",
            "Turbocharger or boost leak",
            "Clogged diesel particulate filter (DPF)",
            "Faulty engine sensor",
        ],
        recommendations: &[
            "Read engine fault codes with a diagnostic scan tool",
            "Replace fuel filters and check fuel pressure",
            "Inspect intake and charge air piping for boost leaks",
        ],
        tools: &["Diagnostic scan tool (J1939)", "Fuel pressure gauge"],
        cost: (300, 5000),
    },
    Category {
        label: "electrical",
        keywords: &[
            "battery", "electrical", "alternator", "light", "lights", "wiring", "fuse",
            "voltage", "no crank", "dash",
        ],
        causes: &[
            "Weak or failing batteries",
            "Alternator not charging",
            "Corroded or loose battery and ground connections",
            "Damaged wiring harness or blown fuse",
        ],
        recommendations: &[
            "Load test batteries and measure charging voltage",
            "Clean and tighten battery terminals and ground straps",
            "Inspect fuses and harness routing for chafing",
        ],
        tools: &["Multimeter", "Battery load tester"],
        cost: (100, 1500),
    },
    Category {
        label: "transmission",
        keywords: &[
            "transmission", "gear", "shift", "clutch", "slipping", "grinding", "driveline",
            "differential",
        ],
        causes: &[
            "Worn clutch or clutch out of adjustment",
            "Low or contaminated transmission fluid",
            "Shift actuator or air shift system fault",
        ],
        recommendations: &[
            "Check transmission fluid level and condition",
            "Inspect clutch adjustment and free play",
            "Scan the transmission controller for fault codes",
        ],
        tools: &["Diagnostic scan tool (J1939)", "Basic hand tools"],
        cost: (500, 6000),
    },
    Category {
        label: "tire and wheel",
        keywords: &["tire", "tyre", "wheel", "flat", "blowout", "tread", "vibration", "wobble"],
        causes: &[
            "Under-inflated or damaged tire",
            "Wheel end bearing wear",
            "Wheel imbalance or misalignment",
        ],
        recommendations: &[
            "Check tire pressures and inspect tread and sidewalls",
            "Check lug nut torque and wheel end play",
        ],
        tools: &["Tire pressure gauge", "Torque wrench"],
        cost: (150, 1200),
    },
];

static GENERAL: Category = Category {
    label: "general mechanical",
    keywords: &[],
    causes: &["Unclassified mechanical or electrical fault"],
    recommendations: &[
        "Perform a full walk-around inspection",
        "Read all active and inactive fault codes",
    ],
    tools: &["Diagnostic scan tool (J1939)", "Basic hand tools"],
    cost: (100, 2000),
};

/// Build a conservative answer from the request alone
pub fn synthesize(request: &DiagnosisRequest) -> DiagnosisResult {
    let text = searchable_text(request);
    let matched = matched_categories(&text);
    let safety = SAFETY_PATTERN.is_match(&text);

    let urgency = if safety {
        request.urgency.max(Urgency::Medium)
    } else {
        request.urgency
    };

    let mut recommendations = Vec::new();
    if urgency == Urgency::High {
        recommendations.push(IMMEDIATE_ACTION.to_string());
    }
    push_unique(
        &mut recommendations,
        matched.iter().flat_map(|c| c.recommendations.iter()),
    );
    recommendations.push(CONSULT_TECHNICIAN.to_string());

    let mut possible_causes = Vec::new();
    push_unique(&mut possible_causes, matched.iter().flat_map(|c| c.causes.iter()));

    let mut tools_needed = Vec::new();
    push_unique(&mut tools_needed, matched.iter().flat_map(|c| c.tools.iter()));

    let low = matched.iter().map(|c| c.cost.0).min().unwrap_or(GENERAL.cost.0);
    let high = matched.iter().map(|c| c.cost.1).max().unwrap_or(GENERAL.cost.1);

    let labels: Vec<&str> = matched.iter().map(|c| c.label).collect();
    let diagnosis = format!(
        "Offline assessment for {}: the reported symptoms point to a likely {} issue. \
         AI diagnostics were unavailable, so this is a rule-based estimate.",
        request.truck,
        labels.join(" / ")
    );

    let mut safety_notes = Vec::new();
    if safety {
        safety_notes.push(
            "Symptoms may affect braking, steering or fire risk; do not operate the truck until inspected"
                .to_string(),
        );
    }
    safety_notes.push(
        "Park on level ground, chock the wheels and shut down the engine before inspecting"
            .to_string(),
    );

    DiagnosisResult {
        diagnosis,
        possible_causes,
        recommendations,
        confidence: OFFLINE_CONFIDENCE,
        estimated_cost: format!("{} - {}", dollars(low), dollars(high)),
        urgency,
        provider: constants::orchestrator::OFFLINE_PROVIDER.to_string(),
        tools_needed,
        safety_notes,
    }
}

/// Fixed reply for the chat cascade, keyed on the latest user message
pub fn synthesize_chat(messages: &[ChatMessage]) -> String {
    let question = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.to_lowercase())
        .unwrap_or_default();

    let mut reply = String::from(
        "The AI assistants are currently unreachable, so here is general guidance only.",
    );

    if SAFETY_PATTERN.is_match(&question) {
        reply.push_str(
            "\n\nThis sounds safety related. Stop the truck somewhere safe and have it \
             inspected before driving further.",
        );
    }

    for category in categories_in(&question) {
        reply.push_str(&format!(
            "\n\nFor {} problems: {}.",
            category.label,
            category.recommendations.join("; ")
        ));
    }

    reply.push_str(&format!("\n\n{}.", CONSULT_TECHNICIAN));
    reply
}

fn searchable_text(request: &DiagnosisRequest) -> String {
    let mut text = request.symptom_list().join(" \n ");
    if let Some(context) = request.context_text() {
        text.push_str(" \n ");
        text.push_str(context);
    }
    text.to_lowercase()
}

/// Categories whose keywords appear in `text`, in evaluation order
fn categories_in(text: &str) -> Vec<&'static Category> {
    CATEGORIES
        .iter()
        .zip(CATEGORY_PATTERNS.iter())
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(category, _)| category)
        .collect()
}

fn matched_categories(text: &str) -> Vec<&'static Category> {
    let matched = categories_in(text);
    if matched.is_empty() {
        vec![&GENERAL]
    } else {
        matched
    }
}

fn push_unique<'a>(out: &mut Vec<String>, items: impl Iterator<Item = &'a &'static str>) {
    for item in items {
        if !out.iter().any(|existing| existing == item) {
            out.push((*item).to_string());
        }
    }
}

/// `$1,500` style formatting
fn dollars(amount: u32) -> String {
    let digits = amount.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${}", grouped)
}
