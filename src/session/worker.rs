use crate::extract::extract;
use crate::generate::Generator;
use crate::model::{Angle, Level, Perspective, Reaction, Warmth};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fields that qualify an extracted candidate as a reaction record.
pub const REACTION_FIELDS: &[&str] = &["reaction", "laugh", "energy", "edge"];

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStatus {
    Completed,
    Failed { error: String },
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Completed => write!(f, "completed"),
            WorkerStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

#[derive(Debug)]
pub struct PerspectiveOutcome {
    pub perspective: Perspective,
    pub status: WorkerStatus,
    pub reaction: Option<Reaction>,
    pub angles: Vec<Angle>,
    pub duration: Duration,
}

impl PerspectiveOutcome {
    fn failed(perspective: Perspective, error: String, duration: Duration) -> Self {
        Self {
            perspective,
            status: WorkerStatus::Failed { error },
            reaction: None,
            angles: Vec::new(),
            duration,
        }
    }
}

fn persona(perspective: Perspective) -> &'static str {
    match perspective {
        Perspective::Literal => {
            "a relentlessly literal audience member who takes every word at face value"
        }
        Perspective::Fan => "a devoted fan predisposed to love everything the performer says",
        Perspective::Heckler => "a seasoned heckler hunting for the weakest part of the line",
        Perspective::Critic => "a professional comedy critic judging craft, rhythm and originality",
        Perspective::Absurdist => {
            "an absurdist who rewards surreal leaps and punishes predictability"
        }
        Perspective::Deadpan => "a deadpan connoisseur allergic to anything overplayed",
    }
}

fn build_prompt(perspective: Perspective, line: &str) -> String {
    format!(
        "You are {persona}. React to this comedic line:\n\n\
        \"{line}\"\n\n\
        Respond with a single JSON object and nothing else:\n\
        {{\n\
          \"reaction\": \"<one or two sentences, in character>\",\n\
          \"laugh\": \"cold|warm|hot\",\n\
          \"energy\": \"low|medium|high\",\n\
          \"edge\": \"low|medium|high\",\n\
          \"tags\": [\"<short comedic-mode tags, e.g. deadpan, wordplay>\"],\n\
          \"angles\": [{{\"name\": \"<short name>\", \"elaboration\": \"<how to push the line further>\"}}]\n\
        }}",
        persona = persona(perspective),
        line = line,
    )
}

/// Run one perspective against the line. Failure is isolated: this function
/// never returns an error and never prevents sibling workers from finishing.
pub async fn run_perspective(
    generator: &dyn Generator,
    perspective: Perspective,
    line: &str,
    analysis_id: Uuid,
) -> PerspectiveOutcome {
    let start = std::time::Instant::now();

    let prompt = build_prompt(perspective, line);
    // Scope each perspective to its own conversation so concurrent workers
    // never share generation-side state.
    let scope = format!("{}/{}", analysis_id, perspective);

    let payload = match generator.invoke(&scope, &prompt).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Perspective {} failed: {}", perspective, e);
            return PerspectiveOutcome::failed(perspective, e.to_string(), start.elapsed());
        }
    };

    let Some(record) = extract(&payload, REACTION_FIELDS) else {
        warn!("Perspective {} produced no usable output", perspective);
        return PerspectiveOutcome::failed(
            perspective,
            "no usable output".to_string(),
            start.elapsed(),
        );
    };

    let reaction_text = field_text(&record, &["reaction", "text"]).unwrap_or_default();
    let laugh = field_text(&record, &["laugh"]).and_then(|s| s.parse::<Warmth>().ok());
    let energy = field_text(&record, &["energy"]).and_then(|s| s.parse::<Level>().ok());
    let edge = field_text(&record, &["edge"]).and_then(|s| s.parse::<Level>().ok());

    // Permissive on purpose: reaction text or any one rating is enough.
    if reaction_text.is_empty() && laugh.is_none() && energy.is_none() && edge.is_none() {
        return PerspectiveOutcome::failed(
            perspective,
            "record has neither reaction text nor ratings".to_string(),
            start.elapsed(),
        );
    }

    // The request is authoritative over identity and perspective-kind; the
    // extracted record is authoritative only over content.
    let reaction = Reaction {
        id: Uuid::new_v4(),
        analysis_id,
        perspective,
        reaction: reaction_text,
        laugh: laugh.unwrap_or_default(),
        energy: energy.unwrap_or_default(),
        edge: edge.unwrap_or_default(),
        tags: collect_tags(&record),
    };

    let angles = collect_angles(&record, reaction.id);
    debug!(
        "Perspective {} completed with {} angle(s) in {:?}",
        perspective,
        angles.len(),
        start.elapsed()
    );

    PerspectiveOutcome {
        perspective,
        status: WorkerStatus::Completed,
        reaction: Some(reaction),
        angles,
        duration: start.elapsed(),
    }
}

fn field_text(record: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        record
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn collect_tags(record: &Value) -> Vec<String> {
    match record.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn collect_angles(record: &Value, reaction_id: Uuid) -> Vec<Angle> {
    let entries = ["angles", "explorations"]
        .iter()
        .find_map(|key| record.get(key).and_then(Value::as_array));

    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(ordinal, entry)| {
            let (name, elaboration) = match entry {
                Value::String(s) if !s.trim().is_empty() => (s.trim().to_string(), String::new()),
                Value::Object(_) => {
                    let name = field_text(entry, &["name", "title"])?;
                    let elaboration =
                        field_text(entry, &["elaboration", "detail", "description"])
                            .unwrap_or_default();
                    (name, elaboration)
                }
                _ => return None,
            };

            Some(Angle {
                id: Angle::derive_id(reaction_id, ordinal),
                reaction_id,
                name,
                elaboration,
            })
        })
        .collect()
}
