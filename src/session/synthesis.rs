use crate::extract::extract;
use crate::generate::Generator;
use crate::model::{Reaction, RiskLevel, Verdict};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fields that qualify an extracted candidate as a verdict record.
pub const VERDICT_FIELDS: &[&str] = &[
    "divergence",
    "risk",
    "conflict",
    "explanation",
    "recommendation",
];

#[derive(Debug)]
pub struct SynthesisOutcome {
    pub verdict: Verdict,
    /// Set when the verdict is a fallback rather than an extracted record.
    pub degraded: Option<String>,
}

/// Canonicalize a two-party conflict label: lower-case, strip punctuation,
/// sort the operands around the "vs" separator, rejoin with " vs ".
/// Idempotent and order-independent.
pub fn canonicalize_conflict(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    if let Some(pos) = tokens
        .iter()
        .position(|t| *t == "vs" || *t == "versus")
    {
        let left = tokens[..pos].join(" ");
        let right = tokens[pos + 1..].join(" ");
        if !left.is_empty() && !right.is_empty() {
            let (a, b) = if left <= right {
                (left, right)
            } else {
                (right, left)
            };
            return format!("{} vs {}", a, b);
        }
    }

    tokens.join(" ")
}

/// Fixed verdict for analyses with fewer than two reactions. Synthesis over
/// zero or one perspectives is degenerate, not meaningful.
fn insufficient_data(analysis_id: Uuid) -> Verdict {
    Verdict {
        analysis_id,
        divergence: 0.0,
        risk: RiskLevel::Low,
        conflict: canonicalize_conflict("insufficient data"),
        explanation: "Fewer than two perspectives completed; no divergence to assess.".to_string(),
        recommendation: "Resubmit once more perspectives are available.".to_string(),
        reasoning: None,
    }
}

/// Fixed verdict when the synthesis call or its extraction fails. Synthesis
/// degrades rather than aborting an otherwise successful analysis.
fn fallback(analysis_id: Uuid) -> Verdict {
    Verdict {
        analysis_id,
        divergence: 0.0,
        risk: RiskLevel::Unknown,
        conflict: canonicalize_conflict("none detected"),
        explanation: "The synthesis step returned no usable assessment.".to_string(),
        recommendation: "Interpret the individual reactions directly.".to_string(),
        reasoning: None,
    }
}

fn build_prompt(line: &str, reactions: &[Reaction]) -> String {
    let mut sections = String::new();
    for reaction in reactions {
        sections.push_str(&format!(
            "- {} (laugh: {}, energy: {}, edge: {}): {}\n",
            reaction.perspective,
            reaction.laugh,
            reaction.energy,
            reaction.edge,
            reaction.reaction,
        ));
    }

    format!(
        "Several simulated audience members reacted to this comedic line:\n\n\
        \"{line}\"\n\n\
        Reactions:\n{sections}\n\
        Assess how strongly these perspectives diverge and what the biggest\n\
        disagreement is. Respond with a single JSON object and nothing else:\n\
        {{\n\
          \"divergence\": <0-100>,\n\
          \"risk\": \"low|medium|high\",\n\
          \"conflict\": \"<party A> vs <party B>\",\n\
          \"explanation\": \"<one sentence on the conflict>\",\n\
          \"recommendation\": \"<one actionable suggestion>\",\n\
          \"reasoning\": \"<optional working notes>\"\n\
        }}",
        line = line,
        sections = sections,
    )
}

/// Synthesize a verdict over the aggregate reactions. Skips the generation
/// call entirely below two reactions; any downstream failure degrades to a
/// fixed verdict instead of propagating.
pub async fn synthesize(
    generator: &dyn Generator,
    analysis_id: Uuid,
    line: &str,
    reactions: &[Reaction],
) -> SynthesisOutcome {
    if reactions.len() < 2 {
        debug!(
            "Skipping synthesis for {}: only {} reaction(s)",
            analysis_id,
            reactions.len()
        );
        return SynthesisOutcome {
            verdict: insufficient_data(analysis_id),
            degraded: None,
        };
    }

    let prompt = build_prompt(line, reactions);
    let scope = format!("{}/synthesis", analysis_id);

    let payload = match generator.invoke(&scope, &prompt).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Synthesis call failed for {}: {}", analysis_id, e);
            return SynthesisOutcome {
                verdict: fallback(analysis_id),
                degraded: Some(format!("synthesis call failed: {}", e)),
            };
        }
    };

    let Some(record) = extract(&payload, VERDICT_FIELDS) else {
        warn!("Synthesis produced no usable output for {}", analysis_id);
        return SynthesisOutcome {
            verdict: fallback(analysis_id),
            degraded: Some("synthesis produced no usable output".to_string()),
        };
    };

    SynthesisOutcome {
        verdict: verdict_from_record(analysis_id, &record),
        degraded: None,
    }
}

fn verdict_from_record(analysis_id: Uuid, record: &Value) -> Verdict {
    let divergence = match record.get("divergence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    let risk = record
        .get("risk")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<RiskLevel>().ok())
        .unwrap_or_default();

    let conflict = record
        .get("conflict")
        .and_then(Value::as_str)
        .map(canonicalize_conflict)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| canonicalize_conflict("none detected"));

    let text = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Verdict {
        analysis_id,
        divergence,
        risk,
        conflict,
        explanation: text("explanation").unwrap_or_default(),
        recommendation: text("recommendation").unwrap_or_default(),
        reasoning: text("reasoning"),
    }
}
