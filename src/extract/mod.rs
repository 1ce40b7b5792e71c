//! Best-effort extraction of a structured record from an opaque generation
//! payload. The payload shape is not contractually fixed upstream: it may be
//! a structured object, a string, or a structured object wrapping a string
//! that itself wraps a fenced block of JSON. Extraction walks an ordered,
//! short-circuiting chain of strategies; the first candidate that passes the
//! caller's shape predicate wins. The chain never propagates an error.

mod strategies;

use serde_json::Value;
use tracing::debug;

/// A tagged, pure extraction strategy. Each returns its candidate records in
/// priority order; the shape predicate in [`extract`] picks the winner.
struct Strategy {
    name: &'static str,
    run: fn(&Value) -> Vec<Value>,
}

const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "known-fields",
        run: strategies::from_known_fields,
    },
    Strategy {
        name: "fenced-text",
        run: strategies::from_fenced_text,
    },
    Strategy {
        name: "brace-span",
        run: strategies::from_brace_span,
    },
    Strategy {
        name: "step-sequence",
        run: strategies::from_step_sequence,
    },
    Strategy {
        name: "reserialized",
        run: strategies::from_reserialized,
    },
];

/// Try each strategy in order and return the first candidate record carrying
/// at least one of the `required` fields non-empty. `None` means "no usable
/// output" and must not be treated as an error by callers.
pub fn extract(payload: &Value, required: &[&str]) -> Option<Value> {
    for strategy in STRATEGIES {
        let candidates = (strategy.run)(payload);
        let produced = candidates.len();

        for candidate in candidates {
            if has_any_required(&candidate, required) {
                debug!("extraction succeeded via strategy '{}'", strategy.name);
                return Some(candidate);
            }
        }
        if produced > 0 {
            debug!(
                "strategy '{}' produced {} candidate(s) without required fields",
                strategy.name, produced
            );
        }
    }

    None
}

/// Shape-validity predicate: at least one required field present and
/// non-empty.
fn has_any_required(candidate: &Value, required: &[&str]) -> bool {
    required.iter().any(|field| {
        candidate
            .get(field)
            .map(|value| match value {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                Value::Array(items) => !items.is_empty(),
                _ => true,
            })
            .unwrap_or(false)
    })
}
