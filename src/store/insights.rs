use super::{Archive, RecordKind, StoredRecord};
use crate::model::{Reaction, Verdict, Warmth};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Insights {
    pub summary: Summary,
    pub risk_distribution: BTreeMap<String, u64>,
    pub energy_distribution: BTreeMap<String, u64>,
    pub divergence_trend: Vec<TrendPoint>,
    pub top_conflicts: Vec<LabelCount>,
    pub successful_modes: Vec<LabelCount>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub total_analyses: u64,
    pub total_reactions: u64,
    pub average_divergence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub at: DateTime<Utc>,
    pub divergence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// Labels the fixed fallback verdicts carry; they describe the absence of a
/// conflict, so they stay out of the conflict leaderboard.
const NON_CONFLICTS: &[&str] = &["none detected", "insufficient data"];

/// Compute historical aggregates. Every sub-aggregate degrades independently:
/// a failed or undecodable source empties that sub-aggregate only, never the
/// whole response.
pub async fn gather_insights(archive: &dyn Archive) -> Insights {
    let lines = dump_or_empty(archive, RecordKind::Line).await;
    let reactions = decode::<Reaction>(&dump_or_empty(archive, RecordKind::Reaction).await);
    let verdicts = decode_with_time::<Verdict>(&dump_or_empty(archive, RecordKind::Verdict).await);

    Insights {
        summary: summary(&lines, &reactions, &verdicts),
        risk_distribution: risk_distribution(&verdicts),
        energy_distribution: energy_distribution(&reactions),
        divergence_trend: divergence_trend(&verdicts),
        top_conflicts: top_conflicts(&verdicts),
        successful_modes: successful_modes(&reactions),
    }
}

async fn dump_or_empty(archive: &dyn Archive, kind: RecordKind) -> Vec<StoredRecord> {
    match archive.dump(kind).await {
        Ok(records) => records,
        Err(e) => {
            warn!("Insights dump for {} failed, degrading: {}", kind.as_str(), e);
            Vec::new()
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(records: &[StoredRecord]) -> Vec<T> {
    records
        .iter()
        .filter_map(|record| serde_json::from_value(record.payload.clone()).ok())
        .collect()
}

fn decode_with_time<T: serde::de::DeserializeOwned>(
    records: &[StoredRecord],
) -> Vec<(T, DateTime<Utc>)> {
    records
        .iter()
        .filter_map(|record| {
            serde_json::from_value(record.payload.clone())
                .ok()
                .map(|value| (value, record.created_at))
        })
        .collect()
}

fn summary(
    lines: &[StoredRecord],
    reactions: &[Reaction],
    verdicts: &[(Verdict, DateTime<Utc>)],
) -> Summary {
    let average_divergence = if verdicts.is_empty() {
        0.0
    } else {
        verdicts.iter().map(|(v, _)| v.divergence).sum::<f64>() / verdicts.len() as f64
    };

    Summary {
        total_analyses: lines.len() as u64,
        total_reactions: reactions.len() as u64,
        average_divergence,
    }
}

fn risk_distribution(verdicts: &[(Verdict, DateTime<Utc>)]) -> BTreeMap<String, u64> {
    let mut distribution = BTreeMap::new();
    for (verdict, _) in verdicts {
        *distribution.entry(verdict.risk.to_string()).or_insert(0) += 1;
    }
    distribution
}

fn energy_distribution(reactions: &[Reaction]) -> BTreeMap<String, u64> {
    let mut distribution = BTreeMap::new();
    for reaction in reactions {
        *distribution.entry(reaction.energy.to_string()).or_insert(0) += 1;
    }
    distribution
}

fn divergence_trend(verdicts: &[(Verdict, DateTime<Utc>)]) -> Vec<TrendPoint> {
    let mut points: Vec<TrendPoint> = verdicts
        .iter()
        .map(|(verdict, at)| TrendPoint {
            at: *at,
            divergence: verdict.divergence,
        })
        .collect();

    points.sort_by_key(|point| point.at);
    if points.len() > 30 {
        points.drain(..points.len() - 30);
    }
    points
}

fn top_conflicts(verdicts: &[(Verdict, DateTime<Utc>)]) -> Vec<LabelCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for (verdict, _) in verdicts {
        let label = verdict.conflict.as_str();
        if label.is_empty() || NON_CONFLICTS.contains(&label) {
            continue;
        }
        *counts.entry(label).or_insert(0) += 1;
    }

    ranked(counts)
}

fn successful_modes(reactions: &[Reaction]) -> Vec<LabelCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for reaction in reactions {
        if reaction.laugh != Warmth::Hot {
            continue;
        }
        for tag in &reaction.tags {
            if !tag.is_empty() {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
    }

    ranked(counts)
}

fn ranked(counts: BTreeMap<&str, u64>) -> Vec<LabelCount> {
    let mut ranked: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
        })
        .collect();

    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    ranked.truncate(5);
    ranked
}
