//! Document-store boundary. The core never sees SQL: it hands the archive
//! JSON records keyed by analysis and unit, and asks it for history,
//! similarity ranking and raw dumps. The mapping/index strategy is the
//! implementation's business.

mod insights;
mod sqlite;

pub use insights::{gather_insights, Insights, LabelCount, Summary, TrendPoint};
pub use sqlite::SqliteArchive;

use crate::error::ArchiveError;
use crate::model::{Analysis, Angle, Reaction, Verdict};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Line,
    Reaction,
    Angle,
    Verdict,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Line => "line",
            RecordKind::Reaction => "reaction",
            RecordKind::Angle => "angle",
            RecordKind::Verdict => "verdict",
        }
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(RecordKind::Line),
            "reaction" => Ok(RecordKind::Reaction),
            "angle" => Ok(RecordKind::Angle),
            "verdict" => Ok(RecordKind::Verdict),
            _ => Err(format!("Unknown record kind: {}", s)),
        }
    }
}

/// One stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub analysis_id: Uuid,
    pub unit_id: String,
    pub kind: RecordKind,
    pub line_text: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn line(analysis: &Analysis) -> Result<Self, ArchiveError> {
        Ok(Self {
            analysis_id: analysis.id,
            unit_id: "line".to_string(),
            kind: RecordKind::Line,
            line_text: Some(analysis.line.clone()),
            payload: serde_json::json!({ "line": analysis.line }),
            created_at: analysis.created_at,
        })
    }

    pub fn reaction(reaction: &Reaction, created_at: DateTime<Utc>) -> Result<Self, ArchiveError> {
        Ok(Self {
            analysis_id: reaction.analysis_id,
            unit_id: reaction.id.to_string(),
            kind: RecordKind::Reaction,
            line_text: None,
            payload: serde_json::to_value(reaction)?,
            created_at,
        })
    }

    pub fn angle(
        angle: &Angle,
        analysis_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ArchiveError> {
        Ok(Self {
            analysis_id,
            unit_id: angle.id.clone(),
            kind: RecordKind::Angle,
            line_text: None,
            payload: serde_json::to_value(angle)?,
            created_at,
        })
    }

    pub fn verdict(verdict: &Verdict, created_at: DateTime<Utc>) -> Result<Self, ArchiveError> {
        Ok(Self {
            analysis_id: verdict.analysis_id,
            unit_id: "verdict".to_string(),
            kind: RecordKind::Verdict,
            line_text: None,
            payload: serde_json::to_value(verdict)?,
            created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub analysis_id: Uuid,
    pub line_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarLine {
    pub analysis_id: Uuid,
    pub line_text: String,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

/// Everything stored under one analysis, deserialized back into model types.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisRecords {
    pub primary: Vec<Reaction>,
    pub secondary: Vec<Angle>,
    pub synthesis: Option<Verdict>,
}

#[async_trait]
pub trait Archive: Send + Sync {
    async fn ensure_schema(&self) -> Result<(), ArchiveError>;

    async fn bulk_store(&self, records: &[StoredRecord]) -> Result<(), ArchiveError>;

    /// Records under one analysis, optionally narrowed to one unit.
    async fn fetch(
        &self,
        analysis_id: Uuid,
        unit_id: Option<&str>,
    ) -> Result<AnalysisRecords, ArchiveError>;

    /// Analyses by recency, newest first.
    async fn list_recent(&self, limit: u32, offset: u32) -> Result<HistoryPage, ArchiveError>;

    /// Remove every record of one analysis; returns the number removed.
    async fn delete(&self, analysis_id: Uuid) -> Result<u64, ArchiveError>;

    /// Rank stored lines by similarity to `text`. The ranking method is an
    /// implementation detail and may silently fall back to a lexical scan.
    async fn find_similar(
        &self,
        text: &str,
        limit: u32,
        exclude: Option<Uuid>,
    ) -> Result<Vec<SimilarLine>, ArchiveError>;

    /// Every record of one kind, for aggregate computations.
    async fn dump(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, ArchiveError>;
}
