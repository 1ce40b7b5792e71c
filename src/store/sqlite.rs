use super::{
    AnalysisRecords, Archive, ArchiveError, HistoryItem, HistoryPage, RecordKind, SimilarLine,
    StoredRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// SQLite-backed archive. Records are JSON documents keyed by
/// `(analysis_id, unit_id)`; line text additionally lands in an FTS5 table
/// for similarity ranking, with a lexical scan as the fallback method.
pub struct SqliteArchive {
    pool: SqlitePool,
    fts_available: AtomicBool,
}

impl SqliteArchive {
    pub async fn connect(db_path: &Path) -> Result<Self, ArchiveError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        debug!("Connecting to database: {}", db_url);
        let pool = SqlitePool::connect(&db_url).await?;

        Ok(Self {
            pool,
            fts_available: AtomicBool::new(false),
        })
    }

    /// In-process database for tests. A single connection keeps every query
    /// on the same in-memory instance.
    pub async fn in_memory() -> Result<Self, ArchiveError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self {
            pool,
            fts_available: AtomicBool::new(false),
        })
    }

    fn fts(&self) -> bool {
        self.fts_available.load(Ordering::Relaxed)
    }

    async fn similar_by_fts(
        &self,
        text: &str,
        limit: u32,
        exclude: Option<Uuid>,
    ) -> Result<Vec<SimilarLine>, ArchiveError> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let match_query = tokens.join(" OR ");

        // Over-fetch one row so applying the exclusion cannot shrink a full
        // result page.
        let rows = sqlx::query(
            r#"
            SELECT lines_fts.analysis_id AS analysis_id,
                   lines_fts.line_text AS line_text,
                   bm25(lines_fts) AS rank,
                   records.created_at AS created_at
            FROM lines_fts
            JOIN records ON records.analysis_id = lines_fts.analysis_id
                        AND records.kind = 'line'
            WHERE lines_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&match_query)
        .bind(i64::from(limit) + 1)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::new();
        for row in rows {
            let analysis_id: String = row.get("analysis_id");
            let Ok(analysis_id) = Uuid::parse_str(&analysis_id) else {
                continue;
            };
            if exclude == Some(analysis_id) {
                continue;
            }

            let rank: f64 = row.get("rank");
            let relevance = (-rank).max(0.0);

            results.push(SimilarLine {
                analysis_id,
                line_text: row.get("line_text"),
                score: relevance / (1.0 + relevance),
                created_at: parse_timestamp(&row.get::<String, _>("created_at")),
            });
        }
        results.truncate(limit as usize);

        Ok(results)
    }

    async fn similar_by_lexical(
        &self,
        text: &str,
        limit: u32,
        exclude: Option<Uuid>,
    ) -> Result<Vec<SimilarLine>, ArchiveError> {
        let rows = sqlx::query(
            "SELECT analysis_id, line_text, created_at FROM records WHERE kind = 'line'",
        )
        .fetch_all(&self.pool)
        .await?;

        let needle = text.to_lowercase();
        let mut results = Vec::new();
        for row in rows {
            let analysis_id: String = row.get("analysis_id");
            let Ok(analysis_id) = Uuid::parse_str(&analysis_id) else {
                continue;
            };
            if exclude == Some(analysis_id) {
                continue;
            }

            let line_text: Option<String> = row.get("line_text");
            let Some(line_text) = line_text else { continue };

            let score = strsim::normalized_levenshtein(&needle, &line_text.to_lowercase());
            if score <= 0.0 {
                continue;
            }

            results.push(SimilarLine {
                analysis_id,
                line_text,
                score,
                created_at: parse_timestamp(&row.get::<String, _>("created_at")),
            });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit as usize);

        Ok(results)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Option<StoredRecord> {
    let analysis_id: String = row.get("analysis_id");
    let kind: String = row.get("kind");
    let payload: String = row.get("payload");

    let analysis_id = Uuid::parse_str(&analysis_id).ok()?;
    let kind: RecordKind = kind.parse().ok()?;
    let payload = serde_json::from_str(&payload).ok()?;

    Some(StoredRecord {
        analysis_id,
        unit_id: row.get("unit_id"),
        kind,
        line_text: row.get("line_text"),
        payload,
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
    })
}

#[async_trait]
impl Archive for SqliteArchive {
    async fn ensure_schema(&self) -> Result<(), ArchiveError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                analysis_id TEXT NOT NULL,
                unit_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                line_text TEXT,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (analysis_id, unit_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_kind ON records (kind, created_at)")
            .execute(&self.pool)
            .await?;

        // FTS5 is the primary similarity method; absence downgrades the
        // archive to the lexical fallback without surfacing anything.
        let fts = sqlx::query(
            "CREATE VIRTUAL TABLE IF NOT EXISTS lines_fts USING fts5(analysis_id UNINDEXED, line_text)",
        )
        .execute(&self.pool)
        .await;

        match fts {
            Ok(_) => self.fts_available.store(true, Ordering::Relaxed),
            Err(e) => {
                warn!("FTS5 unavailable, similarity will use lexical scan: {}", e);
                self.fts_available.store(false, Ordering::Relaxed);
            }
        }

        info!("Archive schema ready (fts: {})", self.fts());
        Ok(())
    }

    async fn bulk_store(&self, records: &[StoredRecord]) -> Result<(), ArchiveError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let analysis_id = record.analysis_id.to_string();
            let payload = serde_json::to_string(&record.payload)?;
            let created_at = record.created_at.to_rfc3339();

            sqlx::query(
                r#"
                INSERT INTO records (analysis_id, unit_id, kind, line_text, payload, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (analysis_id, unit_id) DO UPDATE SET
                    kind = excluded.kind,
                    line_text = excluded.line_text,
                    payload = excluded.payload
                "#,
            )
            .bind(&analysis_id)
            .bind(&record.unit_id)
            .bind(record.kind.as_str())
            .bind(&record.line_text)
            .bind(&payload)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

            if record.kind == RecordKind::Line && self.fts() {
                if let Some(ref line_text) = record.line_text {
                    sqlx::query("DELETE FROM lines_fts WHERE analysis_id = ?")
                        .bind(&analysis_id)
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query("INSERT INTO lines_fts (analysis_id, line_text) VALUES (?, ?)")
                        .bind(&analysis_id)
                        .bind(line_text)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch(
        &self,
        analysis_id: Uuid,
        unit_id: Option<&str>,
    ) -> Result<AnalysisRecords, ArchiveError> {
        let id = analysis_id.to_string();

        let rows = match unit_id {
            Some(unit) => {
                sqlx::query(
                    "SELECT analysis_id, unit_id, kind, line_text, payload, created_at
                     FROM records WHERE analysis_id = ? AND unit_id = ?",
                )
                .bind(&id)
                .bind(unit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT analysis_id, unit_id, kind, line_text, payload, created_at
                     FROM records WHERE analysis_id = ?",
                )
                .bind(&id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut result = AnalysisRecords::default();
        for row in &rows {
            let Some(record) = row_to_record(row) else {
                warn!("Skipping malformed record under analysis {}", analysis_id);
                continue;
            };

            match record.kind {
                RecordKind::Reaction => match serde_json::from_value(record.payload) {
                    Ok(reaction) => result.primary.push(reaction),
                    Err(e) => warn!("Skipping undecodable reaction: {}", e),
                },
                RecordKind::Angle => match serde_json::from_value(record.payload) {
                    Ok(angle) => result.secondary.push(angle),
                    Err(e) => warn!("Skipping undecodable angle: {}", e),
                },
                RecordKind::Verdict => match serde_json::from_value(record.payload) {
                    Ok(verdict) => result.synthesis = Some(verdict),
                    Err(e) => warn!("Skipping undecodable verdict: {}", e),
                },
                RecordKind::Line => {}
            }
        }

        Ok(result)
    }

    async fn list_recent(&self, limit: u32, offset: u32) -> Result<HistoryPage, ArchiveError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE kind = 'line'")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            "SELECT analysis_id, line_text, created_at FROM records
             WHERE kind = 'line'
             ORDER BY created_at DESC, analysis_id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::new();
        for row in rows {
            let analysis_id: String = row.get("analysis_id");
            let Ok(analysis_id) = Uuid::parse_str(&analysis_id) else {
                continue;
            };
            let line_text: Option<String> = row.get("line_text");

            items.push(HistoryItem {
                analysis_id,
                line_text: line_text.unwrap_or_default(),
                created_at: parse_timestamp(&row.get::<String, _>("created_at")),
            });
        }

        Ok(HistoryPage {
            items,
            total: total.max(0) as u64,
        })
    }

    async fn delete(&self, analysis_id: Uuid) -> Result<u64, ArchiveError> {
        let id = analysis_id.to_string();

        let result = sqlx::query("DELETE FROM records WHERE analysis_id = ?")
            .bind(&id)
            .execute(&self.pool)
            .await?;

        if self.fts() {
            sqlx::query("DELETE FROM lines_fts WHERE analysis_id = ?")
                .bind(&id)
                .execute(&self.pool)
                .await?;
        }

        Ok(result.rows_affected())
    }

    async fn find_similar(
        &self,
        text: &str,
        limit: u32,
        exclude: Option<Uuid>,
    ) -> Result<Vec<SimilarLine>, ArchiveError> {
        if self.fts() {
            match self.similar_by_fts(text, limit, exclude).await {
                Ok(results) if !results.is_empty() => return Ok(results),
                Ok(_) => debug!("FTS similarity found nothing, trying lexical scan"),
                Err(e) => debug!("FTS similarity failed, falling back to lexical scan: {}", e),
            }
        }

        self.similar_by_lexical(text, limit, exclude).await
    }

    async fn dump(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, ArchiveError> {
        let rows = sqlx::query(
            "SELECT analysis_id, unit_id, kind, line_text, payload, created_at
             FROM records WHERE kind = ? ORDER BY created_at",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Analysis, Angle, Level, Perspective, Reaction, RiskLevel, Verdict, Warmth};
    use chrono::Duration;

    async fn archive() -> SqliteArchive {
        let archive = SqliteArchive::in_memory().await.unwrap();
        archive.ensure_schema().await.unwrap();
        archive
    }

    fn analysis_with(line: &str, created_at: DateTime<Utc>) -> Analysis {
        let mut analysis = Analysis::new(line.to_string());
        analysis.created_at = created_at;
        analysis
    }

    fn sample_reaction(analysis_id: Uuid) -> Reaction {
        Reaction {
            id: Uuid::new_v4(),
            analysis_id,
            perspective: Perspective::Critic,
            reaction: "tight construction".to_string(),
            laugh: Warmth::Hot,
            energy: Level::High,
            edge: Level::Low,
            tags: vec!["wordplay".to_string()],
        }
    }

    async fn store_line(archive: &SqliteArchive, line: &str, created_at: DateTime<Utc>) -> Uuid {
        let analysis = analysis_with(line, created_at);
        archive
            .bulk_store(&[StoredRecord::line(&analysis).unwrap()])
            .await
            .unwrap();
        analysis.id
    }

    #[tokio::test]
    async fn test_fetch_roundtrip() {
        let archive = archive().await;
        let analysis = analysis_with("a line walks into a bar", Utc::now());

        let reaction = sample_reaction(analysis.id);
        let angle = Angle {
            id: Angle::derive_id(reaction.id, 0),
            reaction_id: reaction.id,
            name: "push it".to_string(),
            elaboration: "what if the bar walks out".to_string(),
        };
        let verdict = Verdict {
            analysis_id: analysis.id,
            divergence: 40.0,
            risk: RiskLevel::Medium,
            conflict: "critic vs fan".to_string(),
            explanation: "split room".to_string(),
            recommendation: "keep it".to_string(),
            reasoning: None,
        };

        archive
            .bulk_store(&[
                StoredRecord::line(&analysis).unwrap(),
                StoredRecord::reaction(&reaction, analysis.created_at).unwrap(),
                StoredRecord::angle(&angle, analysis.id, analysis.created_at).unwrap(),
                StoredRecord::verdict(&verdict, analysis.created_at).unwrap(),
            ])
            .await
            .unwrap();

        let fetched = archive.fetch(analysis.id, None).await.unwrap();
        assert_eq!(fetched.primary.len(), 1);
        assert_eq!(fetched.primary[0].reaction, "tight construction");
        assert_eq!(fetched.secondary.len(), 1);
        assert_eq!(fetched.synthesis.unwrap().conflict, "critic vs fan");

        // Narrowing to one unit only returns that unit.
        let narrowed = archive
            .fetch(analysis.id, Some(&reaction.id.to_string()))
            .await
            .unwrap();
        assert_eq!(narrowed.primary.len(), 1);
        assert!(narrowed.secondary.is_empty());
        assert!(narrowed.synthesis.is_none());
    }

    #[tokio::test]
    async fn test_pagination_is_disjoint_and_complete() {
        let archive = archive().await;
        let base = Utc::now();

        let mut ids = Vec::new();
        for i in 0..5i64 {
            let id = store_line(
                &archive,
                &format!("line number {}", i),
                base + Duration::seconds(i),
            )
            .await;
            ids.push(id);
        }

        let first = archive.list_recent(2, 0).await.unwrap();
        let second = archive.list_recent(2, 2).await.unwrap();
        let third = archive.list_recent(2, 4).await.unwrap();

        assert_eq!(first.total, 5);
        assert_eq!(first.items.len(), 2);
        assert_eq!(second.items.len(), 2);
        assert_eq!(third.items.len(), 1);

        // Newest first: creation order reversed.
        assert_eq!(first.items[0].analysis_id, ids[4]);
        assert_eq!(first.items[1].analysis_id, ids[3]);

        let mut seen: Vec<Uuid> = first
            .items
            .iter()
            .chain(&second.items)
            .chain(&third.items)
            .map(|item| item.analysis_id)
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn test_delete_removes_every_record_kind() {
        let archive = archive().await;
        let analysis = analysis_with("deleted line", Utc::now());
        let reaction = sample_reaction(analysis.id);
        let angle = Angle {
            id: Angle::derive_id(reaction.id, 0),
            reaction_id: reaction.id,
            name: "angle".to_string(),
            elaboration: String::new(),
        };
        let verdict = Verdict {
            analysis_id: analysis.id,
            divergence: 10.0,
            risk: RiskLevel::Low,
            conflict: "none detected".to_string(),
            explanation: String::new(),
            recommendation: String::new(),
            reasoning: None,
        };

        archive
            .bulk_store(&[
                StoredRecord::line(&analysis).unwrap(),
                StoredRecord::reaction(&reaction, analysis.created_at).unwrap(),
                StoredRecord::angle(&angle, analysis.id, analysis.created_at).unwrap(),
                StoredRecord::verdict(&verdict, analysis.created_at).unwrap(),
            ])
            .await
            .unwrap();

        let deleted = archive.delete(analysis.id).await.unwrap();
        assert_eq!(deleted, 4);

        let fetched = archive.fetch(analysis.id, None).await.unwrap();
        assert!(fetched.primary.is_empty());
        assert!(fetched.secondary.is_empty());
        assert!(fetched.synthesis.is_none());

        let history = archive.list_recent(10, 0).await.unwrap();
        assert_eq!(history.total, 0);
    }

    #[tokio::test]
    async fn test_find_similar_ranks_identical_line_first() {
        let archive = archive().await;
        let base = Utc::now();

        let target =
            store_line(&archive, "my favorite party trick is leaving", base).await;
        store_line(&archive, "completely unrelated gardening tip", base).await;
        store_line(&archive, "my favorite trick is arriving early", base).await;

        let results = archive
            .find_similar("my favorite party trick is leaving", 10, None)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].analysis_id, target);
        assert!(results[0].score >= results.last().unwrap().score);
    }

    #[tokio::test]
    async fn test_find_similar_honors_exclusion() {
        let archive = archive().await;
        let base = Utc::now();

        let excluded = store_line(&archive, "the exact same joke", base).await;
        let other = store_line(&archive, "the exact same joke, again", base).await;

        let results = archive
            .find_similar("the exact same joke", 10, Some(excluded))
            .await
            .unwrap();

        assert!(results.iter().all(|r| r.analysis_id != excluded));
        assert!(results.iter().any(|r| r.analysis_id == other));
    }

    #[tokio::test]
    async fn test_lexical_fallback_used_when_fts_disabled() {
        let archive = archive().await;
        archive.fts_available.store(false, Ordering::Relaxed);

        let id = store_line(&archive, "fallback path line", Utc::now()).await;

        let results = archive
            .find_similar("fallback path line", 5, None)
            .await
            .unwrap();
        assert_eq!(results[0].analysis_id, id);
        assert!(results[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_bulk_store_upsert_is_idempotent() {
        let archive = archive().await;
        let analysis = analysis_with("same line twice", Utc::now());
        let record = StoredRecord::line(&analysis).unwrap();

        archive.bulk_store(&[record.clone()]).await.unwrap();
        archive.bulk_store(&[record]).await.unwrap();

        let history = archive.list_recent(10, 0).await.unwrap();
        assert_eq!(history.total, 1);
    }
}
