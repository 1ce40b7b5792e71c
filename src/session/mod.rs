//! One client-facing analysis session: fan-out, persistence barrier,
//! synthesis, and the tagged event stream in between. The session owns the
//! in-memory aggregate for the duration of one request; nothing else mutates
//! it.

mod orchestrator;
mod synthesis;
mod worker;

pub use orchestrator::{FanOut, Orchestrator};
pub use synthesis::{canonicalize_conflict, synthesize, SynthesisOutcome};
pub use worker::{run_perspective, PerspectiveOutcome, WorkerStatus};

use crate::config::Config;
use crate::error::ArchiveError;
use crate::generate::Generator;
use crate::model::{Analysis, Angle, Reaction, Verdict};
use crate::store::{Archive, StoredRecord};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

/// Tagged lifecycle events streamed back to the client. `result-primary`
/// payloads are cumulative: each carries the full accumulated set so far.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Start {
        analysis_id: Uuid,
    },
    Progress {
        message: String,
    },
    ResultPrimary {
        primary: Vec<Reaction>,
        secondary: Vec<Angle>,
    },
    ResultSynthesis {
        synthesis: Verdict,
    },
    Error {
        message: String,
    },
    Ping {
        timestamp: DateTime<Utc>,
    },
    Done {
        analysis_id: Uuid,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Start { .. } => "start",
            SessionEvent::Progress { .. } => "progress",
            SessionEvent::ResultPrimary { .. } => "result-primary",
            SessionEvent::ResultSynthesis { .. } => "result-synthesis",
            SessionEvent::Error { .. } => "error",
            SessionEvent::Ping { .. } => "ping",
            SessionEvent::Done { .. } => "done",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            SessionEvent::Start { analysis_id } => json!({ "analysis_id": analysis_id }),
            SessionEvent::Progress { message } => json!({ "message": message }),
            SessionEvent::ResultPrimary { primary, secondary } => {
                json!({ "primary": primary, "secondary": secondary })
            }
            SessionEvent::ResultSynthesis { synthesis } => json!({ "synthesis": synthesis }),
            SessionEvent::Error { message } => json!({ "message": message }),
            SessionEvent::Ping { timestamp } => json!({ "timestamp": timestamp }),
            SessionEvent::Done { analysis_id } => json!({ "analysis_id": analysis_id }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Started,
    Collecting,
    Persisted,
    Synthesizing,
    Synthesized,
    Done,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Started => "started",
            SessionState::Collecting => "collecting",
            SessionState::Persisted => "persisted",
            SessionState::Synthesizing => "synthesizing",
            SessionState::Synthesized => "synthesized",
            SessionState::Done => "done",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone)]
pub struct Session {
    config: Arc<Config>,
    generator: Arc<dyn Generator>,
    archive: Arc<dyn Archive>,
}

impl Session {
    pub fn new(
        config: Arc<Config>,
        generator: Arc<dyn Generator>,
        archive: Arc<dyn Archive>,
    ) -> Self {
        Self {
            config,
            generator,
            archive,
        }
    }

    /// Run the full lifecycle for one submitted line, emitting events into
    /// `tx`. Emits exactly one terminal `done` on every non-panic path; a
    /// closed receiver never aborts the work.
    pub async fn run(&self, line: String, tx: mpsc::Sender<SessionEvent>) {
        let mut analysis = Analysis::new(line);
        let analysis_id = analysis.id;
        let mut state = SessionState::Idle;

        advance(&mut state, SessionState::Started, analysis_id);
        let _ = tx
            .send(SessionEvent::Start { analysis_id })
            .await;

        advance(&mut state, SessionState::Collecting, analysis_id);
        let orchestrator = Orchestrator::new(self.config.clone(), self.generator.clone());
        let fan_out = orchestrator.run_all(&analysis.line, analysis_id, &tx).await;
        analysis.reactions = fan_out.reactions;
        analysis.angles = fan_out.angles;

        // Persistence barrier: the partial aggregate lands before synthesis.
        let records = match partial_records(&analysis) {
            Ok(records) => records,
            Err(e) => {
                return self.fail(&tx, &mut state, analysis_id, e).await;
            }
        };
        if let Err(e) = self.archive.bulk_store(&records).await {
            return self.fail(&tx, &mut state, analysis_id, e).await;
        }
        advance(&mut state, SessionState::Persisted, analysis_id);

        if self.config.synthesis.enabled && !analysis.reactions.is_empty() {
            advance(&mut state, SessionState::Synthesizing, analysis_id);
            let _ = tx
                .send(SessionEvent::Progress {
                    message: "Synthesizing divergence assessment".to_string(),
                })
                .await;

            let outcome = synthesize(
                self.generator.as_ref(),
                analysis_id,
                &analysis.line,
                &analysis.reactions,
            )
            .await;

            // A degraded verdict is advisory: the reactions already streamed
            // stay valid, so this error does not block `done`.
            if let Some(reason) = outcome.degraded {
                let _ = tx.send(SessionEvent::Error { message: reason }).await;
            }

            let stored = match StoredRecord::verdict(&outcome.verdict, Utc::now()) {
                Ok(stored) => stored,
                Err(e) => {
                    return self.fail(&tx, &mut state, analysis_id, e).await;
                }
            };
            if let Err(e) = self.archive.bulk_store(&[stored]).await {
                return self.fail(&tx, &mut state, analysis_id, e).await;
            }

            analysis.verdict = Some(outcome.verdict.clone());
            advance(&mut state, SessionState::Synthesized, analysis_id);
            let _ = tx
                .send(SessionEvent::ResultSynthesis {
                    synthesis: outcome.verdict,
                })
                .await;
        }

        advance(&mut state, SessionState::Done, analysis_id);
        let _ = tx.send(SessionEvent::Done { analysis_id }).await;
    }

    async fn fail(
        &self,
        tx: &mpsc::Sender<SessionEvent>,
        state: &mut SessionState,
        analysis_id: Uuid,
        e: ArchiveError,
    ) {
        error!("Session {} failed: {}", analysis_id, e);
        let _ = tx
            .send(SessionEvent::Error {
                message: e.to_string(),
            })
            .await;
        advance(state, SessionState::Done, analysis_id);
        let _ = tx.send(SessionEvent::Done { analysis_id }).await;
    }
}

fn advance(state: &mut SessionState, next: SessionState, analysis_id: Uuid) {
    debug!("Session {}: {} -> {}", analysis_id, state, next);
    *state = next;
}

fn partial_records(analysis: &Analysis) -> Result<Vec<StoredRecord>, ArchiveError> {
    let mut records = vec![StoredRecord::line(analysis)?];
    for reaction in &analysis.reactions {
        records.push(StoredRecord::reaction(reaction, analysis.created_at)?);
    }
    for angle in &analysis.angles {
        records.push(StoredRecord::angle(angle, analysis.id, analysis.created_at)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::testing::MockGenerator;
    use crate::store::{AnalysisRecords, HistoryPage, RecordKind, SimilarLine, SqliteArchive};
    use async_trait::async_trait;
    use serde_json::json;

    fn test_config() -> Arc<Config> {
        let mut config = Config::default();
        config.launch_delay_ms = 0;
        Arc::new(config)
    }

    fn reaction_payload() -> Value {
        json!({
            "reaction": "solid",
            "laugh": "hot",
            "energy": "high",
            "edge": "low",
            "tags": ["observational"],
            "angles": [{"name": "push", "elaboration": "go further"}]
        })
    }

    fn verdict_payload() -> Value {
        json!({
            "divergence": 64,
            "risk": "medium",
            "conflict": "Fan vs Heckler",
            "explanation": "split room",
            "recommendation": "keep the opener"
        })
    }

    async fn run_session(
        generator: MockGenerator,
        config: Arc<Config>,
    ) -> (Vec<SessionEvent>, Arc<dyn Archive>, Arc<MockGenerator>) {
        let archive = SqliteArchive::in_memory().await.unwrap();
        archive.ensure_schema().await.unwrap();
        let archive: Arc<dyn Archive> = Arc::new(archive);
        let generator = Arc::new(generator);

        let session = Session::new(config, generator.clone(), archive.clone());
        let (tx, mut rx) = mpsc::channel(256);
        session.run("My favorite party trick is not attending parties.".to_string(), tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (events, archive, generator)
    }

    fn names(events: &[SessionEvent]) -> Vec<&'static str> {
        events.iter().map(SessionEvent::name).collect()
    }

    #[tokio::test]
    async fn test_full_session_event_sequence() {
        let generator = MockGenerator::new()
            .respond("synthesis", verdict_payload())
            .fallback(reaction_payload());

        let (events, archive, generator) = run_session(generator, test_config()).await;
        let names = names(&events);

        assert_eq!(names.first(), Some(&"start"));
        assert_eq!(names.last(), Some(&"done"));
        assert_eq!(names.iter().filter(|n| **n == "done").count(), 1);
        assert_eq!(
            names.iter().filter(|n| **n == "result-primary").count(),
            6
        );
        assert_eq!(
            names.iter().filter(|n| **n == "result-synthesis").count(),
            1
        );
        assert!(!names.contains(&"error"));

        // 6 perspectives + 1 synthesis call.
        assert_eq!(generator.call_count(), 7);

        // Cumulative payloads grow monotonically.
        let counts: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ResultPrimary { primary, .. } => Some(primary.len()),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 6]);

        // The aggregate is persisted and fetchable.
        let analysis_id = match events[0] {
            SessionEvent::Start { analysis_id } => analysis_id,
            _ => unreachable!(),
        };
        let fetched = archive.fetch(analysis_id, None).await.unwrap();
        assert_eq!(fetched.primary.len(), 6);
        assert_eq!(fetched.secondary.len(), 6);
        assert_eq!(fetched.synthesis.unwrap().conflict, "fan vs heckler");
    }

    #[tokio::test]
    async fn test_one_failure_still_synthesizes() {
        let generator = MockGenerator::new()
            .fail("heckler", "offline")
            .respond("synthesis", verdict_payload())
            .fallback(reaction_payload());

        let (events, _, _) = run_session(generator, test_config()).await;
        let names = names(&events);

        assert_eq!(
            names.iter().filter(|n| **n == "result-primary").count(),
            5
        );
        assert_eq!(
            names.iter().filter(|n| **n == "result-synthesis").count(),
            1
        );
        assert_eq!(names.iter().filter(|n| **n == "done").count(), 1);

        let counts: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ResultPrimary { primary, .. } => Some(primary.len()),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_zero_successes_skips_synthesis() {
        let generator = MockGenerator::new();

        let (events, archive, generator) = run_session(generator, test_config()).await;
        let names = names(&events);

        assert_eq!(names.first(), Some(&"start"));
        assert_eq!(names.last(), Some(&"done"));
        assert!(!names.contains(&"result-primary"));
        assert!(!names.contains(&"result-synthesis"));

        // Only the 6 failed perspective calls; synthesis never invoked.
        assert_eq!(generator.call_count(), 6);

        // The empty analysis is still a legitimate, persisted empty state.
        let analysis_id = match events[0] {
            SessionEvent::Start { analysis_id } => analysis_id,
            _ => unreachable!(),
        };
        let history = archive.list_recent(10, 0).await.unwrap();
        assert!(history
            .items
            .iter()
            .any(|item| item.analysis_id == analysis_id));
    }

    #[tokio::test]
    async fn test_single_success_gets_degenerate_verdict_without_extra_call() {
        let generator = MockGenerator::new()
            .respond("literal", reaction_payload())
            .fail("fan", "down")
            .fail("heckler", "down")
            .fail("critic", "down")
            .fail("absurdist", "down")
            .fail("deadpan", "down");

        let (events, _, generator) = run_session(generator, test_config()).await;

        // 6 perspective calls, no synthesis call for a single reaction.
        assert_eq!(generator.call_count(), 6);

        let verdict = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::ResultSynthesis { synthesis } => Some(synthesis.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(verdict.divergence, 0.0);
        assert_eq!(verdict.risk, crate::model::RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_synthesis_disabled_by_config() {
        let mut config = Config::default();
        config.launch_delay_ms = 0;
        config.synthesis.enabled = false;

        let generator = MockGenerator::new().fallback(reaction_payload());
        let (events, _, generator) = run_session(generator, Arc::new(config)).await;

        assert!(!names(&events).contains(&"result-synthesis"));
        assert_eq!(generator.call_count(), 6);
    }

    #[tokio::test]
    async fn test_synthesis_extraction_failure_emits_error_and_fallback() {
        let generator = MockGenerator::new()
            .respond("synthesis", json!("garbled"))
            .fallback(reaction_payload());

        let (events, _, _) = run_session(generator, test_config()).await;
        let names = names(&events);

        assert!(names.contains(&"error"));
        assert!(names.contains(&"result-synthesis"));
        assert_eq!(names.last(), Some(&"done"));

        let verdict = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::ResultSynthesis { synthesis } => Some(synthesis.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(verdict.conflict, "none detected");
    }

    struct FailingArchive;

    #[async_trait]
    impl Archive for FailingArchive {
        async fn ensure_schema(&self) -> Result<(), ArchiveError> {
            Ok(())
        }

        async fn bulk_store(&self, _records: &[StoredRecord]) -> Result<(), ArchiveError> {
            Err(ArchiveError::Io(std::io::Error::other("disk gone")))
        }

        async fn fetch(
            &self,
            _analysis_id: Uuid,
            _unit_id: Option<&str>,
        ) -> Result<AnalysisRecords, ArchiveError> {
            Ok(AnalysisRecords::default())
        }

        async fn list_recent(&self, _limit: u32, _offset: u32) -> Result<HistoryPage, ArchiveError> {
            Ok(HistoryPage {
                items: Vec::new(),
                total: 0,
            })
        }

        async fn delete(&self, _analysis_id: Uuid) -> Result<u64, ArchiveError> {
            Ok(0)
        }

        async fn find_similar(
            &self,
            _text: &str,
            _limit: u32,
            _exclude: Option<Uuid>,
        ) -> Result<Vec<SimilarLine>, ArchiveError> {
            Ok(Vec::new())
        }

        async fn dump(&self, _kind: RecordKind) -> Result<Vec<StoredRecord>, ArchiveError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal_but_still_done() {
        let config = test_config();
        let generator: Arc<MockGenerator> =
            Arc::new(MockGenerator::new().fallback(reaction_payload()));
        let archive: Arc<dyn Archive> = Arc::new(FailingArchive);

        let session = Session::new(config, generator, archive);
        let (tx, mut rx) = mpsc::channel(256);
        session.run("a line".to_string(), tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let names = names(&events);

        assert!(names.contains(&"error"));
        assert_eq!(names.last(), Some(&"done"));
        assert_eq!(names.iter().filter(|n| **n == "done").count(), 1);
        assert!(!names.contains(&"result-synthesis"));
    }
}
