use crate::config::Config;
use crate::generate::Generator;
use crate::model::{Angle, Reaction};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use super::worker::{run_perspective, WorkerStatus};
use super::SessionEvent;

/// Settled aggregate of one fan-out. Reactions are in completion order.
#[derive(Debug, Default)]
pub struct FanOut {
    pub reactions: Vec<Reaction>,
    pub angles: Vec<Angle>,
    pub attempted: usize,
    pub failures: usize,
    pub total_duration: Duration,
}

pub struct Orchestrator {
    config: Arc<Config>,
    generator: Arc<dyn Generator>,
    semaphore: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, generator: Arc<dyn Generator>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            config,
            generator,
            semaphore,
        }
    }

    /// Launch every enabled perspective concurrently and collect outcomes as
    /// they complete, emitting a progress event and a cumulative
    /// result-primary event per completion. One worker failing never cancels
    /// its siblings; zero successes settles into an empty aggregate.
    pub async fn run_all(
        &self,
        line: &str,
        analysis_id: Uuid,
        events: &mpsc::Sender<SessionEvent>,
    ) -> FanOut {
        let start = std::time::Instant::now();
        let perspectives = self.config.enabled_perspectives();

        info!(
            "Fanning out {} perspectives with concurrency {}",
            perspectives.len(),
            self.config.concurrency
        );

        let mut futures = FuturesUnordered::new();
        let launch_delay = Duration::from_millis(self.config.launch_delay_ms);

        for (idx, perspective) in perspectives.iter().copied().enumerate() {
            // Small delay between launches to avoid burst rate limits
            if idx > 0 && launch_delay > Duration::ZERO {
                sleep(launch_delay).await;
            }

            let semaphore = self.semaphore.clone();
            let generator = self.generator.clone();
            let line = line.to_string();

            futures.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await; // hold until done
                run_perspective(generator.as_ref(), perspective, &line, analysis_id).await
            }));
        }

        let mut fan_out = FanOut {
            attempted: perspectives.len(),
            ..FanOut::default()
        };

        while let Some(joined) = futures.next().await {
            match joined {
                Ok(outcome) => match outcome.status {
                    WorkerStatus::Completed => {
                        info!(
                            "Perspective {} completed with {} angle(s) ({:?})",
                            outcome.perspective,
                            outcome.angles.len(),
                            outcome.duration
                        );

                        if let Some(reaction) = outcome.reaction {
                            fan_out.reactions.push(reaction);
                        }
                        fan_out.angles.extend(outcome.angles);

                        let _ = events
                            .send(SessionEvent::Progress {
                                message: format!(
                                    "Perspective {} completed",
                                    outcome.perspective
                                ),
                            })
                            .await;
                        // Cumulative payload: the full accumulated set so far.
                        let _ = events
                            .send(SessionEvent::ResultPrimary {
                                primary: fan_out.reactions.clone(),
                                secondary: fan_out.angles.clone(),
                            })
                            .await;
                    }
                    WorkerStatus::Failed { error } => {
                        warn!("Perspective {} skipped: {}", outcome.perspective, error);
                        fan_out.failures += 1;

                        let _ = events
                            .send(SessionEvent::Progress {
                                message: format!(
                                    "Perspective {} skipped: {}",
                                    outcome.perspective, error
                                ),
                            })
                            .await;
                    }
                },
                Err(e) => {
                    warn!("Perspective task panicked: {}", e);
                    fan_out.failures += 1;
                }
            }
        }

        fan_out.total_duration = start.elapsed();
        fan_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::testing::MockGenerator;
    use serde_json::json;

    fn test_config() -> Arc<Config> {
        let mut config = Config::default();
        config.launch_delay_ms = 0;
        Arc::new(config)
    }

    fn reaction_payload(text: &str) -> serde_json::Value {
        json!({"reaction": text, "laugh": "warm", "energy": "medium", "edge": "low"})
    }

    async fn drain(mut rx: mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_all_perspectives_succeed() {
        let generator = Arc::new(MockGenerator::new().fallback(reaction_payload("nice")));
        let orchestrator = Orchestrator::new(test_config(), generator);

        let (tx, rx) = mpsc::channel(64);
        let fan_out = orchestrator.run_all("a line", Uuid::new_v4(), &tx).await;

        assert_eq!(fan_out.attempted, 6);
        assert_eq!(fan_out.reactions.len(), 6);
        assert_eq!(fan_out.failures, 0);

        let events = drain(rx).await;
        let cumulative: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ResultPrimary { primary, .. } => Some(primary.len()),
                _ => None,
            })
            .collect();
        assert_eq!(cumulative, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        // Two of six perspectives fail; the rest must still land.
        let generator = Arc::new(
            MockGenerator::new()
                .fail("heckler", "boom")
                .fail("critic", "also boom")
                .fallback(reaction_payload("fine")),
        );
        let orchestrator = Orchestrator::new(test_config(), generator);

        let (tx, rx) = mpsc::channel(64);
        let fan_out = orchestrator.run_all("a line", Uuid::new_v4(), &tx).await;

        assert_eq!(fan_out.attempted, 6);
        assert_eq!(fan_out.reactions.len(), 4);
        assert_eq!(fan_out.failures, 2);

        let events = drain(rx).await;
        let result_events = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ResultPrimary { .. }))
            .count();
        assert_eq!(result_events, 4);
    }

    #[tokio::test]
    async fn test_all_failures_settle_into_empty_aggregate() {
        let generator = Arc::new(MockGenerator::new());
        let orchestrator = Orchestrator::new(test_config(), generator);

        let (tx, rx) = mpsc::channel(64);
        let fan_out = orchestrator.run_all("a line", Uuid::new_v4(), &tx).await;

        assert_eq!(fan_out.reactions.len(), 0);
        assert_eq!(fan_out.failures, 6);

        let events = drain(rx).await;
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::ResultPrimary { .. })));
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_abort_fan_out() {
        let generator = Arc::new(MockGenerator::new().fallback(reaction_payload("still fine")));
        let orchestrator = Orchestrator::new(test_config(), generator);

        let (tx, rx) = mpsc::channel(64);
        drop(rx);
        let fan_out = orchestrator.run_all("a line", Uuid::new_v4(), &tx).await;

        assert_eq!(fan_out.reactions.len(), 6);
    }
}
