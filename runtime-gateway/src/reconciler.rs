use runtime_core::model::{Recording, SessionStatus, Transcript, Turn, TurnRole};
use runtime_core::provider::{ConversationDetail, ConversationTurn, ProviderClient};
use runtime_core::repo::{ReconciliationJob, SessionRepo};
use runtime_core::telemetry::RuntimeMetrics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, instrument, warn};

/// Drains the reconciliation work queue, binding each finished session to its
/// provider conversation id and persisting its transcript and recording
/// (§4.6). Durable: every job is written to storage before it is handed to a
/// worker, so a crash mid-reconcile just means the job is picked up again on
/// the next `spawn`.
pub struct Reconciler {
    sessions: Arc<SessionRepo>,
    provider: Arc<dyn ProviderClient>,
    metrics: Arc<RuntimeMetrics>,
    audio_storage_root: PathBuf,
    settle_delay: Duration,
    max_retries: u32,
    worker_count: usize,
    tx: mpsc::Sender<ReconciliationJob>,
    rx: Mutex<Option<mpsc::Receiver<ReconciliationJob>>>,
}

/// Match window either side of the session's own start/end when searching
/// the provider's conversation list for the one this session produced.
const MATCH_WINDOW_SECONDS: i64 = 300;

impl Reconciler {
    pub fn new(
        sessions: Arc<SessionRepo>,
        provider: Arc<dyn ProviderClient>,
        metrics: Arc<RuntimeMetrics>,
        audio_storage_root: PathBuf,
        settle_delay: Duration,
        max_retries: u32,
        worker_count: usize,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(1024);
        Arc::new(Self {
            sessions,
            provider,
            metrics,
            audio_storage_root,
            settle_delay,
            max_retries,
            worker_count: worker_count.max(1),
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    /// Read-only snapshot of everything still awaiting settlement, for
    /// operator tooling (mirrors `get_pending_retrievals` in the original).
    pub fn pending_jobs(&self) -> Vec<ReconciliationJob> {
        self.sessions.load_pending_jobs().unwrap_or_default()
    }

    /// Persists and queues a new job. Called by the Provider Bridge as soon
    /// as a session ends, regardless of how it ended.
    pub async fn enqueue(&self, job: ReconciliationJob) -> runtime_core::Result<()> {
        self.sessions.enqueue_job(job.clone())?;
        let _ = self.tx.send(job).await;
        Ok(())
    }

    /// Loads jobs left over from a prior process lifetime and starts the
    /// worker pool. Returns the worker handles so the caller can await a
    /// clean shutdown.
    pub async fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let pending = self.sessions.load_pending_jobs().unwrap_or_default();
        if !pending.is_empty() {
            info!(count = pending.len(), "resuming pending reconciliation jobs");
        }
        for job in pending {
            let _ = self.tx.send(job).await;
        }

        let rx = self
            .rx
            .lock()
            .await
            .take()
            .expect("Reconciler::spawn called more than once");
        let rx = Arc::new(Mutex::new(rx));

        (0..self.worker_count)
            .map(|worker_id| {
                let this = self.clone();
                let rx = rx.clone();
                tokio::spawn(async move { this.run_worker(worker_id, rx).await })
            })
            .collect()
    }

    async fn run_worker(
        self: Arc<Self>,
        worker_id: usize,
        rx: Arc<Mutex<mpsc::Receiver<ReconciliationJob>>>,
    ) {
        loop {
            let job = {
                let mut guard = rx.lock().await;
                guard.recv().await
            };
            let Some(job) = job else {
                return;
            };
            self.process(worker_id, job).await;
        }
    }

    #[instrument(skip(self, job), fields(session_id = %job.session_id, worker_id))]
    async fn process(&self, worker_id: usize, mut job: ReconciliationJob) {
        if self.sessions.has_recording(&job.session_id) {
            // P4/I-R: already settled by an earlier attempt.
            let _ = self.sessions.remove_job(&job.session_id);
            return;
        }

        let settle_at = job.end_time_unix + self.settle_delay.as_secs() as i64;
        let now = chrono::Utc::now().timestamp();
        if now < settle_at {
            self.requeue_after(job, Duration::from_secs((settle_at - now) as u64))
                .await;
            return;
        }

        let started = std::time::Instant::now();
        match self.try_settle(&job).await {
            Ok(true) => {
                let _ = self.sessions.remove_job(&job.session_id);
                self.metrics
                    .record_reconcile_latency(started.elapsed().as_millis() as f64);
            }
            Ok(false) => {
                // Conversation not yet complete on the provider's side; retry with backoff.
                self.bump_and_retry(job).await;
            }
            Err(e) => {
                warn!(error = %e, worker_id, "reconciliation attempt failed");
                self.metrics.record_reconcile_failure();
                job.attempts += 1;
                if job.attempts >= self.max_retries {
                    error!(session_id = %job.session_id, attempts = job.attempts, "giving up on reconciliation");
                    let _ = self.sessions.mutate(&job.session_id, |s| {
                        if s.status == SessionStatus::Active {
                            s.status = SessionStatus::AbortedError;
                        }
                    });
                    let _ = self.sessions.remove_job(&job.session_id);
                } else {
                    self.bump_and_retry(job).await;
                }
            }
        }
    }

    /// Attempts to bind, fetch, and persist. Returns `Ok(false)` if the
    /// provider's data isn't ready yet (distinct from a hard error so the
    /// caller doesn't burn a retry budget entry on ordinary settle latency).
    async fn try_settle(&self, job: &ReconciliationJob) -> runtime_core::Result<bool> {
        let conversation_id = match &job.tentative_provider_conversation_id {
            Some(id) => id.clone(),
            None => match self.bind_conversation_id(job).await? {
                Some(id) => {
                    let mut bound = job.clone();
                    bound.tentative_provider_conversation_id = Some(id.clone());
                    self.sessions.enqueue_job(bound)?;
                    id
                }
                None => return Ok(false),
            },
        };

        let detail = match self.provider.get_conversation_detail(&conversation_id).await {
            Ok(d) => d,
            Err(runtime_core::RuntimeError::NotFound(_)) => {
                // The tentative binding was wrong; clear it so the next attempt re-searches.
                let mut cleared = job.clone();
                cleared.tentative_provider_conversation_id = None;
                self.sessions.enqueue_job(cleared)?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if !detail.is_complete() {
            return Ok(false);
        }

        self.persist(job, &conversation_id, &detail).await?;
        Ok(true)
    }

    async fn bind_conversation_id(&self, job: &ReconciliationJob) -> runtime_core::Result<Option<String>> {
        let candidates = self
            .provider
            .list_conversations(
                &job.provider_agent_id,
                job.start_time_unix - MATCH_WINDOW_SECONDS,
                job.end_time_unix + MATCH_WINDOW_SECONDS,
            )
            .await?;
        let best = candidates
            .into_iter()
            .min_by_key(|c| (c.start_time_unix_secs - job.start_time_unix).abs());
        Ok(best.map(|c| c.conversation_id))
    }

    async fn persist(
        &self,
        job: &ReconciliationJob,
        conversation_id: &str,
        detail: &ConversationDetail,
    ) -> runtime_core::Result<()> {
        let turns: Vec<Turn> = detail
            .transcript
            .as_ref()
            .map(|turns| turns.iter().map(convert_turn).collect())
            .unwrap_or_default();
        let summary = detail
            .analysis
            .as_ref()
            .and_then(|a| a.transcript_summary.clone())
            .unwrap_or_default();

        self.sessions.put_transcript(Transcript {
            session_id: job.session_id.clone(),
            turns,
            summary,
        })?;

        let cost = detail.metadata.as_ref().and_then(|m| m.cost);
        self.sessions.mutate(&job.session_id, |s| {
            s.provider_conversation_id = Some(conversation_id.to_string());
            s.cost = cost;
            if s.status == SessionStatus::Active {
                s.status = SessionStatus::Completed;
            }
        })?;

        // Recording persistence only for completed sessions (I5).
        let session = self.sessions.get(&job.session_id)?;
        if detail.has_audio && session.status == SessionStatus::Completed {
            let duration_seconds = detail
                .metadata
                .as_ref()
                .and_then(|m| m.call_duration_secs)
                .unwrap_or(0.0);
            let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
            let path = self
                .audio_storage_root
                .join(format!("{}_{timestamp}.wav", job.session_id));

            let audio_path = match self.provider.fetch_audio(conversation_id).await {
                Ok(bytes) => match self.write_audio(&path, &bytes).await {
                    Ok(()) => path.to_string_lossy().to_string(),
                    Err(e) => {
                        warn!(error = %e, "failed to write recording to disk, leaving audio path empty");
                        String::new()
                    }
                },
                Err(e) => {
                    warn!(error = %e, "failed to fetch recording audio, leaving audio path empty");
                    String::new()
                }
            };
            self.sessions.put_recording(Recording {
                session_id: job.session_id.clone(),
                audio_path,
                duration_seconds,
                provider_conversation_id: conversation_id.to_string(),
            })?;
        }
        Ok(())
    }

    async fn write_audio(&self, path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await
    }

    async fn requeue_after(&self, job: ReconciliationJob, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(job).await;
        });
    }

    async fn bump_and_retry(&self, mut job: ReconciliationJob) {
        job.attempts += 1;
        if job.attempts >= self.max_retries {
            error!(session_id = %job.session_id, "reconciliation exhausted retries without complete provider data");
            let _ = self.sessions.remove_job(&job.session_id);
            return;
        }
        let backoff = Duration::from_secs((10u64 << job.attempts.min(5)).min(600));
        if let Err(e) = self.sessions.enqueue_job(job.clone()) {
            warn!(error = %e, "failed to persist reconciliation backoff state");
        }
        self.requeue_after(job, backoff).await;
    }
}

fn convert_turn(turn: &ConversationTurn) -> Turn {
    Turn {
        role: match turn.role.as_str() {
            "agent" | "assistant" => TurnRole::Agent,
            "tool" => TurnRole::Tool,
            _ => TurnRole::User,
        },
        text: turn.message.clone().unwrap_or_default(),
        time_in_call_secs: turn.time_in_call_secs.unwrap_or(0.0),
        interrupted: turn.interrupted.unwrap_or(false),
        tool_calls: turn.tool_calls.clone(),
        tool_results: turn.tool_results.clone(),
    }
}
