use crate::model::{Recording, SessionRecord, Transcript};
use crate::storage::Storage;
use crate::{Result, RuntimeError};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;

const SESSION_PREFIX: &str = "session:";
const RECORDING_PREFIX: &str = "recording:";
const TRANSCRIPT_PREFIX: &str = "transcript:";

/// A displaced session holder is notified through this handle so its own
/// control loop can shut down without recording an abort (§4.4).
pub struct ActiveSlot {
    pub session_id: String,
    pub replaced: Arc<Notify>,
}

/// Single-writer-per-key active-session map keyed by agent public dynamic id
/// (I4). A narrow abstraction on purpose (§9 "Global mutable state"): the
/// only thing that would change for a multi-process deployment is swapping
/// this `DashMap` for a leased KV entry.
#[derive(Default)]
pub struct ActiveSessionMap {
    slots: DashMap<String, ActiveSlot>,
}

impl ActiveSessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `session_id` as the sole holder of `public_dynamic_id`,
    /// returning the displaced holder's notifier (if any) so the caller can
    /// signal it before closing its transport.
    pub fn acquire(&self, public_dynamic_id: &str, session_id: &str) -> Option<Arc<Notify>> {
        let prior = self.slots.insert(
            public_dynamic_id.to_string(),
            ActiveSlot {
                session_id: session_id.to_string(),
                replaced: Arc::new(Notify::new()),
            },
        );
        prior.map(|slot| {
            slot.replaced.notify_waiters();
            slot.replaced
        })
    }

    /// Releases the slot, but only if `session_id` is still the current
    /// holder — a displaced session must not clobber its replacement's slot
    /// on its own (delayed) shutdown.
    /// Current count of distinct agents with a live session, surfaced on the
    /// health endpoint.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn release(&self, public_dynamic_id: &str, session_id: &str) {
        if let Some(entry) = self.slots.get(public_dynamic_id) {
            if entry.session_id != session_id {
                return;
            }
        } else {
            return;
        }
        self.slots.remove(public_dynamic_id);
    }
}

/// A unit of work for the Post-Call Reconciler (§4.6), durable across
/// process restarts because it is always persisted before being queued.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReconciliationJob {
    pub session_id: String,
    pub provider_agent_id: String,
    pub start_time_unix: i64,
    pub end_time_unix: i64,
    pub tentative_provider_conversation_id: Option<String>,
    pub attempts: u32,
}

const JOB_PREFIX: &str = "reconcile_job:";

pub struct SessionRepo {
    storage: Arc<Storage>,
    sessions: DashMap<String, SessionRecord>,
    recordings: DashMap<String, Recording>,
    transcripts: DashMap<String, Transcript>,
    pub active: ActiveSessionMap,
}

impl SessionRepo {
    pub fn load(storage: Arc<Storage>) -> Result<Self> {
        let sessions_vec: Vec<SessionRecord> = storage.scan_prefix(SESSION_PREFIX)?;
        let sessions = DashMap::new();
        for s in sessions_vec {
            sessions.insert(s.id.clone(), s);
        }
        let recordings_vec: Vec<Recording> = storage.scan_prefix(RECORDING_PREFIX)?;
        let recordings = DashMap::new();
        for r in recordings_vec {
            recordings.insert(r.session_id.clone(), r);
        }
        let transcripts_vec: Vec<Transcript> = storage.scan_prefix(TRANSCRIPT_PREFIX)?;
        let transcripts = DashMap::new();
        for t in transcripts_vec {
            transcripts.insert(t.session_id.clone(), t);
        }
        Ok(Self {
            storage,
            sessions,
            recordings,
            transcripts,
            active: ActiveSessionMap::new(),
        })
    }

    pub fn create(&self, record: SessionRecord) -> Result<()> {
        self.storage
            .put(format!("{SESSION_PREFIX}{}", record.id), &record)?;
        self.sessions.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<SessionRecord> {
        self.sessions
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| RuntimeError::NotFound(format!("session {id}")))
    }

    pub fn mutate<F>(&self, id: &str, f: F) -> Result<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(format!("session {id}")))?;
        f(&mut entry);
        let snapshot = entry.clone();
        drop(entry);
        self.storage.put(format!("{SESSION_PREFIX}{id}"), &snapshot)?;
        Ok(snapshot)
    }

    pub fn put_recording(&self, recording: Recording) -> Result<()> {
        self.storage.put(
            format!("{RECORDING_PREFIX}{}", recording.session_id),
            &recording,
        )?;
        self.recordings
            .insert(recording.session_id.clone(), recording);
        Ok(())
    }

    pub fn put_transcript(&self, transcript: Transcript) -> Result<()> {
        self.storage.put(
            format!("{TRANSCRIPT_PREFIX}{}", transcript.session_id),
            &transcript,
        )?;
        self.transcripts
            .insert(transcript.session_id.clone(), transcript);
        Ok(())
    }

    /// P4/I-R: a session already bound to a recording has nothing further to
    /// reconcile.
    pub fn has_recording(&self, session_id: &str) -> bool {
        self.recordings.contains_key(session_id)
    }

    pub fn enqueue_job(&self, job: ReconciliationJob) -> Result<()> {
        self.storage
            .put(format!("{JOB_PREFIX}{}", job.session_id), &job)
    }

    pub fn load_pending_jobs(&self) -> Result<Vec<ReconciliationJob>> {
        self.storage.scan_prefix(JOB_PREFIX)
    }

    pub fn remove_job(&self, session_id: &str) -> Result<()> {
        self.storage.delete(format!("{JOB_PREFIX}{session_id}"))
    }
}
