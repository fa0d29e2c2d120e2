use crate::cancel::CancelSignal;
use crate::model::Agent;
use crate::repo::{AgentRepo, SessionRepo, TenantRepo};
use crate::resolver::AgentSnapshot;
use crate::telemetry::RuntimeMetrics;
use crate::{Result, RuntimeError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const DAILY_WINDOW_SECONDS: i64 = 24 * 60 * 60;

/// Which dimension caused a deny or an abort; carried to the caller as a
/// machine-readable reason and recorded on the SessionRecord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDimension {
    TenantBalance,
    AgentOverallCap,
    AgentDailyCap,
    PerCallCap,
}

impl QuotaDimension {
    pub fn reason_code(&self) -> &'static str {
        match self {
            QuotaDimension::TenantBalance => "insufficient_tokens",
            QuotaDimension::AgentOverallCap => "agent_overall_cap_reached",
            QuotaDimension::AgentDailyCap => "agent_daily_cap_reached",
            QuotaDimension::PerCallCap => "per_call_cap_reached",
        }
    }
}

/// `tick_interval = 60 / tokens_per_minute` seconds; falls back to a 10s tick
/// when the configured rate is non-positive (§4.3).
pub fn tick_interval(tokens_per_minute: i64) -> Duration {
    if tokens_per_minute <= 0 {
        Duration::from_secs(10)
    } else {
        Duration::from_secs_f64(60.0 / tokens_per_minute as f64)
    }
}

/// Rolls the daily window forward if 24h have elapsed since `window_start`,
/// zeroing `used` in the process (B4 — no partial rollover).
fn roll_daily_window(agent: &mut Agent, now: i64) {
    if agent.quota.daily.window_start_unix == 0 {
        agent.quota.daily.window_start_unix = now;
        return;
    }
    if now - agent.quota.daily.window_start_unix >= DAILY_WINDOW_SECONDS {
        agent.quota.daily.used = 0;
        agent.quota.daily.window_start_unix = now;
    }
}

pub struct QuotaEnforcer {
    tenants: Arc<TenantRepo>,
    agents: Arc<AgentRepo>,
    sessions: Arc<SessionRepo>,
    metrics: Arc<RuntimeMetrics>,
    tokens_per_minute: i64,
}

impl QuotaEnforcer {
    pub fn new(
        tenants: Arc<TenantRepo>,
        agents: Arc<AgentRepo>,
        sessions: Arc<SessionRepo>,
        metrics: Arc<RuntimeMetrics>,
        tokens_per_minute: i64,
    ) -> Self {
        Self {
            tenants,
            agents,
            sessions,
            metrics,
            tokens_per_minute,
        }
    }

    /// Read-only balance lookup for operator tooling (no admission side
    /// effects). Mirrors the introspection accessors the original post-call
    /// recorder exposed for pending/completed retrievals.
    pub fn tenant_balance(&self, tenant_id: &str) -> Result<i64> {
        Ok(self.tenants.get(tenant_id)?.token_balance)
    }

    /// Read-only usage-so-far lookup for operator tooling.
    pub fn agent_usage(&self, agent_id: &str) -> Result<Agent> {
        self.agents.get(agent_id)
    }

    /// One synchronous check performed at admission (§4.3). Does not debit.
    #[instrument(skip(self, snapshot), fields(agent_id = %snapshot.agent.id, tenant_id = %snapshot.tenant.id))]
    pub fn admit(&self, snapshot: &AgentSnapshot) -> Result<()> {
        if snapshot.tenant.token_balance <= 0 {
            self.metrics.record_refused("insufficient_tokens");
            return Err(RuntimeError::QuotaExhausted(
                "tenant token balance is zero".into(),
            ));
        }
        let agent = self.agents.get(&snapshot.agent.id)?;
        if agent.quota.overall.cap > 0 && agent.quota.overall.used >= agent.quota.overall.cap {
            self.metrics.record_refused("agent_overall_cap_reached");
            return Err(RuntimeError::QuotaExhausted(
                "agent overall token cap reached".into(),
            ));
        }
        let now = Utc::now().timestamp();
        if agent.quota.daily.cap > 0 {
            let daily_used = if now - agent.quota.daily.window_start_unix >= DAILY_WINDOW_SECONDS {
                0
            } else {
                agent.quota.daily.used
            };
            if daily_used >= agent.quota.daily.cap {
                self.metrics.record_refused("agent_daily_cap_reached");
                return Err(RuntimeError::QuotaExhausted(
                    "agent daily call cap reached".into(),
                ));
            }
        }
        Ok(())
    }

    /// One metered tick: re-reads the three counters, and either commits a
    /// +1 debit across all of them or returns the breached dimension without
    /// mutating anything (I2/I3 check-then-debit). Exposed so callers and
    /// tests can drive a single tick without waiting on the ticker interval.
    pub fn tick(
        &self,
        session_id: &str,
        agent_id: &str,
        tenant_id: &str,
        per_call_cap: u64,
    ) -> Result<std::result::Result<(), QuotaDimension>> {
        let tenant = self.tenants.get(tenant_id)?;
        if tenant.token_balance < 1 {
            return Ok(Err(QuotaDimension::TenantBalance));
        }

        let agent = self.agents.get(agent_id)?;
        if agent.quota.overall.cap > 0 && agent.quota.overall.used + 1 > agent.quota.overall.cap {
            return Ok(Err(QuotaDimension::AgentOverallCap));
        }
        let now = Utc::now().timestamp();
        let daily_used_before_roll = if now - agent.quota.daily.window_start_unix
            >= DAILY_WINDOW_SECONDS
        {
            0
        } else {
            agent.quota.daily.used
        };
        if agent.quota.daily.cap > 0 && daily_used_before_roll + 1 > agent.quota.daily.cap {
            return Ok(Err(QuotaDimension::AgentDailyCap));
        }

        let session = self.sessions.get(session_id)?;
        if per_call_cap > 0 && session.tokens_consumed + 1 > per_call_cap {
            return Ok(Err(QuotaDimension::PerCallCap));
        }

        self.tenants.try_debit(tenant_id, 1)?;
        self.agents.mutate(agent_id, |a| {
            roll_daily_window(a, now);
            a.quota.overall.used += 1;
            a.quota.daily.used += 1;
        })?;
        self.sessions.mutate(session_id, |s| {
            s.tokens_consumed += 1;
        })?;
        self.metrics.record_tokens_debited(tenant_id, 1);
        Ok(Ok(()))
    }

    /// Runs for the lifetime of a session, ticking at a rate derived from
    /// `tokens_per_minute`. Exits on its own cancellation signal, on
    /// detecting a breach (after signalling `cancel`), or if the session
    /// record vanishes underneath it.
    #[instrument(skip(self, cancel), fields(session_id = %session_id))]
    pub async fn run_meter(
        self: Arc<Self>,
        session_id: String,
        agent_id: String,
        tenant_id: String,
        per_call_cap: u64,
        cancel: CancelSignal,
    ) -> Option<QuotaDimension> {
        let interval_dur = tick_interval(self.tokens_per_minute);
        let mut ticker = tokio::time::interval(interval_dur);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return None;
                }
                _ = ticker.tick() => {
                    match self.tick(&session_id, &agent_id, &tenant_id, per_call_cap) {
                        Ok(Ok(())) => continue,
                        Ok(Err(dim)) => {
                            warn!(reason = dim.reason_code(), "quota breached, cancelling session");
                            self.metrics.record_quota_exhausted(dim.reason_code());
                            cancel.cancel();
                            return Some(dim);
                        }
                        Err(RuntimeError::NotFound(_)) => {
                            info!("session record gone, meter exiting");
                            return None;
                        }
                        Err(e) => {
                            warn!(error = %e, "meter tick storage error, cancelling session");
                            cancel.cancel();
                            return Some(QuotaDimension::TenantBalance);
                        }
                    }
                }
            }
        }
    }
}
