mod common;

use runtime_core::model::{SessionRecord, SessionStatus, TransportKind};
use runtime_core::quota::{tick_interval, QuotaDimension, QuotaEnforcer};
use runtime_core::repo::{AgentRepo, SessionRepo, TenantRepo};
use runtime_core::storage::Storage;
use runtime_core::telemetry::RuntimeMetrics;
use std::sync::Arc;
use std::time::Duration;

fn session_record(id: &str, agent_id: &str, tenant_id: &str) -> SessionRecord {
    SessionRecord {
        id: id.to_string(),
        agent_id: agent_id.to_string(),
        tenant_id: tenant_id.to_string(),
        transport: TransportKind::Browser,
        language: "en".to_string(),
        model_id: "eleven_turbo_v2".to_string(),
        start_time_unix: 0,
        end_time_unix: None,
        status: SessionStatus::Active,
        provider_conversation_id: None,
        tokens_consumed: 0,
        cost: None,
        termination_cause: None,
        language_model_correction: None,
    }
}

fn build(path: &std::path::Path) -> (Arc<QuotaEnforcer>, Arc<TenantRepo>, Arc<AgentRepo>, Arc<SessionRepo>) {
    let storage = Arc::new(Storage::new(path).unwrap());
    let tenants = Arc::new(TenantRepo::load(storage.clone()).unwrap());
    let agents = Arc::new(AgentRepo::load(storage.clone()).unwrap());
    let sessions = Arc::new(SessionRepo::load(storage).unwrap());
    let metrics = Arc::new(RuntimeMetrics::new());
    let enforcer = Arc::new(QuotaEnforcer::new(
        tenants.clone(),
        agents.clone(),
        sessions.clone(),
        metrics,
        60,
    ));
    (enforcer, tenants, agents, sessions)
}

#[test]
fn tick_interval_derives_from_tokens_per_minute() {
    assert_eq!(tick_interval(60), Duration::from_secs(1));
    assert_eq!(tick_interval(10), Duration::from_secs(6));
}

#[test]
fn tick_interval_falls_back_to_ten_seconds_when_rate_is_non_positive() {
    assert_eq!(tick_interval(0), Duration::from_secs(10));
    assert_eq!(tick_interval(-5), Duration::from_secs(10));
}

#[test]
fn admit_refuses_zero_balance_tenant() {
    let path = common::temp_storage_path("quota-admit-zero");
    let (enforcer, tenants, agents, _sessions) = build(&path);
    tenants.upsert(common::tenant("t1", 0)).unwrap();
    agents.upsert(common::agent("a1", "t1", "pub-x")).unwrap();

    let snapshot_tenant = common::tenant("t1", 0);
    let snapshot_agent = common::agent("a1", "t1", "pub-x");
    let snapshot = runtime_core::resolver::AgentSnapshot {
        agent: snapshot_agent,
        tenant: snapshot_tenant,
        voice: common::voice("voice-1"),
        knowledge_items: vec![],
        tools: vec![],
        correction: None,
    };

    let err = enforcer.admit(&snapshot).unwrap_err();
    assert!(matches!(err, runtime_core::RuntimeError::QuotaExhausted(_)));
}

#[test]
fn admit_permits_when_all_caps_have_headroom() {
    let path = common::temp_storage_path("quota-admit-ok");
    let (enforcer, tenants, agents, _sessions) = build(&path);
    tenants.upsert(common::tenant("t1", 50)).unwrap();
    agents.upsert(common::agent("a1", "t1", "pub-x")).unwrap();

    let snapshot = runtime_core::resolver::AgentSnapshot {
        agent: common::agent("a1", "t1", "pub-x"),
        tenant: common::tenant("t1", 50),
        voice: common::voice("voice-1"),
        knowledge_items: vec![],
        tools: vec![],
        correction: None,
    };

    enforcer.admit(&snapshot).expect("should permit");
}

/// (B3) a session that breaches a quota exactly at tick k is aborted before
/// the k-th debit; (P3) tenant balance never goes negative.
#[tokio::test]
async fn meter_aborts_exactly_when_tenant_balance_would_cross_zero() {
    let path = common::temp_storage_path("quota-meter-breach");
    let (enforcer, tenants, agents, sessions) = build(&path);
    tenants.upsert(common::tenant("t1", 3)).unwrap();
    agents.upsert(common::agent("a1", "t1", "pub-x")).unwrap();
    sessions.create(session_record("s1", "a1", "t1")).unwrap();

    for _ in 0..3 {
        let outcome = enforcer
            .tick("s1", "a1", "t1", 0)
            .expect("repo lookups should succeed");
        assert!(outcome.is_ok());
    }

    let breach = enforcer
        .tick("s1", "a1", "t1", 0)
        .expect("repo lookups should succeed");
    assert_eq!(breach, Err(QuotaDimension::TenantBalance));

    let tenant = tenants.get("t1").unwrap();
    assert_eq!(tenant.token_balance, 0);
    let session = sessions.get("s1").unwrap();
    assert_eq!(session.tokens_consumed, 3);
}

#[tokio::test]
async fn meter_enforces_per_call_cap_independently_of_tenant_balance() {
    let path = common::temp_storage_path("quota-meter-percall");
    let (enforcer, tenants, agents, sessions) = build(&path);
    tenants.upsert(common::tenant("t1", 1000)).unwrap();
    agents.upsert(common::agent("a1", "t1", "pub-x")).unwrap();
    sessions.create(session_record("s1", "a1", "t1")).unwrap();

    let first = enforcer.tick("s1", "a1", "t1", 1).unwrap();
    assert!(first.is_ok());
    let second = enforcer.tick("s1", "a1", "t1", 1).unwrap();
    assert_eq!(second, Err(QuotaDimension::PerCallCap));
}

#[tokio::test]
async fn run_meter_stops_immediately_when_cancelled_before_first_tick() {
    let path = common::temp_storage_path("quota-meter-cancel");
    let (enforcer, tenants, agents, sessions) = build(&path);
    tenants.upsert(common::tenant("t1", 1000)).unwrap();
    agents.upsert(common::agent("a1", "t1", "pub-x")).unwrap();
    sessions.create(session_record("s1", "a1", "t1")).unwrap();

    let cancel = runtime_core::CancelSignal::new();
    cancel.cancel();

    let result = enforcer
        .run_meter("s1".into(), "a1".into(), "t1".into(), 0, cancel)
        .await;
    assert!(result.is_none());
}

#[test]
fn tenant_balance_and_agent_usage_reflect_storage_without_side_effects() {
    let path = common::temp_storage_path("quota-introspection");
    let (enforcer, tenants, agents, _sessions) = build(&path);
    tenants.upsert(common::tenant("t1", 42)).unwrap();
    agents.upsert(common::agent("a1", "t1", "pub-x")).unwrap();

    assert_eq!(enforcer.tenant_balance("t1").unwrap(), 42);
    assert_eq!(enforcer.agent_usage("a1").unwrap().id, "a1");
    // A read does not itself debit the balance.
    assert_eq!(enforcer.tenant_balance("t1").unwrap(), 42);
}
