use opentelemetry::{
    global,
    metrics::{Counter, Histogram, UpDownCounter},
    KeyValue,
};

/// Metrics for admission, metering and session lifecycle, following the
/// counter/histogram/gauge split used elsewhere in this runtime for
/// component-level instrumentation.
pub struct RuntimeMetrics {
    sessions_admitted: Counter<u64>,
    sessions_refused: Counter<u64>,
    sessions_active: UpDownCounter<i64>,
    tokens_debited: Counter<u64>,
    quota_exhausted_total: Counter<u64>,
    admission_latency_ms: Histogram<f64>,
    reconcile_latency_ms: Histogram<f64>,
    reconcile_failures: Counter<u64>,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        let meter = global::meter("runtime.session");

        let sessions_admitted = meter
            .u64_counter("runtime.session.admitted_total")
            .with_description("Total sessions admitted by the gateway")
            .init();

        let sessions_refused = meter
            .u64_counter("runtime.session.refused_total")
            .with_description("Total sessions refused at admission")
            .init();

        let sessions_active = meter
            .i64_up_down_counter("runtime.session.active")
            .with_description("Currently active sessions")
            .init();

        let tokens_debited = meter
            .u64_counter("runtime.quota.tokens_debited_total")
            .with_description("Total tokens debited from tenant balances")
            .init();

        let quota_exhausted_total = meter
            .u64_counter("runtime.quota.exhausted_total")
            .with_description("Total sessions aborted for quota exhaustion")
            .init();

        let admission_latency_ms = meter
            .f64_histogram("runtime.session.admission_latency_ms")
            .with_description("Time from admission request to accept/refuse decision")
            .init();

        let reconcile_latency_ms = meter
            .f64_histogram("runtime.reconciler.settle_latency_ms")
            .with_description("Time from session end to reconciliation completion")
            .init();

        let reconcile_failures = meter
            .u64_counter("runtime.reconciler.failures_total")
            .with_description("Total reconciliation attempts that exhausted retries")
            .init();

        Self {
            sessions_admitted,
            sessions_refused,
            sessions_active,
            tokens_debited,
            quota_exhausted_total,
            admission_latency_ms,
            reconcile_latency_ms,
            reconcile_failures,
        }
    }

    pub fn record_admitted(&self, transport: &'static str) {
        self.sessions_admitted
            .add(1, &[KeyValue::new("transport", transport)]);
        self.sessions_active.add(1, &[]);
    }

    pub fn record_refused(&self, reason: &'static str) {
        self.sessions_refused
            .add(1, &[KeyValue::new("reason", reason)]);
    }

    pub fn record_ended(&self) {
        self.sessions_active.add(-1, &[]);
    }

    pub fn record_tokens_debited(&self, tenant_id: &str, amount: u64) {
        self.tokens_debited
            .add(amount, &[KeyValue::new("tenant_id", tenant_id.to_string())]);
    }

    pub fn record_quota_exhausted(&self, scope: &'static str) {
        self.quota_exhausted_total
            .add(1, &[KeyValue::new("scope", scope)]);
    }

    pub fn record_admission_latency(&self, ms: f64) {
        self.admission_latency_ms.record(ms, &[]);
    }

    pub fn record_reconcile_latency(&self, ms: f64) {
        self.reconcile_latency_ms.record(ms, &[]);
    }

    pub fn record_reconcile_failure(&self) {
        self.reconcile_failures.add(1, &[]);
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
