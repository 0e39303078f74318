// Simplification Orchestrator
// Primary -> secondary -> local rules, with circuit breaking per provider

use crate::models::{
    AttemptOutcome, Clause, ClauseCategory, Document, ProviderAttempt, ProviderKind,
    SimplificationResult,
};
use crate::services::providers::{ProviderError, SimplificationBackend};
use crate::services::resilience::{ProviderGate, ProviderGates};
use crate::services::simplification::local_rules::LocalSimplifier;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One external provider slot in the chain.
pub struct ExternalStage {
    pub kind: ProviderKind,
    pub backend: Arc<dyn SimplificationBackend>,
    pub gate: Arc<ProviderGate>,
}

pub enum Strategy {
    External(ExternalStage),
    LocalRules,
}

impl Strategy {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::External(stage) => stage.kind,
            Self::LocalRules => ProviderKind::LocalFallback,
        }
    }
}

pub struct SimplificationOrchestrator {
    chain: Vec<Strategy>,
    local: LocalSimplifier,
    request_timeout: Duration,
}

impl SimplificationOrchestrator {
    /// Chain of the given external backends in order, always ending in local rules.
    pub fn new(
        primary: Option<Arc<dyn SimplificationBackend>>,
        secondary: Option<Arc<dyn SimplificationBackend>>,
        gates: Arc<ProviderGates>,
        local: LocalSimplifier,
        request_timeout: Duration,
    ) -> Self {
        let mut chain = Vec::with_capacity(3);
        if let Some(backend) = primary {
            chain.push(Strategy::External(ExternalStage {
                kind: ProviderKind::Primary,
                backend,
                gate: Arc::clone(&gates.primary),
            }));
        }
        if let Some(backend) = secondary {
            chain.push(Strategy::External(ExternalStage {
                kind: ProviderKind::Secondary,
                backend,
                gate: Arc::clone(&gates.secondary),
            }));
        }
        chain.push(Strategy::LocalRules);
        Self {
            chain,
            local,
            request_timeout,
        }
    }

    /// Orchestrator that only ever uses the local rules.
    pub fn local_only(local: LocalSimplifier) -> Self {
        Self {
            chain: vec![Strategy::LocalRules],
            local,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn chain_kinds(&self) -> Vec<ProviderKind> {
        self.chain.iter().map(Strategy::kind).collect()
    }

    pub async fn simplify(&self, clause: &Clause) -> SimplificationResult {
        self.simplify_text(&clause.text, clause.category).await
    }

    /// Walk the chain until a strategy produces text. Always returns a result.
    pub async fn simplify_text(&self, text: &str, category: ClauseCategory) -> SimplificationResult {
        let started = Instant::now();
        let mut attempts: Vec<ProviderAttempt> = Vec::new();

        if text.trim().is_empty() {
            return self.local_result(text, attempts, started);
        }

        for strategy in &self.chain {
            let stage = match strategy {
                Strategy::LocalRules => break,
                Strategy::External(stage) => stage,
            };

            let Some(permit) = stage.gate.breaker.try_acquire() else {
                debug!("[orchestrator] {} skipped, circuit open", stage.kind);
                attempts.push(ProviderAttempt {
                    provider: stage.kind,
                    outcome: AttemptOutcome::CircuitOpen,
                });
                continue;
            };

            // a cancelled call drops the permit unsettled
            match self.call_stage(stage, text, category).await {
                Ok(simplified) => {
                    permit.record_success();
                    info!(
                        "[orchestrator] simplified via {} ({}) chars={}",
                        stage.kind,
                        stage.backend.name(),
                        simplified.chars().count()
                    );
                    return SimplificationResult {
                        provider: stage.kind,
                        text: simplified,
                        success: true,
                        attempts,
                        latency_ms: started.elapsed().as_millis() as i64,
                    };
                }
                Err(e) => {
                    permit.record_failure();
                    warn!(
                        "[orchestrator] {} ({}) failed: {}",
                        stage.kind,
                        stage.backend.name(),
                        e
                    );
                    attempts.push(ProviderAttempt {
                        provider: stage.kind,
                        outcome: AttemptOutcome::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    });
                }
            }
        }

        self.local_result(text, attempts, started)
    }

    async fn call_stage(
        &self,
        stage: &ExternalStage,
        text: &str,
        category: ClauseCategory,
    ) -> Result<String, ProviderError> {
        let _permit = stage.gate.limiter.acquire().await;
        match tokio::time::timeout(self.request_timeout, stage.backend.simplify(text, category)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        }
    }

    fn local_result(
        &self,
        text: &str,
        attempts: Vec<ProviderAttempt>,
        started: Instant,
    ) -> SimplificationResult {
        SimplificationResult {
            provider: ProviderKind::LocalFallback,
            text: self.local.simplify(text),
            success: false,
            attempts,
            latency_ms: started.elapsed().as_millis() as i64,
        }
    }

    /// Simplify every clause of a document, one at a time in index order.
    pub async fn simplify_document(&self, document: &mut Document) {
        let total = document.clauses.len();
        for clause in document.clauses.iter_mut() {
            let result = self.simplify(clause).await;
            clause.simplification = Some(result);
        }
        let degraded = document
            .clauses
            .iter()
            .filter(|c| {
                c.simplification
                    .as_ref()
                    .is_some_and(|s| !s.provider.is_external())
            })
            .count();
        info!(
            "[orchestrator] document {} simplified clauses={} local_fallback={}",
            document.id, total, degraded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderErrorKind;
    use crate::services::analysis::RuleTables;
    use crate::services::config_store::AppConfig;
    use crate::services::resilience::BreakerState;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        fallback: Result<String, ProviderError>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn always(result: Result<String, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                fallback: result,
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Ok("late".to_string()),
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        /// Fails once, then hangs for `delay` on every later call.
        fn fail_then_hang(delay: Duration) -> Arc<Self> {
            let mut script = VecDeque::new();
            script.push_back(Err(ProviderError::Unavailable {
                status: Some(502),
                message: "bad gateway".to_string(),
            }));
            Arc::new(Self {
                script: Mutex::new(script),
                fallback: Ok("late".to_string()),
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SimplificationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn simplify(&self, _text: &str, _category: ClauseCategory) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            if let Some(scripted) = next {
                return scripted;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.fallback.clone()
        }
    }

    fn gates(threshold: u32) -> Arc<ProviderGates> {
        gates_with_cooldown(threshold, 30)
    }

    fn gates_with_cooldown(threshold: u32, cooldown_secs: u64) -> Arc<ProviderGates> {
        let mut config = AppConfig::default();
        config.simplification.rate_limit.min_interval_ms = 0;
        config.simplification.circuit_breaker.failure_threshold = threshold;
        config.simplification.circuit_breaker.cooldown_secs = cooldown_secs;
        Arc::new(ProviderGates::from_config(&config))
    }

    fn local() -> LocalSimplifier {
        LocalSimplifier::new(Arc::new(RuleTables::builtin().unwrap()))
    }

    fn orchestrator(
        primary: Arc<ScriptedBackend>,
        secondary: Arc<ScriptedBackend>,
        threshold: u32,
        timeout: Duration,
    ) -> SimplificationOrchestrator {
        SimplificationOrchestrator::new(
            Some(primary as Arc<dyn SimplificationBackend>),
            Some(secondary as Arc<dyn SimplificationBackend>),
            gates(threshold),
            local(),
            timeout,
        )
    }

    const CLAUSE: &str = "Vendor shall have unlimited liability for all damages.";

    #[tokio::test]
    async fn test_primary_success() {
        let primary = ScriptedBackend::always(Ok("Vendor pays for everything.".to_string()));
        let secondary = ScriptedBackend::always(Ok("unused".to_string()));
        let orch = orchestrator(primary.clone(), secondary.clone(), 3, Duration::from_secs(5));

        let result = orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
        assert_eq!(result.provider, ProviderKind::Primary);
        assert!(result.success);
        assert!(result.attempts.is_empty());
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_secondary() {
        let primary = ScriptedBackend::always(Err(ProviderError::QuotaExceeded {
            message: "429".to_string(),
        }));
        let secondary = ScriptedBackend::always(Ok("You pay for all losses.".to_string()));
        let orch = orchestrator(primary, secondary, 3, Duration::from_secs(5));

        let result = orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
        assert_eq!(result.provider, ProviderKind::Secondary);
        assert_eq!(result.text, "You pay for all losses.");
        assert_eq!(
            result.failed_providers().collect::<Vec<_>>(),
            vec![ProviderKind::Primary]
        );
    }

    #[tokio::test]
    async fn test_total_outage_uses_local_rules() {
        let primary = ScriptedBackend::always(Err(ProviderError::Auth {
            message: "bad key".to_string(),
        }));
        let secondary = ScriptedBackend::always(Err(ProviderError::MalformedResponse("{}".to_string())));
        let orch = orchestrator(primary, secondary, 3, Duration::from_secs(5));

        let result = orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
        assert_eq!(result.provider, ProviderKind::LocalFallback);
        assert!(!result.success);
        assert!(!result.text.is_empty());
        assert!(!result.text.contains("unlimited liability"));
        assert_eq!(result.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_every_failure_combination_terminates_with_text() {
        let failures = vec![
            ProviderError::Timeout,
            ProviderError::QuotaExceeded { message: String::new() },
            ProviderError::Auth { message: String::new() },
            ProviderError::MalformedResponse(String::new()),
            ProviderError::Unavailable { status: Some(503), message: String::new() },
        ];
        for p in &failures {
            for s in &failures {
                let orch = orchestrator(
                    ScriptedBackend::always(Err(p.clone())),
                    ScriptedBackend::always(Err(s.clone())),
                    100,
                    Duration::from_secs(5),
                );
                let result = orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
                assert_eq!(result.provider, ProviderKind::LocalFallback);
                assert!(!result.text.is_empty());
                let kinds: Vec<ProviderErrorKind> = result
                    .attempts
                    .iter()
                    .filter_map(|a| match &a.outcome {
                        AttemptOutcome::Failed { kind, .. } => Some(*kind),
                        AttemptOutcome::CircuitOpen => None,
                    })
                    .collect();
                assert_eq!(kinds, vec![p.kind(), s.kind()]);
            }
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_skips_failing_provider() {
        let primary = ScriptedBackend::always(Err(ProviderError::Unavailable {
            status: Some(503),
            message: "down".to_string(),
        }));
        let secondary = ScriptedBackend::always(Ok("plain".to_string()));
        let orch = orchestrator(primary.clone(), secondary.clone(), 2, Duration::from_secs(5));

        for _ in 0..2 {
            orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
        }
        assert_eq!(primary.calls(), 2);

        for _ in 0..3 {
            let result = orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
            assert_eq!(result.provider, ProviderKind::Secondary);
            assert_eq!(result.attempts[0].outcome, AttemptOutcome::CircuitOpen);
        }
        assert_eq!(primary.calls(), 2);
        assert_eq!(secondary.calls(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_trial_call_does_not_lock_out_provider() {
        let primary = ScriptedBackend::fail_then_hang(Duration::from_secs(5));
        let secondary = ScriptedBackend::always(Ok("plain".to_string()));
        let gates = gates_with_cooldown(1, 0);
        let orch = SimplificationOrchestrator::new(
            Some(primary.clone() as Arc<dyn SimplificationBackend>),
            Some(secondary as Arc<dyn SimplificationBackend>),
            Arc::clone(&gates),
            local(),
            Duration::from_secs(5),
        );

        // first failure opens the breaker; zero cooldown makes the next call a trial
        let first = orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
        assert_eq!(first.provider, ProviderKind::Secondary);
        assert_eq!(primary.calls(), 1);

        // caller gives up while the trial call is still hanging
        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            orch.simplify_text(CLAUSE, ClauseCategory::Liability),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(primary.calls(), 2);
        assert_eq!(gates.primary.breaker.state(), BreakerState::HalfOpen);

        primary
            .script
            .lock()
            .unwrap()
            .push_back(Ok("Vendor pays for all damages.".to_string()));
        let recovered = orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
        assert_eq!(primary.calls(), 3);
        assert_eq!(recovered.provider, ProviderKind::Primary);
        assert_eq!(gates.primary.breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let primary = ScriptedBackend::slow(Duration::from_millis(500));
        let secondary = ScriptedBackend::always(Ok("fast".to_string()));
        let orch = orchestrator(primary, secondary, 3, Duration::from_millis(30));

        let result = orch.simplify_text(CLAUSE, ClauseCategory::Liability).await;
        assert_eq!(result.provider, ProviderKind::Secondary);
        assert!(matches!(
            result.attempts[0].outcome,
            AttemptOutcome::Failed { kind: ProviderErrorKind::Timeout, .. }
        ));
    }

    #[tokio::test]
    async fn test_local_only_chain() {
        let orch = SimplificationOrchestrator::local_only(local());
        assert_eq!(orch.chain_kinds(), vec![ProviderKind::LocalFallback]);
        let result = orch.simplify_text("Prior to payment", ClauseCategory::Financial).await;
        assert_eq!(result.text, "Before payment");
        assert!(result.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_empty_clause_never_calls_providers() {
        let primary = ScriptedBackend::always(Ok("x".to_string()));
        let secondary = ScriptedBackend::always(Ok("y".to_string()));
        let orch = orchestrator(primary.clone(), secondary, 3, Duration::from_secs(5));
        let result = orch.simplify_text("", ClauseCategory::General).await;
        assert_eq!(result.provider, ProviderKind::LocalFallback);
        assert_eq!(primary.calls(), 0);
    }
}
