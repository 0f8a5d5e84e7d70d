// engine.rs — The audit engine.
//
// Every agent-proposed action passes through `audit()`, which checks, in
// order:
//
// 1. Is the request well-formed (intent present, domain known)? → No → RequestError
// 2. Does the amount exceed the domain's max_transaction? → Yes → BLOCKED
// 3. Does the command or intent contain a forbidden literal? → Yes → BLOCKED
// 4. Is the intent semantically close to a forbidden concept? → Yes → BLOCKED
// 5. Otherwise → VERIFIED
//
// The first layer that fires short-circuits the rest: the deterministic
// layers always take precedence over the fuzzy one. If the semantic layer
// cannot run, the result is never VERIFIED (see ProviderFailurePolicy).

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{InvariantCatalog, InvariantSet};
use crate::embedding::EmbeddingProvider;
use crate::error::{EmbeddingError, GateError, RequestError};
use crate::index::{ConceptIndex, ConceptVector, DomainIndex};

/// An agent-proposed action submitted for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRequest {
    /// Natural-language description of the action.
    pub intent: String,
    /// Monetary amount, in whatever single unit the caller uses.
    #[serde(default)]
    pub amount: f64,
    /// Literal command the agent intends to run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Which invariant set applies (e.g., "FINANCE").
    pub domain: String,
}

impl AuditRequest {
    pub fn new(intent: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            amount: 0.0,
            command: None,
            domain: domain.into(),
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    fn validate(&self) -> Result<(), RequestError> {
        if self.intent.trim().is_empty() {
            return Err(RequestError::EmptyIntent);
        }
        if !self.amount.is_finite() {
            return Err(RequestError::InvalidAmount {
                amount: self.amount,
            });
        }
        Ok(())
    }
}

/// The outcome of an audit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Verified,
    Blocked,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictStatus::Verified => write!(f, "VERIFIED"),
            VerdictStatus::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Which invariant layer produced a BLOCKED verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    FinancialLimit,
    LiteralSafety,
    SemanticSimilarity,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::FinancialLimit => "financial_limit",
            Layer::LiteralSafety => "literal_safety",
            Layer::SemanticSimilarity => "semantic_similarity",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The serializable result of one audit.
///
/// `reason` is present iff BLOCKED. `score` and `matched_concept` are
/// present iff BLOCKED by a semantic match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub status: VerdictStatus,
    /// Unique per audit, for correlation with external logs.
    pub trace_id: String,
    /// When the request was processed (UTC).
    pub timestamp: DateTime<Utc>,
    /// The normalized domain the request was evaluated against.
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_concept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    /// BLOCKED because the semantic layer could not run, not because it matched.
    #[serde(default, skip_serializing_if = "is_false")]
    pub degraded: bool,
}

impl Verdict {
    fn new(status: VerdictStatus, domain: &str) -> Self {
        Self {
            status,
            trace_id: format!("svp-{}", Uuid::new_v4()),
            timestamp: Utc::now(),
            domain: domain.to_string(),
            reason: None,
            score: None,
            matched_concept: None,
            layer: None,
            degraded: false,
        }
    }

    fn verified(domain: &str) -> Self {
        Self::new(VerdictStatus::Verified, domain)
    }

    fn blocked(domain: &str, layer: Layer, reason: String) -> Self {
        let mut verdict = Self::new(VerdictStatus::Blocked, domain);
        verdict.layer = Some(layer);
        verdict.reason = Some(reason);
        verdict
    }

    pub fn is_blocked(&self) -> bool {
        self.status == VerdictStatus::Blocked
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerdictStatus::Verified
    }
}

/// A step in the evaluation chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationStep {
    /// Which check was performed (e.g., "financial_limit").
    pub check: String,
    /// The outcome (e.g., "passed", "skipped: no max_transaction").
    pub outcome: String,
    /// Whether this step decided the verdict.
    pub terminal: bool,
}

impl EvaluationStep {
    fn new(check: Layer, outcome: impl Into<String>, terminal: bool) -> Self {
        Self {
            check: check.as_str().to_string(),
            outcome: outcome.into(),
            terminal,
        }
    }
}

/// A verdict plus the ordered steps that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrace {
    pub verdict: Verdict,
    pub steps: Vec<EvaluationStep>,
}

/// What to do when the semantic layer cannot run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailurePolicy {
    /// Return a BLOCKED verdict marked `degraded`.
    #[default]
    Deny,
    /// Return `GateError::ProviderUnavailable` and let the caller decide.
    Error,
}

impl fmt::Display for ProviderFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFailurePolicy::Deny => write!(f, "deny"),
            ProviderFailurePolicy::Error => write!(f, "error"),
        }
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateSettings {
    #[serde(default)]
    pub on_provider_failure: ProviderFailurePolicy,

    /// Semantic-layer encode calls slower than this are logged.
    #[serde(default = "default_latency_budget_ms")]
    pub semantic_latency_budget_ms: u64,
}

fn default_latency_budget_ms() -> u64 {
    20
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            on_provider_failure: ProviderFailurePolicy::default(),
            semantic_latency_budget_ms: default_latency_budget_ms(),
        }
    }
}

/// The audit engine: a catalog, its concept index, and an embedding provider.
///
/// All state is read-only; one engine serves any number of concurrent callers.
pub struct AuditEngine {
    catalog: Arc<InvariantCatalog>,
    index: Arc<ConceptIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    settings: GateSettings,
}

impl AuditEngine {
    /// Build an engine, encoding the catalog's concepts with `provider`.
    pub fn new(
        catalog: InvariantCatalog,
        provider: Arc<dyn EmbeddingProvider>,
        settings: GateSettings,
    ) -> Self {
        let index = ConceptIndex::build(&catalog, provider.as_ref());
        Self::with_index(catalog, index, provider, settings)
    }

    /// Build an engine around an already-built concept index.
    fn with_index(
        catalog: InvariantCatalog,
        index: ConceptIndex,
        provider: Arc<dyn EmbeddingProvider>,
        settings: GateSettings,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            index: Arc::new(index),
            provider,
            settings,
        }
    }

    pub fn catalog(&self) -> &InvariantCatalog {
        &self.catalog
    }

    pub fn index(&self) -> &ConceptIndex {
        &self.index
    }

    /// Audit a request and return its verdict.
    pub fn audit(&self, request: &AuditRequest) -> Result<Verdict, GateError> {
        self.audit_with_trace(request).map(|trace| trace.verdict)
    }

    /// Positional convenience form of [`audit`](Self::audit).
    pub fn audit_intent(
        &self,
        intent: &str,
        amount: f64,
        command: Option<&str>,
        domain: &str,
    ) -> Result<Verdict, GateError> {
        let mut request = AuditRequest::new(intent, domain).with_amount(amount);
        request.command = command.map(str::to_string);
        self.audit(&request)
    }

    /// Audit a request and return the verdict with the full evaluation trail.
    pub fn audit_with_trace(&self, request: &AuditRequest) -> Result<AuditTrace, GateError> {
        request.validate()?;
        let set = self.catalog.resolve(&request.domain)?;
        let domain = set.domain();
        let mut steps = Vec::with_capacity(3);

        // Layer 1: financial limit.
        match set.max_transaction() {
            Some(limit) if request.amount > limit => {
                let reason = format!(
                    "Amount {} exceeds the {} max_transaction invariant of {}",
                    request.amount, domain, limit
                );
                steps.push(EvaluationStep::new(
                    Layer::FinancialLimit,
                    format!("failed: {} > {}", request.amount, limit),
                    true,
                ));
                return Ok(self.finish(
                    Verdict::blocked(domain, Layer::FinancialLimit, reason),
                    steps,
                ));
            }
            Some(limit) => steps.push(EvaluationStep::new(
                Layer::FinancialLimit,
                format!("passed: {} <= {}", request.amount, limit),
                false,
            )),
            None => steps.push(EvaluationStep::new(
                Layer::FinancialLimit,
                "skipped: no max_transaction",
                false,
            )),
        }

        // Layer 2: literal safety, over both the command and the intent.
        if let Some((forbidden, field)) = find_forbidden_literal(set, request) {
            let reason = format!(
                "Security violation: forbidden command '{}' found in {}",
                forbidden, field
            );
            steps.push(EvaluationStep::new(
                Layer::LiteralSafety,
                format!("failed: '{}' in {}", forbidden, field),
                true,
            ));
            return Ok(self.finish(
                Verdict::blocked(domain, Layer::LiteralSafety, reason),
                steps,
            ));
        }
        steps.push(EvaluationStep::new(
            Layer::LiteralSafety,
            format!("passed: {} forbidden commands checked", set.forbidden_commands().len()),
            false,
        ));

        // Layer 3: semantic similarity.
        if let Some(verdict) = self.check_semantic(set, &request.intent, &mut steps)? {
            return Ok(self.finish(verdict, steps));
        }

        Ok(self.finish(Verdict::verified(domain), steps))
    }

    fn check_semantic(
        &self,
        set: &InvariantSet,
        intent: &str,
        steps: &mut Vec<EvaluationStep>,
    ) -> Result<Option<Verdict>, GateError> {
        let domain = set.domain();
        let (dimension, concepts) = match self.index.state(domain) {
            Some(DomainIndex::Ready {
                dimension,
                concepts,
            }) if !concepts.is_empty() => (*dimension, concepts),
            Some(DomainIndex::Unavailable { reason }) => {
                let error = EmbeddingError::IndexUnavailable(reason.clone());
                return self.provider_failure(domain, error, steps).map(Some);
            }
            _ => {
                steps.push(EvaluationStep::new(
                    Layer::SemanticSimilarity,
                    "skipped: no forbidden concepts",
                    false,
                ));
                return Ok(None);
            }
        };

        let started = Instant::now();
        let encoded = self.provider.encode(intent);
        let elapsed = started.elapsed();
        if elapsed > Duration::from_millis(self.settings.semantic_latency_budget_ms) {
            tracing::warn!(
                domain,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.settings.semantic_latency_budget_ms,
                "semantic layer exceeded latency budget"
            );
        }

        let vector = match encoded {
            Ok(v) if v.len() == dimension => v,
            Ok(v) => {
                let error = EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: v.len(),
                };
                return self.provider_failure(domain, error, steps).map(Some);
            }
            Err(error) => return self.provider_failure(domain, error, steps).map(Some),
        };

        let Some((best, score)) = best_match(self.provider.as_ref(), &vector, concepts) else {
            let error = EmbeddingError::Malformed("similarity is not a number".to_string());
            return self.provider_failure(domain, error, steps).map(Some);
        };

        let threshold = set.similarity_threshold();
        if score > threshold {
            let phrase = &concepts[best].phrase;
            steps.push(EvaluationStep::new(
                Layer::SemanticSimilarity,
                format!("failed: {:.2} > {:.2} for '{}'", score, threshold, phrase),
                true,
            ));
            let reason = format!(
                "Intent matches forbidden concept '{}' (similarity {:.2})",
                phrase, score
            );
            let mut verdict = Verdict::blocked(domain, Layer::SemanticSimilarity, reason);
            verdict.score = Some(f64::from(score));
            verdict.matched_concept = Some(phrase.clone());
            return Ok(Some(verdict));
        }

        steps.push(EvaluationStep::new(
            Layer::SemanticSimilarity,
            format!("passed: max {:.2} <= {:.2}", score, threshold),
            false,
        ));
        Ok(None)
    }

    fn provider_failure(
        &self,
        domain: &str,
        error: EmbeddingError,
        steps: &mut Vec<EvaluationStep>,
    ) -> Result<Verdict, GateError> {
        tracing::warn!(
            domain,
            error = %error,
            policy = %self.settings.on_provider_failure,
            "semantic layer unavailable"
        );
        steps.push(EvaluationStep::new(
            Layer::SemanticSimilarity,
            format!("unavailable: {}", error),
            true,
        ));

        match self.settings.on_provider_failure {
            ProviderFailurePolicy::Deny => {
                let mut verdict = Verdict::blocked(
                    domain,
                    Layer::SemanticSimilarity,
                    format!("semantic layer unavailable: {}", error),
                );
                verdict.degraded = true;
                Ok(verdict)
            }
            ProviderFailurePolicy::Error => Err(GateError::ProviderUnavailable {
                domain: domain.to_string(),
                source: error,
            }),
        }
    }

    fn finish(&self, verdict: Verdict, steps: Vec<EvaluationStep>) -> AuditTrace {
        match verdict.layer {
            Some(layer) => tracing::info!(
                trace_id = %verdict.trace_id,
                domain = %verdict.domain,
                layer = %layer,
                score = verdict.score,
                "audit BLOCKED"
            ),
            None => tracing::debug!(
                trace_id = %verdict.trace_id,
                domain = %verdict.domain,
                "audit VERIFIED"
            ),
        }
        AuditTrace { verdict, steps }
    }
}

/// First forbidden literal (in catalog order) found in the command or the
/// intent. For a given literal the command field is reported first.
fn find_forbidden_literal<'a>(
    set: &'a InvariantSet,
    request: &AuditRequest,
) -> Option<(&'a str, &'static str)> {
    let command = request.command.as_deref().unwrap_or("");
    set.forbidden_commands().iter().find_map(|forbidden| {
        if command.contains(forbidden.as_str()) {
            Some((forbidden.as_str(), "command"))
        } else if request.intent.contains(forbidden.as_str()) {
            Some((forbidden.as_str(), "intent"))
        } else {
            None
        }
    })
}

/// Position and score of the best-matching concept. Ties go to the earliest
/// concept; NaN scores never win. `None` if every score is NaN.
fn best_match(
    provider: &dyn EmbeddingProvider,
    vector: &[f32],
    concepts: &[ConceptVector],
) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, concept) in concepts.iter().enumerate() {
        let score = provider.similarity(vector, &concept.vector);
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((i, score)),
        }
    }
    best
}
