//! # svp-policy
//!
//! Pre-execution policy gate for autonomous agents.
//!
//! Before an agent-proposed action runs, the [`AuditEngine`] evaluates the
//! agent's stated intent (plus an optional amount and literal command)
//! against the per-domain [`InvariantSet`]s of an [`InvariantCatalog`] and
//! returns a [`Verdict`]: VERIFIED or BLOCKED, with a reason and trace id.
//!
//! ## Evaluation order
//!
//! 1. **Financial limit**: `amount > max_transaction` → BLOCKED.
//! 2. **Literal safety**: a forbidden command substring appears in the
//!    command or the intent → BLOCKED.
//! 3. **Semantic similarity**: the intent's embedding is closer than the
//!    domain threshold to a forbidden concept → BLOCKED.
//! 4. Otherwise VERIFIED.
//!
//! The first layer that fires wins; later layers are not evaluated.
//!
//! ## Key invariants
//!
//! - **Malformed is not blocked**: an empty intent or unknown domain is a
//!   [`RequestError`], never a BLOCKED verdict.
//! - **No fail-open**: an embedding provider failure never yields VERIFIED.
//!   It is either a degraded BLOCKED verdict or a
//!   [`GateError::ProviderUnavailable`], per [`ProviderFailurePolicy`].
//! - **Read-only state**: the catalog and concept index are immutable once
//!   built; [`Gate::reload`] publishes a fully built replacement.

pub mod catalog;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod gate;
pub mod index;

pub use catalog::{
    normalize_domain, InvariantCatalog, InvariantSet, InvariantSetConfig,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use embedding::{
    cosine_similarity, EmbeddingProvider, ExternalEmbedder, HashingEmbedder, OllamaEmbedder,
};
pub use engine::{
    AuditEngine, AuditRequest, AuditTrace, EvaluationStep, GateSettings, Layer,
    ProviderFailurePolicy, Verdict, VerdictStatus,
};
pub use error::{CatalogError, EmbeddingError, GateError, RequestError};
pub use gate::Gate;
pub use index::{ConceptIndex, ConceptVector, DomainIndex};
