// gate.rs — The process-wide gate context.
//
// A Gate owns the current AuditEngine behind an `RwLock<Arc<_>>`. Audits
// clone the Arc and release the lock immediately, so they run lock-free
// against an immutable snapshot. `reload()` builds the replacement engine
// (including its concept index) before taking the write lock, then swaps
// the pointer: an audit sees either the old catalog and index or the new
// ones, never a mix.

use std::sync::{Arc, PoisonError, RwLock};

use crate::catalog::InvariantCatalog;
use crate::embedding::EmbeddingProvider;
use crate::engine::{AuditEngine, AuditRequest, AuditTrace, GateSettings, Verdict};
use crate::error::GateError;

/// Shared, reloadable entry point to the audit engine.
pub struct Gate {
    provider: Arc<dyn EmbeddingProvider>,
    settings: GateSettings,
    current: RwLock<Arc<AuditEngine>>,
}

impl Gate {
    /// Build the gate, encoding the catalog's concepts once.
    pub fn new(
        catalog: InvariantCatalog,
        provider: Arc<dyn EmbeddingProvider>,
        settings: GateSettings,
    ) -> Self {
        let engine = AuditEngine::new(catalog, Arc::clone(&provider), settings.clone());
        Self {
            provider,
            settings,
            current: RwLock::new(Arc::new(engine)),
        }
    }

    /// The engine currently in effect.
    pub fn engine(&self) -> Arc<AuditEngine> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn audit(&self, request: &AuditRequest) -> Result<Verdict, GateError> {
        self.engine().audit(request)
    }

    pub fn audit_with_trace(&self, request: &AuditRequest) -> Result<AuditTrace, GateError> {
        self.engine().audit_with_trace(request)
    }

    /// `audit_intent(intent, amount, command, domain)`.
    pub fn audit_intent(
        &self,
        intent: &str,
        amount: f64,
        command: Option<&str>,
        domain: &str,
    ) -> Result<Verdict, GateError> {
        self.engine().audit_intent(intent, amount, command, domain)
    }

    /// Replace the catalog. The new concept index is fully built before it
    /// is published.
    pub fn reload(&self, catalog: InvariantCatalog) {
        let domains = catalog.len();
        let engine = Arc::new(AuditEngine::new(
            catalog,
            Arc::clone(&self.provider),
            self.settings.clone(),
        ));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = engine;
        tracing::info!(domains, "invariant catalog reloaded");
    }
}
