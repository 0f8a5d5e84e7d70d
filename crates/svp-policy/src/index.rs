// index.rs — Concept vector index.
//
// Every forbidden concept phrase in the catalog is encoded once, up front,
// and stored order-aligned with the catalog's phrase list so a best-match
// position maps straight back to its phrase. Audits never re-encode phrases.
//
// A domain's entry is either fully built or marked unavailable; a partially
// encoded phrase list is never published.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{InvariantCatalog, InvariantSet};
use crate::embedding::EmbeddingProvider;
use crate::error::EmbeddingError;

/// One forbidden concept phrase and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptVector {
    pub phrase: String,
    pub vector: Vec<f32>,
}

/// The semantic-layer state of one domain.
#[derive(Debug, Clone)]
pub enum DomainIndex {
    /// All phrases encoded, in catalog order, with a shared dimension.
    Ready {
        dimension: usize,
        concepts: Arc<[ConceptVector]>,
    },
    /// Encoding failed; the domain's semantic layer cannot run.
    Unavailable { reason: String },
}

/// Precomputed concept vectors, keyed by normalized domain.
///
/// Domains without forbidden concepts have no entry.
#[derive(Debug, Clone, Default)]
pub struct ConceptIndex {
    domains: HashMap<String, DomainIndex>,
}

impl ConceptIndex {
    /// Encode every forbidden concept in the catalog.
    pub fn build(catalog: &InvariantCatalog, provider: &dyn EmbeddingProvider) -> Self {
        let mut domains = HashMap::new();

        for set in catalog.iter().filter(|s| s.has_semantic_layer()) {
            let entry = match encode_domain(set, provider) {
                Ok((dimension, concepts)) => {
                    tracing::info!(
                        domain = set.domain(),
                        concepts = concepts.len(),
                        dimension,
                        provider = provider.name(),
                        "concept index built"
                    );
                    DomainIndex::Ready {
                        dimension,
                        concepts: concepts.into(),
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        domain = set.domain(),
                        error = %e,
                        "concept index unavailable; semantic layer will run degraded"
                    );
                    DomainIndex::Unavailable {
                        reason: e.to_string(),
                    }
                }
            };
            domains.insert(set.domain().to_string(), entry);
        }

        Self { domains }
    }

    /// The semantic-layer state for a domain, if it declares concepts.
    pub fn state(&self, domain: &str) -> Option<&DomainIndex> {
        self.domains.get(domain)
    }

    /// The ordered (phrase, vector) pairs for a domain, when fully built.
    pub fn vectors_for(&self, domain: &str) -> Option<&[ConceptVector]> {
        match self.domains.get(domain)? {
            DomainIndex::Ready { concepts, .. } => Some(&concepts[..]),
            DomainIndex::Unavailable { .. } => None,
        }
    }
}

fn encode_domain(
    set: &InvariantSet,
    provider: &dyn EmbeddingProvider,
) -> Result<(usize, Vec<ConceptVector>), EmbeddingError> {
    let mut dimension = None;
    let mut concepts = Vec::with_capacity(set.forbidden_concepts().len());

    for phrase in set.forbidden_concepts() {
        let vector = provider.encode(phrase)?;
        if vector.is_empty() {
            return Err(EmbeddingError::EmptyVector);
        }
        let expected = *dimension.get_or_insert(vector.len());
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        concepts.push(ConceptVector {
            phrase: phrase.clone(),
            vector,
        });
    }

    Ok((dimension.unwrap_or(0), concepts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{ExternalEmbedder, HashingEmbedder};

    fn catalog() -> InvariantCatalog {
        InvariantCatalog::from_yaml_str(
            "OPS:\n  forbidden_concepts: [\"wipe all system logs\", \"disable monitoring\"]\nFINANCE:\n  max_transaction: 10\n",
        )
        .unwrap()
    }

    #[test]
    fn build_is_order_aligned_with_catalog() {
        let index = ConceptIndex::build(&catalog(), &HashingEmbedder::new(32));
        let vectors = index.vectors_for("OPS").unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].phrase, "wipe all system logs");
        assert_eq!(vectors[1].phrase, "disable monitoring");
        assert!(vectors.iter().all(|c| c.vector.len() == 32));
    }

    #[test]
    fn domains_without_concepts_have_no_entry() {
        let index = ConceptIndex::build(&catalog(), &HashingEmbedder::new(32));
        assert!(index.state("FINANCE").is_none());
        assert!(index.vectors_for("FINANCE").is_none());
    }

    #[test]
    fn provider_failure_marks_domain_unavailable() {
        let provider = ExternalEmbedder::new(|text| {
            if text.contains("monitoring") {
                Err(EmbeddingError::Transport("model not loaded".into()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        });
        let index = ConceptIndex::build(&catalog(), &provider);

        // The first phrase encoded fine, but nothing partial is published.
        assert!(index.vectors_for("OPS").is_none());
        match index.state("OPS") {
            Some(DomainIndex::Unavailable { reason }) => assert!(reason.contains("model not loaded")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[test]
    fn inconsistent_dimensions_mark_domain_unavailable() {
        let provider = ExternalEmbedder::new(|text| Ok(vec![1.0; text.len() % 3 + 1]));
        let index = ConceptIndex::build(&catalog(), &provider);
        assert!(matches!(
            index.state("OPS"),
            Some(DomainIndex::Unavailable { .. })
        ));
    }

    #[test]
    fn empty_vectors_mark_domain_unavailable() {
        let provider = ExternalEmbedder::new(|_| Ok(Vec::new()));
        let index = ConceptIndex::build(&catalog(), &provider);
        match index.state("OPS") {
            Some(DomainIndex::Unavailable { reason }) => assert!(reason.contains("empty vector")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }
}
