// catalog.rs — The invariant catalog.
//
// A catalog maps each domain to its InvariantSet: an optional financial cap,
// forbidden literal command substrings, and forbidden concept phrases. The
// catalog is validated once at load and immutable afterwards; a malformed
// catalog refuses to load instead of defaulting.
//
// Domain identifiers are data, not code: adding a domain is a config change.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, RequestError};

/// Similarity above which an intent is considered to express a forbidden concept.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.65;

const BUILTIN_CATALOG: &str = include_str!("../catalog/builtin.yaml");

/// One domain entry as written in the catalog file.
///
/// ```yaml
/// FINANCE:
///   max_transaction: 5000
///   forbidden_commands: ["rm -rf", "unauthorized_refund"]
///   forbidden_concepts: ["transfer funds to a personal account"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InvariantSetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_transaction: Option<f64>,

    #[serde(default)]
    pub forbidden_commands: Vec<String>,

    /// Order matters only for tie-breaking: the first of equal best scores wins.
    #[serde(default)]
    pub forbidden_concepts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
}

/// The validated invariants for one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantSet {
    domain: String,
    max_transaction: Option<f64>,
    forbidden_commands: Vec<String>,
    forbidden_concepts: Vec<String>,
    similarity_threshold: f32,
}

impl InvariantSet {
    /// The normalized domain identifier.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The financial cap, if this domain has one.
    pub fn max_transaction(&self) -> Option<f64> {
        self.max_transaction
    }

    /// Forbidden command substrings, in catalog order.
    pub fn forbidden_commands(&self) -> &[String] {
        &self.forbidden_commands
    }

    /// Forbidden concept phrases, in catalog order.
    pub fn forbidden_concepts(&self) -> &[String] {
        &self.forbidden_concepts
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// Whether this domain has a semantic layer at all.
    pub fn has_semantic_layer(&self) -> bool {
        !self.forbidden_concepts.is_empty()
    }

    fn validate(domain: String, config: InvariantSetConfig) -> Result<Self, CatalogError> {
        if let Some(limit) = config.max_transaction {
            if !limit.is_finite() || limit < 0.0 {
                return Err(CatalogError::InvalidLimit {
                    domain,
                    value: limit,
                });
            }
        }

        check_entries(&domain, "forbidden_commands", &config.forbidden_commands)?;
        check_entries(&domain, "forbidden_concepts", &config.forbidden_concepts)?;

        let threshold = config
            .similarity_threshold
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        if !threshold.is_finite() || threshold <= -1.0 || threshold > 1.0 {
            return Err(CatalogError::InvalidThreshold {
                domain,
                value: threshold,
            });
        }

        Ok(Self {
            domain,
            max_transaction: config.max_transaction,
            forbidden_commands: config.forbidden_commands,
            forbidden_concepts: config.forbidden_concepts,
            similarity_threshold: threshold,
        })
    }
}

fn check_entries(domain: &str, field: &'static str, entries: &[String]) -> Result<(), CatalogError> {
    match entries.iter().position(|e| e.trim().is_empty()) {
        Some(index) => Err(CatalogError::EmptyEntry {
            domain: domain.to_string(),
            field,
            index,
        }),
        None => Ok(()),
    }
}

/// Normalize a domain identifier: trimmed, upper-case.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_uppercase()
}

/// A validated, read-only set of per-domain invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantCatalog {
    sets: BTreeMap<String, InvariantSet>,
}

impl InvariantCatalog {
    /// Validate raw domain entries into a catalog.
    pub fn from_config(
        entries: impl IntoIterator<Item = (String, InvariantSetConfig)>,
    ) -> Result<Self, CatalogError> {
        let mut sets = BTreeMap::new();
        for (raw_domain, config) in entries {
            let domain = normalize_domain(&raw_domain);
            if domain.is_empty() {
                return Err(CatalogError::BlankDomain);
            }
            if sets.contains_key(&domain) {
                return Err(CatalogError::DuplicateDomain { domain });
            }
            let set = InvariantSet::validate(domain.clone(), config)?;
            sets.insert(domain, set);
        }

        if sets.is_empty() {
            return Err(CatalogError::Empty);
        }

        tracing::debug!(domains = sets.len(), "invariant catalog validated");
        Ok(Self { sets })
    }

    /// Parse a YAML catalog document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let raw: BTreeMap<String, InvariantSetConfig> = serde_yaml::from_str(yaml)?;
        Self::from_config(raw)
    }

    /// Parse a JSON catalog document.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let raw: BTreeMap<String, InvariantSetConfig> = serde_json::from_str(json)?;
        Self::from_config(raw)
    }

    /// Load a catalog from disk. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let catalog = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };

        tracing::info!(
            path = %path.display(),
            domains = catalog.len(),
            "loaded invariant catalog"
        );
        Ok(catalog)
    }

    /// The catalog compiled into the crate (FINANCE, INFRASTRUCTURE, HEALTHCARE).
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    /// Look up a domain's invariants. `None` means the domain is not configured.
    pub fn get(&self, domain: &str) -> Option<&InvariantSet> {
        self.sets.get(&normalize_domain(domain))
    }

    /// Like [`get`](Self::get), but an unknown domain is a request error.
    pub fn resolve(&self, domain: &str) -> Result<&InvariantSet, RequestError> {
        self.get(domain).ok_or_else(|| RequestError::UnknownDomain {
            domain: domain.to_string(),
        })
    }

    /// Iterate over all invariant sets in domain order.
    pub fn iter(&self) -> impl Iterator<Item = &InvariantSet> {
        self.sets.values()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
