// config.rs — CLI configuration from .svp/svp.toml.
//
// Every section is optional; a missing file means all defaults: the
// built-in catalog, the hashing embedder, deny-by-default on provider
// failure, and a 1000-record audit log at .svp/audit.jsonl. Relative paths
// are resolved against the project root.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use svp_audit::{RollingAuditLog, VerdictRecorder, DEFAULT_RETENTION};
use svp_policy::{
    EmbeddingProvider, Gate, GateSettings, HashingEmbedder, InvariantCatalog, OllamaEmbedder,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SvpConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub audit_log: AuditLogConfig,

    #[serde(default)]
    pub gate: GateSettings,
}

/// Where the invariant catalog comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// YAML or JSON catalog file. Absent = built-in catalog.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Offline feature-hashing embedder.
    #[default]
    Hashing,
    /// Ollama server's /api/embeddings endpoint.
    Ollama,
}

/// Embedding provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Vector size for the hashing embedder.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Per-request timeout for remote providers. Covers index build at
    /// startup as well as audits, so it sits well above the semantic
    /// latency budget in `[gate]`, which only warns.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            dimension: default_dimension(),
            url: default_ollama_url(),
            model: default_ollama_model(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Verdict log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log file. Absent = `.svp/audit.jsonl` under the project root.
    pub path: Option<PathBuf>,

    /// Records kept before the oldest is evicted.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            retention: default_retention(),
        }
    }
}

// Serde default functions
fn default_dimension() -> usize {
    HashingEmbedder::DEFAULT_DIMENSION
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

impl SvpConfig {
    /// Default config file location for a project.
    pub fn default_path(project_root: &Path) -> PathBuf {
        project_root.join(".svp").join("svp.toml")
    }

    /// Parse a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given, else the project's default file if it exists,
    /// else defaults.
    pub fn load_for_project(project_root: &Path, path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Self::default_path(project_root);
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn audit_log_path(&self, project_root: &Path) -> PathBuf {
        match &self.audit_log.path {
            Some(path) => resolve(project_root, path),
            None => project_root.join(".svp").join("audit.jsonl"),
        }
    }

    pub fn catalog_path(&self, project_root: &Path) -> Option<PathBuf> {
        self.catalog.path.as_ref().map(|p| resolve(project_root, p))
    }

    pub fn load_catalog(&self, project_root: &Path) -> anyhow::Result<InvariantCatalog> {
        match self.catalog_path(project_root) {
            Some(path) => InvariantCatalog::load(&path)
                .with_context(|| format!("refusing to start with catalog {}", path.display())),
            None => InvariantCatalog::builtin().context("built-in catalog is invalid"),
        }
    }

    pub fn build_provider(&self) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match self.embedding.provider {
            ProviderKind::Hashing => Arc::new(HashingEmbedder::new(self.embedding.dimension)),
            ProviderKind::Ollama => Arc::new(
                OllamaEmbedder::new(
                    &self.embedding.url,
                    self.embedding.model.clone(),
                    Duration::from_millis(self.embedding.timeout_ms),
                )
                .context("failed to create Ollama embedding client")?,
            ),
        };
        Ok(provider)
    }

    /// Load the catalog, build the concept index, and return the gate.
    pub fn open_gate(&self, project_root: &Path) -> anyhow::Result<Gate> {
        let catalog = self.load_catalog(project_root)?;
        let provider = self.build_provider()?;
        Ok(Gate::new(catalog, provider, self.gate.clone()))
    }

    /// Start the verdict recorder, if the audit log is enabled.
    pub fn open_recorder(&self, project_root: &Path) -> anyhow::Result<Option<VerdictRecorder>> {
        if !self.audit_log.enabled {
            return Ok(None);
        }
        let path = self.audit_log_path(project_root);
        let log = RollingAuditLog::open(&path, self.audit_log.retention)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;
        Ok(Some(VerdictRecorder::spawn(log)?))
    }

    /// The recorder for an audit run. A log that cannot be opened is
    /// reported and skipped: persistence never decides an audit.
    pub fn recorder_for_audit(&self, project_root: &Path) -> Option<VerdictRecorder> {
        match self.open_recorder(project_root) {
            Ok(recorder) => recorder,
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(%error, "audit log unavailable; verdicts will not be recorded");
                None
            }
        }
    }
}

fn resolve(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use svp_policy::{ConceptIndex, DomainIndex, ProviderFailurePolicy};

    /// Answer every `/api/embeddings` call with [0.1, 0.2, 0.3] after `delay`.
    fn slow_embedding_server(delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                read_request(&mut stream);
                std::thread::sleep(delay);
                let body = r#"{"embedding":[0.1,0.2,0.3]}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    fn read_request(stream: &mut TcpStream) {
        let mut reader = BufReader::new(stream);
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            if line == "\r\n" {
                break;
            }
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        let mut body = vec![0; content_length];
        let _ = reader.read_exact(&mut body);
    }

    #[test]
    fn empty_file_means_defaults() {
        let config: SvpConfig = toml::from_str("").unwrap();
        assert!(config.catalog.path.is_none());
        assert_eq!(config.embedding.provider, ProviderKind::Hashing);
        assert_eq!(config.embedding.dimension, 256);
        assert!(config.audit_log.enabled);
        assert_eq!(config.audit_log.retention, 1000);
        assert_eq!(config.embedding.timeout_ms, 2000);
        assert_eq!(config.gate.on_provider_failure, ProviderFailurePolicy::Deny);
    }

    #[test]
    fn parses_all_sections() {
        let config: SvpConfig = toml::from_str(
            r#"
[catalog]
path = "policy/invariants.yaml"

[embedding]
provider = "ollama"
model = "mxbai-embed-large"
timeout_ms = 50

[audit_log]
path = "/var/log/svp.jsonl"
retention = 50

[gate]
on_provider_failure = "error"
semantic_latency_budget_ms = 15
"#,
        )
        .unwrap();

        let root = Path::new("/srv/agent");
        assert_eq!(
            config.catalog_path(root),
            Some(PathBuf::from("/srv/agent/policy/invariants.yaml"))
        );
        assert_eq!(config.embedding.provider, ProviderKind::Ollama);
        assert_eq!(config.embedding.url, "http://localhost:11434");
        assert_eq!(config.embedding.timeout_ms, 50);
        assert_eq!(config.audit_log_path(root), PathBuf::from("/var/log/svp.jsonl"));
        assert_eq!(config.audit_log.retention, 50);
        assert_eq!(config.gate.on_provider_failure, ProviderFailurePolicy::Error);
        assert_eq!(config.gate.semantic_latency_budget_ms, 15);
    }

    #[test]
    fn default_audit_log_lives_under_dot_svp() {
        let config = SvpConfig::default();
        assert_eq!(
            config.audit_log_path(Path::new("/p")),
            PathBuf::from("/p/.svp/audit.jsonl")
        );
    }

    #[test]
    fn load_for_project_reads_default_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".svp")).unwrap();
        std::fs::write(
            SvpConfig::default_path(dir.path()),
            "[audit_log]\nenabled = false\n",
        )
        .unwrap();

        let config = SvpConfig::load_for_project(dir.path(), None).unwrap();
        assert!(!config.audit_log.enabled);
        assert!(config.open_recorder(dir.path()).unwrap().is_none());
    }

    #[test]
    fn unopenable_audit_log_is_skipped_for_audits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blocker"), "not a directory").unwrap();
        let config = SvpConfig {
            audit_log: AuditLogConfig {
                path: Some(PathBuf::from("blocker/audit.jsonl")),
                ..AuditLogConfig::default()
            },
            ..SvpConfig::default()
        };

        assert!(config.open_recorder(dir.path()).is_err());
        assert!(config.recorder_for_audit(dir.path()).is_none());
    }

    #[test]
    fn default_ollama_timeout_tolerates_slow_embeddings() {
        let config = SvpConfig {
            embedding: EmbeddingConfig {
                provider: ProviderKind::Ollama,
                url: slow_embedding_server(Duration::from_millis(60)),
                ..EmbeddingConfig::default()
            },
            ..SvpConfig::default()
        };
        let catalog = InvariantCatalog::from_yaml_str(
            "FINANCE:\n  forbidden_concepts: [\"bypass payment authorization\"]\n",
        )
        .unwrap();
        let provider = config.build_provider().unwrap();

        let index = ConceptIndex::build(&catalog, provider.as_ref());
        assert!(matches!(
            index.state("FINANCE"),
            Some(DomainIndex::Ready { dimension: 3, .. })
        ));

        let gate = Gate::new(catalog, provider, config.gate.clone());
        let verdict = gate
            .audit_intent("Pay AWS hosting invoice", 250.0, None, "FINANCE")
            .unwrap();
        assert!(!verdict.degraded);
    }

    #[test]
    fn invalid_catalog_refuses_to_open_gate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "FINANCE:\n  max_transaction: -5\n").unwrap();
        let config = SvpConfig {
            catalog: CatalogConfig {
                path: Some(PathBuf::from("bad.yaml")),
            },
            ..SvpConfig::default()
        };
        assert!(config.open_gate(dir.path()).is_err());
    }

    #[test]
    fn unknown_failure_policy_is_rejected() {
        let result: Result<SvpConfig, _> = toml::from_str("[gate]\non_provider_failure = \"allow\"\n");
        assert!(result.is_err());
    }
}
