//! Configuration management for Planes.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (`.planes/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Later sources override earlier ones. Workspace state lives under `.planes/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the generation factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "openai"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .planes/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active generation provider ("ollama", "openai")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// Explicit API key (PLANES_API_KEY)
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Emit JSON log lines
    pub log_json: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Generation provider table
    pub llm: LlmConfig,

    /// Query embedding settings
    pub embedding: EmbeddingConfig,

    /// Passage store location
    pub store: StoreConfig,

    /// Party catalog source
    pub catalog: CatalogConfig,

    /// Passage counts per retrieval strategy
    pub retrieval: RetrievalConfig,

    /// Per-call time budgets
    pub timeouts: TimeoutConfig,

    /// Sampling parameters for answer generation
    pub generation: GenerationConfig,

    /// Retry and circuit breaking around generation calls
    pub resilience: ResilienceConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "ollama".to_string(),
            ProviderConfig::Ollama {
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.2".to_string(),
            },
        );

        Self {
            active_provider: "ollama".to_string(),
            providers,
        }
    }
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
    },
}

impl ProviderConfig {
    /// Model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { model, .. } => model,
            ProviderConfig::Ollama { model, .. } => model,
        }
    }

    /// Endpoint override, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    /// Provider name ("ollama", "mock")
    pub provider: String,

    /// Embedding model identifier
    pub model: String,

    /// Vector dimension produced by the model
    pub dimensions: usize,

    /// Ollama endpoint used by the "ollama" provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: None,
        }
    }
}

/// Passage store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// LanceDB directory; relative paths resolve against the workspace
    pub path: PathBuf,

    /// Table holding passages
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".planes/store"),
            table: "passages".to_string(),
        }
    }
}

/// Party catalog settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    /// YAML catalog file; the bundled catalog is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Passage counts used by the retrieval strategy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    /// Topic question about named parties
    pub specific_party_limit: usize,

    /// Broad summary of named parties' plans
    pub general_plan_limit: usize,

    /// Per-party cap in the balanced comparison strategy
    pub comparison_per_party: usize,

    /// Total cap in the balanced comparison strategy
    pub comparison_max_total: usize,

    /// Unfiltered and fallback searches
    pub default_limit: usize,

    /// Optional per-passage character cap when building the context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_truncate_chars: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            specific_party_limit: 5,
            general_plan_limit: 15,
            comparison_per_party: 2,
            comparison_max_total: 10,
            default_limit: 5,
            context_truncate_chars: None,
        }
    }
}

/// Independent timeouts for each external call, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutConfig {
    pub classify_secs: u64,
    pub extract_secs: u64,
    pub search_secs: u64,
    pub generate_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            classify_secs: 15,
            extract_secs: 15,
            search_secs: 10,
            generate_secs: 60,
        }
    }
}

/// Sampling parameters for the answer generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

/// Retry with exponential backoff on rate limits, and a circuit breaker
/// over every generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceConfig {
    /// Attempts per call, first one included
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_base: f64,
    pub breaker_enabled: bool,
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call
    pub recovery_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_base: 2.0,
            breaker_enabled: true,
            failure_threshold: 5,
            recovery_secs: 60,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    embedding: Option<EmbeddingConfig>,
    store: Option<StoreConfig>,
    catalog: Option<CatalogConfig>,
    retrieval: Option<RetrievalConfig>,
    timeouts: Option<TimeoutConfig>,
    generation: Option<GenerationConfig>,
    resilience: Option<ResilienceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            log_json: false,
            verbose: false,
            no_color: false,
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            catalog: CatalogConfig::default(),
            retrieval: RetrievalConfig::default(),
            timeouts: TimeoutConfig::default(),
            generation: GenerationConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `PLANES_WORKSPACE`: Override workspace path
    /// - `PLANES_CONFIG`: Path to config file
    /// - `PLANES_PROVIDER`: Generation provider
    /// - `PLANES_MODEL`: Generation model
    /// - `PLANES_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use planes_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], with an explicit workspace and config file
    /// taking precedence over `PLANES_WORKSPACE` and `PLANES_CONFIG`.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        let env_path = |name: &str| std::env::var(name).ok().map(PathBuf::from);

        if let Some(workspace) = workspace.or_else(|| env_path("PLANES_WORKSPACE")) {
            config.workspace = workspace;
        }

        config.config_file = config_file.or_else(|| env_path("PLANES_CONFIG"));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.planes_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("PLANES_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("PLANES_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("PLANES_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents).map_err(|e| match e {
            AppError::Serialization(msg) => {
                AppError::Config(format!("Failed to parse config file {:?}: {}", path, msg))
            }
            other => other,
        })
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();
            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }
            result.llm = llm;
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(store) = config_file.store {
            result.store = store;
        }
        if let Some(catalog) = config_file.catalog {
            result.catalog = catalog;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(timeouts) = config_file.timeouts {
            result.timeouts = timeouts;
        }
        if let Some(generation) = config_file.generation {
            result.generation = generation;
        }
        if let Some(resilience) = config_file.resilience {
            result.resilience = resilience;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .planes directory.
    pub fn planes_dir(&self) -> PathBuf {
        self.workspace.join(".planes")
    }

    /// Ensure the .planes directory exists.
    pub fn ensure_planes_dir(&self) -> AppResult<()> {
        let planes_dir = self.planes_dir();
        if !planes_dir.exists() {
            std::fs::create_dir_all(&planes_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .planes directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Absolute path of the passage store.
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            self.workspace.join(&self.store.path)
        }
    }

    /// Absolute path of a custom catalog file, if configured.
    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.workspace.join(p)
            }
        })
    }

    /// Get the configuration of a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.providers.get(provider)
    }

    /// Endpoint for the active provider, if configured.
    pub fn resolve_endpoint(&self) -> Option<&str> {
        self.get_provider_config(&self.provider)
            .and_then(|pc| pc.endpoint())
    }

    /// Resolve the API key for a provider.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAI { api_key_env, .. }) => std::env::var(api_key_env).ok(),
            _ => None,
        }
    }

    /// Validate configuration for the active provider and the pipeline settings.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.as_str();

        if !KNOWN_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if let Some(ProviderConfig::OpenAI { api_key_env, .. }) = self.get_provider_config(provider)
        {
            if self.api_key.is_none() && std::env::var(api_key_env).is_err() {
                return Err(AppError::Config(format!(
                    "API key not found in environment variable: {}",
                    api_key_env
                )));
            }
        }

        let r = &self.retrieval;
        let limits = [
            ("specificPartyLimit", r.specific_party_limit),
            ("generalPlanLimit", r.general_plan_limit),
            ("comparisonPerParty", r.comparison_per_party),
            ("comparisonMaxTotal", r.comparison_max_total),
            ("defaultLimit", r.default_limit),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Config(format!(
                "retrieval.{} must be greater than zero",
                name
            )));
        }

        let t = &self.timeouts;
        if [t.classify_secs, t.extract_secs, t.search_secs, t.generate_secs].contains(&0) {
            return Err(AppError::Config(
                "timeouts must be greater than zero seconds".to_string(),
            ));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }

        let res = &self.resilience;
        if res.max_attempts == 0 || res.failure_threshold == 0 {
            return Err(AppError::Config(
                "resilience.maxAttempts and resilience.failureThreshold must be greater than zero"
                    .to_string(),
            ));
        }
        if res.backoff_base < 1.0 {
            return Err(AppError::Config(
                "resilience.backoffBase must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.retrieval.specific_party_limit, 5);
        assert_eq!(config.retrieval.general_plan_limit, 15);
        assert_eq!(config.retrieval.comparison_max_total, 10);
        assert!(!config.verbose);
        assert!(!config.no_color);
    }

    #[test]
    fn test_planes_dir() {
        let config = AppConfig::default();
        assert!(config.planes_dir().ends_with(".planes"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("openai".to_string()),
            Some("gpt-4o-mini".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "openai");
        assert_eq!(overridden.model, "gpt-4o-mini");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let yaml = r#"
llm:
  activeProvider: openai
  providers:
    openai:
      apiKeyEnv: PLANES_TEST_OPENAI_KEY
      model: gpt-4o-mini
retrieval:
  generalPlanLimit: 12
timeouts:
  generateSecs: 30
logging:
  json: true
"#;
        let merged = AppConfig::default().merge_yaml_str(yaml).unwrap();
        assert_eq!(merged.provider, "openai");
        assert_eq!(merged.model, "gpt-4o-mini");
        assert_eq!(merged.retrieval.general_plan_limit, 12);
        // Unspecified fields keep their defaults
        assert_eq!(merged.retrieval.specific_party_limit, 5);
        assert_eq!(merged.timeouts.generate_secs, 30);
        assert_eq!(merged.timeouts.classify_secs, 15);
        assert!(merged.log_json);
    }

    #[test]
    fn test_resilience_section() {
        let yaml = "resilience:\n  maxAttempts: 5\n  breakerEnabled: false\n";
        let merged = AppConfig::default().merge_yaml_str(yaml).unwrap();
        assert_eq!(merged.resilience.max_attempts, 5);
        assert!(!merged.resilience.breaker_enabled);
        assert_eq!(merged.resilience.failure_threshold, 5);
        assert!(merged.validate().is_ok());

        let config = AppConfig {
            resilience: ResilienceConfig {
                max_attempts: 0,
                ..ResilienceConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_path_relative_to_workspace() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        assert_eq!(config.store_path(), temp.path().join(".planes/store"));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let config = AppConfig {
            provider: "unknown".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = AppConfig::default();
        config.retrieval.default_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("defaultLimit"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.timeouts.search_secs = 0;
        assert!(config.validate().is_err());
    }
}
