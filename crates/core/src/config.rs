//! Configuration management for motolaw.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.motolaw/config.yaml` or `MOTOLAW_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! Secrets are never stored in the file itself; the file names the environment
//! variable that holds each key.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".motolaw";

/// Providers the LLM factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["openai", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .motolaw/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active LLM provider ("openai", "ollama")
    pub provider: String,

    /// Chat model identifier
    pub model: String,

    /// Explicit API key for the LLM provider
    pub api_key: Option<String>,

    /// Explicit endpoint override for the LLM provider
    pub endpoint: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations from config.yaml
    pub llm: Option<LlmConfig>,

    /// Web search settings
    pub search: SearchConfig,

    /// Knowledge base settings
    pub knowledge: KnowledgeSettings,

    /// Conversation history settings
    pub history: HistoryConfig,

    /// Workflow execution settings
    pub workflow: WorkflowConfig,

    /// HTTP server settings
    pub server: ServerConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    /// Any OpenAI-compatible chat completions endpoint (OpenAI, Azure, Groq, vLLM)
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
        timeout: Option<u64>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAI { model, .. } | Self::Ollama { model, .. } => model,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::OpenAI { endpoint, .. } => endpoint.as_deref(),
            Self::Ollama { endpoint, .. } => Some(endpoint),
        }
    }

    pub fn timeout(&self) -> Option<u64> {
        match self {
            Self::OpenAI { timeout, .. } | Self::Ollama { timeout, .. } => *timeout,
        }
    }
}

/// Web search provider settings (Tavily-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    /// Environment variable holding the search API key
    pub api_key_env: String,

    /// Search endpoint URL
    pub endpoint: String,

    /// Maximum results requested per query
    pub max_results: u32,

    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "TAVILY_API_KEY".to_string(),
            endpoint: "https://api.tavily.com/search".to_string(),
            max_results: 5,
            timeout_secs: 15,
        }
    }
}

/// Knowledge base lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeSettings {
    /// Knowledge base consulted by the workflow
    pub base: String,

    /// Fragments returned per lookup
    pub top_k: u32,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            base: "motorcycle".to_string(),
            top_k: 4,
        }
    }
}

/// Conversation history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// SQLite database path; defaults to `.motolaw/history.sqlite`
    pub database: Option<PathBuf>,

    /// Older records kept alongside each newly inserted one
    pub retain: u32,

    /// Disable persistence entirely
    pub disabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database: None,
            retain: 2,
            disabled: false,
        }
    }
}

/// Workflow execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowConfig {
    /// Deadline applied to every external call made by a workflow step
    pub call_timeout_secs: u64,

    /// Sampling temperature for answer generation
    pub generation_temperature: f32,

    /// Sampling temperature for the retry after an ungrounded answer
    pub regeneration_temperature: f32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 60,
            generation_temperature: 0.7,
            regeneration_temperature: 1.0,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    search: Option<SearchConfig>,
    knowledge: Option<KnowledgeSettings>,
    history: Option<HistoryConfig>,
    workflow: Option<WorkflowConfig>,
    server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            endpoint: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            search: SearchConfig::default(),
            knowledge: KnowledgeSettings::default(),
            history: HistoryConfig::default(),
            workflow: WorkflowConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `MOTOLAW_WORKSPACE`: Override workspace path
    /// - `MOTOLAW_CONFIG`: Path to config file
    /// - `MOTOLAW_PROVIDER`: LLM provider
    /// - `MOTOLAW_MODEL`: Model identifier
    /// - `MOTOLAW_API_KEY`: LLM API key
    /// - `MOTOLAW_ENDPOINT`: LLM endpoint
    /// - `MOTOLAW_DATABASE`: History database path
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Load configuration, letting explicit paths win over the environment.
    ///
    /// The workspace and config file must be known before the YAML layer is
    /// read, so CLI flags for them are applied here rather than in
    /// [`AppConfig::with_overrides`].
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace.or_else(|| env_path("MOTOLAW_WORKSPACE")) {
            config.workspace = workspace;
        }

        config.config_file = config_file.or_else(|| env_path("MOTOLAW_CONFIG"));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("MOTOLAW_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("MOTOLAW_MODEL") {
            config.model = model;
        }

        if let Ok(endpoint) = std::env::var("MOTOLAW_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }

        if let Some(database) = env_path("MOTOLAW_DATABASE") {
            config.history.database = Some(database);
        }

        config.api_key = std::env::var("MOTOLAW_API_KEY").ok();

        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
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

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.clone().merge(config_file))
    }

    fn merge(mut self, file: ConfigFile) -> Self {
        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            self.workspace = PathBuf::from(path);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
        }

        if let Some(llm) = file.llm {
            self.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                self.model = provider_config.model().to_string();
            }

            self.llm = Some(llm);
        }

        if let Some(search) = file.search {
            self.search = search;
        }
        if let Some(knowledge) = file.knowledge {
            self.knowledge = knowledge;
        }
        if let Some(history) = file.history {
            self.history = history;
        }
        if let Some(workflow) = file.workflow {
            self.workflow = workflow;
        }
        if let Some(server) = file.server {
            self.server = server;
        }

        self
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file.
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
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

    /// Get the path to the .motolaw directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .motolaw directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Path of the conversation history database.
    pub fn history_path(&self) -> PathBuf {
        self.history
            .database
            .clone()
            .unwrap_or_else(|| self.state_dir().join("history.sqlite"))
    }

    /// Get the configuration block for a provider, if the config file has one.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Endpoint for the active provider: explicit override first, then config file.
    pub fn resolve_endpoint(&self) -> Option<String> {
        self.endpoint.clone().or_else(|| {
            self.get_provider_config(&self.provider)
                .and_then(|pc| pc.endpoint().map(str::to_string))
        })
    }

    /// Request timeout for the active provider, if configured.
    pub fn resolve_llm_timeout(&self) -> Option<u64> {
        self.get_provider_config(&self.provider)
            .and_then(ProviderConfig::timeout)
    }

    /// Resolve the LLM API key.
    ///
    /// Order: `MOTOLAW_API_KEY`, the provider's `apiKeyEnv`, then `OPENAI_API_KEY`
    /// for the openai provider.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        if let Some(ProviderConfig::OpenAI { api_key_env, .. }) = self.get_provider_config(provider)
        {
            if let Ok(key) = std::env::var(api_key_env) {
                return Some(key);
            }
        }

        if provider == "openai" {
            return std::env::var("OPENAI_API_KEY").ok();
        }

        None
    }

    /// Resolve the web search API key from the configured environment variable.
    pub fn resolve_search_api_key(&self) -> Option<String> {
        std::env::var(&self.search.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.as_str();

        if !KNOWN_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if provider == "openai" && self.resolve_api_key(provider).is_none() {
            return Err(AppError::Config(
                "No API key for provider 'openai' (set MOTOLAW_API_KEY, OPENAI_API_KEY or apiKeyEnv)"
                    .to_string(),
            ));
        }

        if self.workflow.call_timeout_secs == 0 {
            return Err(AppError::Config(
                "workflow.callTimeoutSecs must be greater than zero".to_string(),
            ));
        }

        for (key, value) in [
            ("generationTemperature", self.workflow.generation_temperature),
            ("regenerationTemperature", self.workflow.regeneration_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "workflow.{} must be between 0.0 and 2.0, got {}",
                    key, value
                )));
            }
        }

        Ok(())
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.history.retain, 2);
        assert_eq!(config.knowledge.top_k, 4);
        assert!(!config.verbose);
    }

    #[test]
    fn test_state_dir() {
        let config = AppConfig::default();
        assert!(config.state_dir().ends_with(".motolaw"));
        assert!(config.history_path().ends_with("history.sqlite"));
    }

    #[test]
    fn test_with_overrides() {
        let overridden = AppConfig::default().with_overrides(
            Some("ollama".to_string()),
            Some("llama3.2".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "ollama");
        assert_eq!(overridden.model, "llama3.2");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let yaml = r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://localhost:11434
      model: qwen2.5
    openai:
      apiKeyEnv: AZURE_KEY
      model: gpt-4o
      endpoint: https://example.openai.azure.com/v1
search:
  maxResults: 3
history:
  retain: 5
workflow:
  callTimeoutSecs: 20
  regenerationTemperature: 1.2
"#;
        let file: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        let config = AppConfig::default().merge(file);

        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.search.api_key_env, "TAVILY_API_KEY");
        assert_eq!(config.history.retain, 5);
        assert_eq!(config.workflow.call_timeout_secs, 20);
        assert_eq!(config.workflow.generation_temperature, 0.7);
        assert_eq!(config.workflow.regeneration_temperature, 1.2);
        assert_eq!(
            config.resolve_endpoint().as_deref(),
            Some("http://localhost:11434")
        );
        assert!(matches!(
            config.get_provider_config("openai"),
            Some(ProviderConfig::OpenAI { .. })
        ));
    }

    #[test]
    fn test_load_from_workspace_file() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(STATE_DIR)).unwrap();
        std::fs::write(
            temp.path().join(STATE_DIR).join("config.yaml"),
            "knowledge:\n  base: regulations\n  topK: 3\n",
        )
        .unwrap();

        let config = AppConfig::load_with(Some(temp.path().to_path_buf()), None).unwrap();
        assert_eq!(config.knowledge.base, "regulations");
        assert_eq!(config.knowledge.top_k, 3);
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = AppConfig::load_with(
            Some(temp.path().to_path_buf()),
            Some(temp.path().join("nope.yaml")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let mut config = AppConfig::default();
        config.provider = "ollama".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_temperature_range() {
        let mut config = AppConfig::default();
        config.provider = "ollama".to_string();
        assert_ne!(
            config.workflow.generation_temperature,
            config.workflow.regeneration_temperature
        );

        config.workflow.regeneration_temperature = 2.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("regenerationTemperature"));

        config.workflow.regeneration_temperature = 1.0;
        config.workflow.generation_temperature = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-test".to_string());
        assert_eq!(config.resolve_api_key("openai").as_deref(), Some("sk-test"));
        assert!(config.validate().is_ok());
    }
}
