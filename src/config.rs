use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the artifact store is persisted
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Source host (GitHub REST API) configuration
    pub github: GitHubConfig,
    pub pipeline: PipelineConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for all generation calls
    pub chat_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Attempts per generation call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further attempt
    pub initial_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Personal access token, raises the rate limit and allows private repos
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on files fetched and analyzed per run
    pub max_selected_files: usize,
    /// Cap on medium-priority (plain source) files picked by the selector
    pub medium_priority_cap: usize,
    /// Files fetched per request batch
    pub fetch_batch_size: usize,
    /// Pause between fetch batches, to stay under the host's rate limit
    pub fetch_batch_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Files re-scored concurrently per ranker batch
    pub rank_batch_size: usize,
    pub max_results: usize,
    /// Blend a model re-score into the heuristic score
    pub use_model_rescoring: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9000".to_string(),
            llm: LlmConfig::default(),
            github: GitHubConfig::default(),
            pipeline: PipelineConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            api_key: None,
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_selected_files: 80,
            medium_priority_cap: 30,
            fetch_batch_size: 10,
            fetch_batch_delay_ms: 250,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rank_batch_size: 5,
            max_results: 50,
            use_model_rescoring: true,
        }
    }
}

impl PipelineConfig {
    pub fn fetch_batch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_batch_delay_ms)
    }
}

impl LlmConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("REPO_INSIGHT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("REPO_INSIGHT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("LLM_MAX_ATTEMPTS") {
            if let Ok(v) = val.parse::<u32>() {
                config.llm.max_attempts = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("LLM_INITIAL_BACKOFF_MS") {
            if let Ok(v) = val.parse() {
                config.llm.initial_backoff_ms = v;
            }
        }
        if let Ok(url) = std::env::var("GITHUB_API_URL") {
            config.github.api_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            config.github.token = Some(token);
        }
        if let Ok(val) = std::env::var("REPO_INSIGHT_MAX_FILES") {
            if let Ok(v) = val.parse() {
                config.pipeline.max_selected_files = v;
            }
        }
        if let Ok(val) = std::env::var("REPO_INSIGHT_FETCH_BATCH") {
            if let Ok(v) = val.parse::<usize>() {
                config.pipeline.fetch_batch_size = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("REPO_INSIGHT_FETCH_DELAY_MS") {
            if let Ok(v) = val.parse() {
                config.pipeline.fetch_batch_delay_ms = v;
            }
        }
        if let Ok(val) = std::env::var("REPO_INSIGHT_MAX_RESULTS") {
            if let Ok(v) = val.parse() {
                config.search.max_results = v;
            }
        }
        if let Ok(val) = std::env::var("REPO_INSIGHT_MODEL_RESCORE") {
            if let Ok(v) = val.parse() {
                config.search.use_model_rescoring = v;
            }
        }

        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }
}
