// Configuration Storage Service
// Handles config file read/write, validation and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid pattern `{pattern}` in rule {rule}: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown clause category `{0}`")]
    UnknownCategory(String),

    #[error("Unknown risk severity `{0}`")]
    UnknownSeverity(String),

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("Rule tables are empty: {0}")]
    MissingRules(String),
}

impl ConfigurationError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}

// ============ App Config ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub simplification: SimplificationConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    #[serde(default)]
    pub rules: Option<RulesConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            segmentation: SegmentationConfig::default(),
            simplification: SimplificationConfig::default(),
            translation: TranslationConfig::default(),
            proxy: None,
            api_keys: HashMap::new(),
            rules: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let seg = &self.segmentation;
        if seg.sentence_target_chars == 0 {
            return Err(ConfigurationError::invalid(
                "segmentation.sentenceTargetChars",
                "must be greater than zero",
            ));
        }
        if seg.sentence_max_chars < seg.sentence_target_chars {
            return Err(ConfigurationError::invalid(
                "segmentation.sentenceMaxChars",
                format!(
                    "{} is below sentenceTargetChars {}",
                    seg.sentence_max_chars, seg.sentence_target_chars
                ),
            ));
        }
        self.simplification
            .rate_limit
            .validate("simplification.rateLimit")?;
        self.translation.rate_limit.validate("translation.rateLimit")?;
        if self.simplification.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigurationError::invalid(
                "simplification.circuitBreaker.failureThreshold",
                "must be at least 1",
            ));
        }
        if self.simplification.request_timeout_secs == 0 || self.translation.request_timeout_secs == 0 {
            return Err(ConfigurationError::invalid(
                "requestTimeoutSecs",
                "must be greater than zero",
            ));
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            return Err(ConfigurationError::invalid("logging.level", e.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

/// Clause segmentation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationConfig {
    #[serde(default = "default_min_clause_chars")]
    pub min_clause_chars: usize,
    #[serde(default = "default_sentence_target")]
    pub sentence_target_chars: usize,
    #[serde(default = "default_sentence_max")]
    pub sentence_max_chars: usize,
    #[serde(default = "default_heading_max_words")]
    pub heading_max_words: usize,
    #[serde(default = "default_heading_max_chars")]
    pub heading_max_chars: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_clause_chars: default_min_clause_chars(),
            sentence_target_chars: default_sentence_target(),
            sentence_max_chars: default_sentence_max(),
            heading_max_words: default_heading_max_words(),
            heading_max_chars: default_heading_max_chars(),
        }
    }
}

/// One external provider slot (`openai` or `gemini`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn named(provider: &str) -> Self {
        Self {
            enabled: true,
            provider: provider.to_string(),
            model: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigurationError> {
        if self.max_concurrency == 0 {
            return Err(ConfigurationError::invalid(field, "maxConcurrency must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplificationConfig {
    #[serde(default = "default_primary_provider")]
    pub primary: ProviderConfig,
    #[serde(default = "default_secondary_provider")]
    pub secondary: ProviderConfig,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for SimplificationConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_provider(),
            secondary: default_secondary_provider(),
            request_timeout_secs: default_timeout_secs(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl SimplificationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationConfig {
    #[serde(default = "default_translation_provider")]
    pub provider: ProviderConfig,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_translation_rate_limit")]
    pub rate_limit: RateLimitConfig,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: default_translation_provider(),
            request_timeout_secs: default_timeout_secs(),
            rate_limit: default_translation_rate_limit(),
        }
    }
}

impl TranslationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============ Rule Overrides ============

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RulesConfig {
    /// Drop the built-in tables and use only the entries below.
    #[serde(default)]
    pub replace_builtin: bool,
    #[serde(default)]
    pub category_keywords: Vec<CategoryKeywordsConfig>,
    #[serde(default)]
    pub risk_rules: Vec<RiskRuleConfig>,
    #[serde(default)]
    pub substitutions: Vec<SubstitutionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryKeywordsConfig {
    pub category: String,
    pub patterns: Vec<WeightedPatternConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedPatternConfig {
    pub pattern: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRuleConfig {
    pub id: String,
    pub pattern: String,
    pub severity: String,
    pub rationale: String,
    /// Empty means the rule applies to every category.
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionConfig {
    pub term: String,
    pub plain: String,
}

fn default_version() -> String { "1.0.0".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_logs_to_keep() -> usize { 30 }
fn default_true() -> bool { true }
fn default_weight() -> u32 { 1 }
fn default_min_clause_chars() -> usize { 25 }
fn default_sentence_target() -> usize { 300 }
fn default_sentence_max() -> usize { 500 }
fn default_heading_max_words() -> usize { 8 }
fn default_heading_max_chars() -> usize { 60 }
fn default_max_concurrency() -> usize { 2 }
fn default_min_interval_ms() -> u64 { 1000 }
fn default_failure_threshold() -> u32 { 3 }
fn default_window_secs() -> u64 { 60 }
fn default_cooldown_secs() -> u64 { 30 }
fn default_timeout_secs() -> u64 { 30 }
fn default_primary_provider() -> ProviderConfig { ProviderConfig::named("openai") }
fn default_secondary_provider() -> ProviderConfig { ProviderConfig::named("gemini") }
fn default_translation_provider() -> ProviderConfig { ProviderConfig::named("gemini") }
fn default_translation_rate_limit() -> RateLimitConfig {
    RateLimitConfig { max_concurrency: 1, min_interval_ms: 5000 }
}

// ============ Logging ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `signsafe_lib=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub file_enabled: bool,
    /// Defaults to `<local data dir>/signsafe/logs`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Session logs kept after startup cleanup; 0 keeps everything.
    #[serde(default = "default_logs_to_keep")]
    pub keep_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: true,
            directory: None,
            keep_files: default_logs_to_keep(),
        }
    }
}

impl LoggingConfig {
    /// Apply `RUST_LOG`, `SIGNSAFE_LOG_DIR`, `SIGNSAFE_DISABLE_FILE_LOG` and
    /// `SIGNSAFE_DISABLE_LOG_CLEANUP` on top of the file settings.
    pub fn with_env_overrides(self) -> Self {
        self.overridden_by(|name| std::env::var(name).ok())
    }

    fn overridden_by(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let set = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        let flag = |name: &str| {
            set(name).is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        };

        if let Some(level) = set("RUST_LOG") {
            self.level = level;
        }
        if let Some(dir) = set("SIGNSAFE_LOG_DIR") {
            self.directory = Some(PathBuf::from(dir.trim()));
        }
        if flag("SIGNSAFE_DISABLE_FILE_LOG") {
            self.file_enabled = false;
        }
        if flag("SIGNSAFE_DISABLE_LOG_CLEANUP") {
            self.keep_files = 0;
        }
        self
    }

    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|d| d.join("signsafe").join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
    }
}

// ============ Store ============

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Store rooted at [`ConfigStore::default_config_dir`], or the working directory.
    pub fn open_default() -> Self {
        Self::new(Self::default_config_dir().unwrap_or_else(|| PathBuf::from(".signsafe")))
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("signsafe"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ConfigurationError> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| ConfigurationError::io("Failed to create config dir", e))
    }

    /// Load configuration from file; a missing file yields defaults.
    pub fn load(&self) -> Result<AppConfig, ConfigurationError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| ConfigurationError::io("Failed to read config", e))?;

        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigurationError> {
        config.validate()?;
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;

        fs::write(&self.config_file, content)
            .map_err(|e| ConfigurationError::io("Failed to write config", e))
    }

    fn create_backup(&self) -> Result<(), ConfigurationError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| ConfigurationError::io("Failed to create backup dir", e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| ConfigurationError::io("Failed to create backup", e))?;

        self.cleanup_old_backups(&backup_dir, 10)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigurationError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| ConfigurationError::io("Failed to read backup dir", e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // file names carry the timestamp, so name order is age order
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    /// Get provider API key from config file
    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, ConfigurationError> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    /// Store provider API key in config file
    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), ConfigurationError> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    /// Delete provider API key from config file
    pub fn delete_api_key(&self, provider: &str) -> Result<(), ConfigurationError> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}
