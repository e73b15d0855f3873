use crate::api::ApiError;
use crate::constants::{
    AI_REQUEST_TIMEOUT_SECS, APP_DIR_NAME, HIGHLIGHT_DEBOUNCE_MS, MAX_HIGHLIGHT_BYTES,
    TERMINATE_GRACE_MS,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backend kind speaking the Ollama chat API.
pub const KIND_OLLAMA: &str = "ollama";
/// Backend kind speaking the OpenAI chat-completions API.
pub const KIND_OPENAI: &str = "openai";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    /// Wire protocol spoken by the backend (`ollama` or `openai`).
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is not set.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub base_url: String,
    pub active_model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_kind() -> String {
    KIND_OPENAI.to_string()
}

impl ProviderConfig {
    /// Whether this backend refuses unauthenticated requests.
    pub fn requires_api_key(&self) -> bool {
        self.kind != KIND_OLLAMA
    }

    /// The configured key, falling back to the named environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            })
    }

    /// Checks the settings a request cannot be issued without.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.active_model.trim().is_empty() {
            return Err(ApiError::Config(format!(
                "no model configured for provider {}",
                self.name
            )));
        }
        if self.base_url.trim().is_empty() {
            return Err(ApiError::Config(format!(
                "no base URL configured for provider {}",
                self.name
            )));
        }
        if self.requires_api_key() && self.resolved_api_key().is_none() {
            let hint = match &self.api_key_env {
                Some(var) => format!("set api_key or the {} environment variable", var),
                None => "set api_key".to_string(),
            };
            return Err(ApiError::Config(format!(
                "API key is missing for provider {} ({})",
                self.name, hint
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AiSettings {
    pub timeout_secs: u64,
}

impl AiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            timeout_secs: AI_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HighlightSettings {
    pub debounce_ms: u64,
    pub max_bytes: usize,
}

impl HighlightSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for HighlightSettings {
    fn default() -> Self {
        Self {
            debounce_ms: HIGHLIGHT_DEBOUNCE_MS,
            max_bytes: MAX_HIGHLIGHT_BYTES,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TerminalSettings {
    /// Shell used to run commands; the platform shell when unset.
    #[serde(default)]
    pub shell: Option<String>,
    pub terminate_grace_ms: u64,
}

impl TerminalSettings {
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            shell: None,
            terminate_grace_ms: TERMINATE_GRACE_MS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    /// Also write a debug-level log under the data directory.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub active_provider: String,
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub ai: AiSettings,
    #[serde(default)]
    pub highlight: HighlightSettings,
    #[serde(default)]
    pub terminal: TerminalSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_provider: "Gemini".to_string(),
            providers: vec![
                ProviderConfig {
                    name: "Gemini".to_string(),
                    kind: KIND_OPENAI.to_string(),
                    api_key: None,
                    api_key_env: Some("GEMINI_API_KEY".to_string()),
                    base_url: "https://generativelanguage.googleapis.com/v1beta/openai"
                        .to_string(),
                    active_model: "gemini-2.5-flash".to_string(),
                    system_prompt: None,
                },
                ProviderConfig {
                    name: "Ollama".to_string(),
                    kind: KIND_OLLAMA.to_string(),
                    api_key: None,
                    api_key_env: None,
                    base_url: "http://localhost:11434".to_string(),
                    active_model: "qwen2.5:0.5b".to_string(),
                    system_prompt: None,
                },
                ProviderConfig {
                    name: "OpenAI".to_string(),
                    kind: KIND_OPENAI.to_string(),
                    api_key: None,
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                    base_url: "https://api.openai.com/v1".to_string(),
                    active_model: "gpt-4o".to_string(),
                    system_prompt: None,
                },
            ],
            ai: AiSettings::default(),
            highlight: HighlightSettings::default(),
            terminal: TerminalSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR_NAME);
        path
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Loads the user config, writing the defaults on first run.
    ///
    /// A malformed file is reported and ignored rather than aborting startup.
    pub fn load() -> Self {
        let path = Self::config_file();
        if path.exists() {
            match Self::load_from(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Ignoring config at {}: {:#}", path.display(), e);
                    return Self::default();
                }
            }
        }
        let default = Self::default();
        if let Err(e) = default.save_to(&path) {
            tracing::warn!("Could not write default config: {:#}", e);
        }
        default
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {:?}", dir))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    /// The provider requests go to, or a configuration error naming it.
    pub fn active_provider(&self) -> Result<&ProviderConfig, ApiError> {
        self.providers
            .iter()
            .find(|p| p.name == self.active_provider)
            .ok_or_else(|| {
                ApiError::Config(format!(
                    "active provider {:?} is not configured",
                    self.active_provider
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ollama() -> ProviderConfig {
        AppConfig::default()
            .providers
            .into_iter()
            .find(|p| p.kind == KIND_OLLAMA)
            .unwrap()
    }

    #[test]
    fn test_default_active_provider_exists() {
        let config = AppConfig::default();
        let provider = config.active_provider().unwrap();
        assert_eq!(provider.name, "Gemini");
        assert_eq!(config.ai.timeout(), Duration::from_secs(60));
        assert_eq!(config.highlight.max_bytes, 100_000);
    }

    #[test]
    fn test_unknown_active_provider_is_config_error() {
        let config = AppConfig {
            active_provider: "Nope".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(config.active_provider(), Err(ApiError::Config(_))));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let provider = ProviderConfig {
            name: "Keyless".to_string(),
            kind: KIND_OPENAI.to_string(),
            api_key: None,
            api_key_env: Some("NANOEDIT_TEST_UNSET_KEY_VAR".to_string()),
            base_url: "http://localhost:1".to_string(),
            active_model: "m".to_string(),
            system_prompt: None,
        };
        let err = provider.validate().unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
        assert!(err.to_string().contains("NANOEDIT_TEST_UNSET_KEY_VAR"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(ollama().validate().is_ok());
    }

    #[test]
    fn test_empty_model_is_config_error() {
        let mut provider = ollama();
        provider.active_model = "  ".to_string();
        assert!(matches!(provider.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn test_blank_inline_key_does_not_count() {
        let mut provider = ollama();
        provider.kind = KIND_OPENAI.to_string();
        provider.api_key = Some("   ".to_string());
        assert!(provider.resolved_api_key().is_none());
        provider.api_key = Some("sk-test".to_string());
        assert_eq!(provider.resolved_api_key().as_deref(), Some("sk-test"));
        assert!(provider.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.highlight.debounce_ms = 42;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml = r#"
active_provider = "Ollama"

[[providers]]
name = "Ollama"
kind = "ollama"
base_url = "http://localhost:11434"
active_model = "llama3"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.ai, AiSettings::default());
        assert_eq!(config.terminal.terminate_grace_ms, TERMINATE_GRACE_MS);
        assert_eq!(config.active_provider().unwrap().active_model, "llama3");
    }
}
