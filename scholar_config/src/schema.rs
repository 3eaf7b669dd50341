use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const API_KEY_PLACEHOLDER: &str = "your-openai-api-key-here";

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "OpenAIConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "OpenAIConfig::default_model")]
    pub model: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: Self::default_base_url(),
            model: Self::default_model(),
        }
    }
}

impl OpenAIConfig {
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }

    /// The configured key, or an error telling the user where to put one.
    pub fn api_key(&self) -> anyhow::Result<&str> {
        if self.api_key.is_empty() || self.api_key == API_KEY_PLACEHOLDER {
            anyhow::bail!(
                "OpenAI API key is not set. Add it to {} or export OPENAI_API_KEY.",
                Config::config_path()
                    .map_or_else(|_| "config.json".to_string(), |p| p.display().to_string())
            );
        }
        Ok(&self.api_key)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
    pub vector_store_name: String,
    pub vector_store_expiry_days: u32,
    pub temperature: f32,
    pub max_num_results: u32,
    pub max_prompt_tokens: u32,
    pub max_completion_tokens: u32,
    pub poll_interval_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Scholar".to_string(),
            vector_store_name: "ScholarVectorStore".to_string(),
            vector_store_expiry_days: 30,
            temperature: 1.0,
            max_num_results: 50,
            max_prompt_tokens: 100_000,
            max_completion_tokens: 30_000,
            poll_interval_ms: 1000,
        }
    }
}

impl AssistantConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
        }
    }
}

impl StorageConfig {
    fn default_data_dir() -> String {
        "~/.local/share/scholar".to_string()
    }

    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        expand_path(&self.data_dir, |name| std::env::var(name).ok())
    }

    /// Where local documents are kept.
    pub fn documents_dir(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join("documents"))
    }

    /// SQLite file holding the conversation mapping.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join("threads.db"))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single remote operation
    pub request_secs: u64,
    /// Deadline for a whole corpus sync
    pub sync_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            sync_secs: 1800,
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub const fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub const fn sync(&self) -> Duration {
        Duration::from_secs(self.sync_secs)
    }
}

impl Config {
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join("scholar"))
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load `~/scholar/config.json`, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'scholar init' to create config.",
                config_path.display()
            );
        }

        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config at {}: {e}", path.display()))?;
        Ok(config)
    }

    /// `OPENAI_API_KEY` wins over the file when set and non-empty.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.openai.api_key = key;
        }
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    /// Write the config template, refusing to overwrite an existing file.
    pub fn create_config() -> anyhow::Result<PathBuf> {
        let config_path = Self::ensure_config_dir()?.join("config.json");
        Self::write_template(&config_path)?;
        Ok(config_path)
    }

    fn write_template(config_path: &Path) -> anyhow::Result<()> {
        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        let config_template = r#"{
  "openai": {
    "api_key": "your-openai-api-key-here",
    "base_url": "https://api.openai.com/v1",
    "model": "gpt-4o-mini"
  },
  "assistant": {
    "name": "Scholar",
    "vector_store_name": "ScholarVectorStore",
    "vector_store_expiry_days": 30,
    "temperature": 1.0,
    "max_num_results": 50,
    "max_prompt_tokens": 100000,
    "max_completion_tokens": 30000,
    "poll_interval_ms": 1000
  },
  "storage": {
    "data_dir": "~/.local/share/scholar"
  },
  "timeouts": {
    "request_secs": 120,
    "sync_secs": 1800
  }
}"#;

        std::fs::write(config_path, config_template)?;
        Ok(())
    }
}

/// Expand a leading `~` and any `$VAR` / `${VAR}` references.
///
/// Unset variables expand to the empty string.
pub fn expand_path(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    let expanded = expand_vars(raw, lookup);

    if expanded == "~" || expanded.starts_with("~/") {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?;
        return Ok(home.join(expanded.trim_start_matches('~').trim_start_matches('/')));
    }

    Ok(PathBuf::from(expanded))
}

fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                name.push(c);
                chars.next();
            }
        }

        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&lookup(&name).unwrap_or_default());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "XDG_DATA_HOME" => Some("/data".to_string()),
            "USER" => Some("ada".to_string()),
            _ => None,
        }
    }

    #[test]
    fn template_matches_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        Config::write_template(&path).unwrap();

        let config = Config::load_from(&path).unwrap();
        let defaults = Config::default();

        assert_eq!(config.openai.base_url, defaults.openai.base_url);
        assert_eq!(config.openai.model, defaults.openai.model);
        assert_eq!(config.assistant.name, defaults.assistant.name);
        assert_eq!(config.assistant.max_num_results, 50);
        assert_eq!(config.assistant.max_prompt_tokens, 100_000);
        assert_eq!(config.assistant.max_completion_tokens, 30_000);
        assert_eq!(config.storage.data_dir, defaults.storage.data_dir);
        assert_eq!(config.timeouts.request_secs, 120);
        assert!(config.openai.api_key().is_err());

        assert!(Config::write_template(&path).is_err());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "openai": { "api_key": "sk-test" } }"#).unwrap();

        assert_eq!(config.openai.api_key().unwrap(), "sk-test");
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.assistant.vector_store_expiry_days, 30);
        assert_eq!(config.assistant.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.timeouts.sync(), Duration::from_secs(1800));
    }

    #[test]
    fn env_key_overrides_file() {
        let mut config: Config =
            serde_json::from_str(r#"{ "openai": { "api_key": "sk-file" } }"#).unwrap();

        config.apply_env(|_| Some(String::new()));
        assert_eq!(config.openai.api_key, "sk-file");

        config.apply_env(|name| (name == "OPENAI_API_KEY").then(|| "sk-env".to_string()));
        assert_eq!(config.openai.api_key, "sk-env");
    }

    #[test]
    fn expands_variables() {
        assert_eq!(
            expand_path("$XDG_DATA_HOME/scholar", env).unwrap(),
            PathBuf::from("/data/scholar")
        );
        assert_eq!(
            expand_path("/srv/${USER}_docs", env).unwrap(),
            PathBuf::from("/srv/ada_docs")
        );
        assert_eq!(
            expand_path("/tmp/$UNSET/x", env).unwrap(),
            PathBuf::from("/tmp//x")
        );
        assert_eq!(expand_path("/cost$", env).unwrap(), PathBuf::from("/cost$"));
    }

    #[test]
    fn expands_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(
            expand_path("~/.local/share/scholar", env).unwrap(),
            home.join(".local/share/scholar")
        );
    }

    #[test]
    fn storage_paths_live_under_data_dir() {
        let storage = StorageConfig {
            data_dir: "/var/lib/scholar".to_string(),
        };
        assert_eq!(
            storage.documents_dir().unwrap(),
            PathBuf::from("/var/lib/scholar/documents")
        );
        assert_eq!(
            storage.database_path().unwrap(),
            PathBuf::from("/var/lib/scholar/threads.db")
        );
    }
}
