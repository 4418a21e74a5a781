use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EndpointConfig {
    #[serde(default = "EndpointConfig::default_graphql_url")]
    pub graphql_url: String,
    /// Bearer token for the chat service. Absent or empty means
    /// unauthenticated local development.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            graphql_url: Self::default_graphql_url(),
            api_token: None,
        }
    }
}

impl EndpointConfig {
    fn default_graphql_url() -> String {
        "http://localhost:8686/graphql".to_string()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    /// Total attempts for idempotent operations, inclusive of the first.
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "RetryConfig::default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            base_delay_ms: Self::default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    const fn default_max_attempts() -> usize {
        3
    }

    const fn default_base_delay_ms() -> u64 {
        500
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Key prefix for every record the store writes.
    #[serde(default = "StorageConfig::default_namespace")]
    pub namespace: String,
    /// Where conversation logs live. Defaults to `~/hypernews/data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: Self::default_namespace(),
            data_dir: None,
        }
    }
}

impl StorageConfig {
    fn default_namespace() -> String {
        "hypernews".to_string()
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join("hypernews");

        let config_path = config_dir.join("config.json");

        if !config_path.exists() {
            tracing::debug!(
                "no config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = serde_json::from_str(&content)?;

        Ok(config)
    }

    /// Resolved data directory for conversation logs.
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join("hypernews")
            .join("data"))
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join("hypernews");

        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn create_config() -> anyhow::Result<()> {
        let config_dir = Self::ensure_config_dir()?;
        let config_path = config_dir.join("config.json");

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        let config_template = r#"{
  "endpoint": {
    "graphql_url": "http://localhost:8686/graphql",
    "api_token": ""
  },
  "retry": {
    "max_attempts": 3,
    "base_delay_ms": 500
  },
  "storage": {
    "namespace": "hypernews"
  }
}"#;

        std::fs::write(&config_path, config_template)?;

        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Next steps:");
        println!("   1. Point graphql_url at your HyperNews agent backend");
        println!("   2. Set api_token if the backend requires one (leave empty for local dev)");
        println!("   3. Run 'hypernews chat' to start a conversation");
        println!();
        Ok(())
    }
}
