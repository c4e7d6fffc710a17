use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TOKEN_KEY: &str = "token";
pub const DEFAULT_TAB: &str = "default";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Where the session token is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    File,
    Disabled,
}

impl StoreKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "file" => Some(Self::File),
            "disabled" | "none" | "off" => Some(Self::Disabled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Disabled => "disabled",
        }
    }
}

/// Backend API settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Token store settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: Option<StoreKind>,
    /// Root directory for file-backed tabs
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub tab: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.unihub/config.local.toml) > project (.unihub/config.toml) > user (~/.unihub/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".unihub").join("config.toml");
            if user_config.exists() {
                config.merge(Self::load_from(&user_config)?);
            }
        }

        let project_config = Path::new(".unihub").join("config.toml");
        if project_config.exists() {
            config.merge(Self::load_from(&project_config)?);
        }

        // Should be gitignored
        let local_config = Path::new(".unihub").join("config.local.toml");
        if local_config.exists() {
            config.merge(Self::load_from(&local_config)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Merge another config into this one (other takes priority for every field it sets)
    pub fn merge(&mut self, other: Config) {
        if other.api.base_url.is_some() {
            self.api.base_url = other.api.base_url;
        }
        if other.store.kind.is_some() {
            self.store.kind = other.store.kind;
        }
        if other.store.dir.is_some() {
            self.store.dir = other.store.dir;
        }
        if other.store.key.is_some() {
            self.store.key = other.store.key;
        }
        if other.store.tab.is_some() {
            self.store.tab = other.store.tab;
        }
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store.kind.unwrap_or_default()
    }

    pub fn token_key(&self) -> &str {
        self.store.key.as_deref().unwrap_or(DEFAULT_TOKEN_KEY)
    }

    pub fn tab(&self) -> &str {
        self.store.tab.as_deref().unwrap_or(DEFAULT_TAB)
    }

    /// Root for file-backed tabs: configured dir, else ~/.unihub/tabs, else ./.unihub/tabs
    pub fn store_dir(&self) -> PathBuf {
        if let Some(dir) = &self.store.dir {
            return dir.clone();
        }
        dirs::home_dir()
            .map(|h| h.join(".unihub"))
            .unwrap_or_else(|| PathBuf::from(".unihub"))
            .join("tabs")
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !is_http_url(self.base_url()) {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!("'{}' is not an http(s) URL", self.base_url()),
            });
        }

        if self.token_key().trim().is_empty() {
            errors.push(ValidationError {
                field: "store.key".to_string(),
                message: "token key must not be empty".to_string(),
            });
        }

        if self.tab().trim().is_empty() {
            errors.push(ValidationError {
                field: "store.tab".to_string(),
                message: "tab name must not be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_http_url(s: &str) -> bool {
    Regex::new(r"^https?://[^/\s]+(/\S*)?$")
        .map(|re| re.is_match(s))
        .unwrap_or(false)
}
