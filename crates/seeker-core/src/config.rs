//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys split on `__`). Provides helpers to expand
//! `~` and `${VAR}` and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
/// Upper bound on results per query, whatever `search.max_k` says.
pub const K_LIMIT: usize = 100;

pub struct Config {
    figment: Figment,
    env_name: String,
    base_dir: PathBuf,
}

impl Config {
    /// Load `config.toml` + `config.<env>.toml` + `APP_*` from the working directory.
    pub fn load() -> anyhow::Result<Self> {
        let base_dir = env::current_dir()?;
        Self::load_from(&base_dir)
    }

    pub fn load_from(base_dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base_dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name, base_dir: base_dir.to_path_buf() };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view of the whole configuration with paths resolved against the base dir.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.resolve_paths(&self.base_dir);
        Ok(settings)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        settings.validate()?;
        if matches!(self.env_name.as_str(), "prod" | "production") && settings.model.use_fake {
            return Err(Error::InvalidConfig("model.use_fake must be off in production".into()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub model: ModelSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub embeddings_path: PathBuf,
    pub question_data_path: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            embeddings_path: PathBuf::from("data/embeddings/embeddings.npy"),
            question_data_path: PathBuf::from("data/processed/question_data.npy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Hub identifier of the model that produced the corpus embeddings.
    pub id: String,
    /// Local directory holding `config.json`, `tokenizer.json` and the weights.
    pub dir: Option<PathBuf>,
    pub max_seq_len: usize,
    pub use_fake: bool,
    pub allow_download: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            id: DEFAULT_MODEL_ID.to_string(),
            dir: None,
            max_seq_len: 256,
            use_fake: false,
            allow_download: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_k: usize,
    pub max_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_k: 5, max_k: 100 }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.search.max_k == 0 || self.search.max_k > K_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "search.max_k must be within 1..={K_LIMIT}, got {}",
                self.search.max_k
            )));
        }
        if self.search.default_k == 0 || self.search.default_k > self.search.max_k {
            return Err(Error::InvalidConfig(format!(
                "search.default_k must be within 1..={}, got {}",
                self.search.max_k, self.search.default_k
            )));
        }
        if self.model.max_seq_len == 0 {
            return Err(Error::InvalidConfig("model.max_seq_len must be positive".into()));
        }
        if self.model.id.trim().is_empty() {
            return Err(Error::InvalidConfig("model.id must not be empty".into()));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.data.embeddings_path = resolve_with_base(base, self.data.embeddings_path.to_string_lossy());
        self.data.question_data_path = resolve_with_base(base, self.data.question_data_path.to_string_lossy());
        // An empty string in TOML means "not set".
        self.model.dir = self
            .model
            .dir
            .take()
            .filter(|d| !d.as_os_str().is_empty())
            .map(|d| resolve_with_base(base, d.to_string_lossy()));
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
