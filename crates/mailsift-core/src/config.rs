use serde::Deserialize;
use std::{env, path::Path, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub app: AppConfig,
    pub paths: PathsConfig,
    pub profile: ProfileConfig,
    pub imap: ImapConfig,
    pub classifier: ClassifierConfig,
    pub jobs: JobsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    pub service_name: String,
    pub port: u16,
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PathsConfig {
    pub database: PathBuf,
    pub training_data: PathBuf,
    pub model: PathBuf,
}

/// Who the mailbox owner is and which sentinel label marks a verified
/// prediction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProfileConfig {
    pub self_addresses: Vec<String>,
    #[serde(default = "default_verification_label")]
    pub verification_label: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ImapConfig {
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClassifierConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobsConfig {
    pub auto_classify: bool,
    pub recheck: bool,
    pub recheck_interval_hours: u64,
    #[serde(default = "default_ingest_interval_minutes")]
    pub ingest_interval_minutes: u64,
    #[serde(default = "default_ingest_limit")]
    pub ingest_limit: usize,
    #[serde(default = "default_recheck_limit")]
    pub recheck_limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdminConfig {
    /// Shared secret for privileged endpoints. When unset, every privileged
    /// call is refused.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_verification_label() -> String {
    "__VERIFIED__".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_batch_size() -> usize {
    50
}

fn default_ingest_interval_minutes() -> u64 {
    5
}

fn default_ingest_limit() -> usize {
    20
}

fn default_recheck_limit() -> usize {
    200
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ConfigBuild(config::ConfigError),
    #[error("failed to parse configuration: {0}")]
    Deserialize(config::ConfigError),
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid numeric override for {key}: {source}")]
    InvalidNumber {
        key: &'static str,
        source: std::num::ParseIntError,
    },
    #[error("invalid boolean override for {key}: {value}")]
    InvalidBool { key: &'static str, value: String },
}

impl Config {
    /// Load configuration from the provided path, apply environment
    /// overrides, and resolve any `env:` indirections.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(ConfigError::ConfigBuild)?;

        let mut cfg: Config = raw.try_deserialize().map_err(ConfigError::Deserialize)?;
        cfg.apply_env_overrides()?;
        cfg.resolve_env_markers()?;
        cfg.expand_paths();
        cfg.normalize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("APP_PORT") {
            self.app.port = port
                .parse()
                .map_err(|source| ConfigError::InvalidNumber {
                    key: "APP_PORT",
                    source,
                })?;
        }

        if let Ok(addresses) = env::var("MY_EMAIL") {
            self.profile.self_addresses = addresses
                .split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(label) = env::var("VERIFICATION_LABEL") {
            self.profile.verification_label = label;
        }

        if let Ok(server) = env::var("IMAP_SERVER") {
            self.imap.server = server;
        }
        if let Ok(user) = env::var("IMAP_USER") {
            self.imap.user = user;
        }
        if let Ok(password) = env::var("IMAP_PASSWORD") {
            self.imap.password = password;
        }
        if let Ok(batch_size) = env::var("IMAP_BATCH_SIZE") {
            self.imap.batch_size =
                batch_size
                    .parse()
                    .map_err(|source| ConfigError::InvalidNumber {
                        key: "IMAP_BATCH_SIZE",
                        source,
                    })?;
        }

        if let Ok(path) = env::var("DB_PATH") {
            self.paths.database = PathBuf::from(path);
        }
        if let Ok(path) = env::var("TRAINING_DATA_DIR") {
            self.paths.training_data = PathBuf::from(path);
        }
        if let Ok(path) = env::var("MODEL_DIR") {
            self.paths.model = PathBuf::from(path);
        }

        if let Ok(url) = env::var("CLASSIFIER_URL") {
            self.classifier.url = url;
        }

        if let Ok(key) = env::var("ADMIN_API_KEY") {
            self.admin.api_key = Some(key);
        }

        if let Ok(value) = env::var("ENABLE_AUTO_CLASSIFICATION") {
            self.jobs.auto_classify = parse_bool("ENABLE_AUTO_CLASSIFICATION", &value)?;
        }
        if let Ok(value) = env::var("ENABLE_RECHECK_JOB") {
            self.jobs.recheck = parse_bool("ENABLE_RECHECK_JOB", &value)?;
        }
        if let Ok(hours) = env::var("RECHECK_INTERVAL_HOURS") {
            self.jobs.recheck_interval_hours =
                hours
                    .parse()
                    .map_err(|source| ConfigError::InvalidNumber {
                        key: "RECHECK_INTERVAL_HOURS",
                        source,
                    })?;
        }

        Ok(())
    }

    fn resolve_env_markers(&mut self) -> Result<(), ConfigError> {
        apply_env_marker(&mut self.app.service_name)?;
        apply_env_marker(&mut self.app.env)?;
        for entry in &mut self.profile.self_addresses {
            apply_env_marker(entry)?;
        }
        apply_env_marker(&mut self.profile.verification_label)?;
        apply_env_marker(&mut self.imap.server)?;
        apply_env_marker(&mut self.imap.user)?;
        apply_env_marker(&mut self.imap.password)?;
        apply_env_marker(&mut self.classifier.url)?;
        if let Some(key) = &mut self.admin.api_key {
            apply_env_marker(key)?;
        }
        apply_env_marker_path(&mut self.paths.database)?;
        apply_env_marker_path(&mut self.paths.training_data)?;
        apply_env_marker_path(&mut self.paths.model)?;
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.paths.database = expand_tilde(&self.paths.database);
        self.paths.training_data = expand_tilde(&self.paths.training_data);
        self.paths.model = expand_tilde(&self.paths.model);
    }

    fn normalize(&mut self) {
        for address in &mut self.profile.self_addresses {
            *address = address.trim().to_lowercase();
        }
        self.profile.self_addresses.retain(|a| !a.is_empty());
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}

fn apply_env_marker(value: &mut String) -> Result<(), ConfigError> {
    if let Some(rest) = value.strip_prefix("env:") {
        let resolved = env::var(rest).map_err(|_| ConfigError::MissingEnvVar(rest.to_string()))?;
        *value = resolved;
    }
    Ok(())
}

fn apply_env_marker_path(path: &mut PathBuf) -> Result<(), ConfigError> {
    let mut value = path.to_string_lossy().to_string();
    apply_env_marker(&mut value)?;
    *path = PathBuf::from(value);
    Ok(())
}

fn expand_tilde(path: &Path) -> PathBuf {
    let as_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&as_string);
    PathBuf::from(expanded.as_ref())
}
