use providers::vision::{VisionConfig, DEFAULT_ENDPOINT, DEFAULT_SCOPE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Settings read from the optional TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vision: VisionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    pub endpoint: String,
    pub scope: String,
    pub max_results: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            max_results: None,
            timeout_secs: 60,
        }
    }
}

impl VisionSettings {
    pub fn client_config(&self) -> VisionConfig {
        VisionConfig {
            endpoint: self.endpoint.clone(),
            scope: self.scope.clone(),
            max_results: self.max_results,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

/// Options for a single run. Built once by the caller and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Service-account JSON handed to the annotation client.
    pub credential: PathBuf,
    pub input_root: PathBuf,
    pub recursive: bool,
    pub output_path: PathBuf,
    /// Keywords kept per image, highest relevance first. 0 keeps all of them.
    pub max_keywords: u8,
    pub export_score: bool,
    pub insert_tags: bool,
    /// Overwrite the keyword slot instead of appending to it. Irreversible.
    pub remove_existing_tags: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("credential file not found: {}", .0.display())]
    MissingCredential(PathBuf),
    #[error("input folder is not a directory: {}", .0.display())]
    InputNotDirectory(PathBuf),
    #[error("output directory does not exist: {}", .0.display())]
    MissingOutputDir(PathBuf),
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.credential.is_file() {
            return Err(ConfigError::MissingCredential(self.credential.clone()));
        }
        if !self.input_root.is_dir() {
            return Err(ConfigError::InputNotDirectory(self.input_root.clone()));
        }
        let parent = self.output_path.parent().unwrap_or_else(|| Path::new(""));
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(ConfigError::MissingOutputDir(parent.to_path_buf()));
        }
        Ok(())
    }
}
