use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Serialize, Deserialize, Clone)]
pub struct AuthoringConfig {
    #[serde(default = "default_studio_base_url")]
    pub studio_base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_true")]
    pub show_previews: bool,
}

fn default_studio_base_url() -> String {
    "http://localhost:18010".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

impl Default for AuthoringConfig {
    fn default() -> Self {
        Self {
            studio_base_url: default_studio_base_url(),
            page_size: default_page_size(),
            show_previews: true,
        }
    }
}

pub fn load_config(config_path: &Path) -> AuthoringConfig {
    if !config_path.exists() {
        info!("No config found, creating default config");
        let default = AuthoringConfig::default();
        if let Ok(json) = serde_json::to_string_pretty(&default) {
            let _ = std::fs::write(config_path, json);
        }
        return default;
    }
    let content = std::fs::read_to_string(config_path).unwrap_or_default();
    match serde_json::from_str::<AuthoringConfig>(&content) {
        Ok(config) => {
            info!("Config loaded from {:?}", config_path);
            if config.page_size == 0 {
                warn!("Configured page_size of 0 is invalid, using default");
                return AuthoringConfig {
                    page_size: default_page_size(),
                    ..config
                };
            }
            config
        }
        Err(_) => {
            warn!("Config parse failed, rewriting defaults");
            let default = AuthoringConfig::default();
            if let Ok(json) = serde_json::to_string_pretty(&default) {
                let _ = std::fs::write(config_path, json);
            }
            default
        }
    }
}

pub struct ConfigState {
    pub config: Arc<Mutex<AuthoringConfig>>,
    pub path: PathBuf,
}

impl ConfigState {
    pub fn new(config: AuthoringConfig, path: PathBuf) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            path,
        }
    }

    pub async fn save(&self) -> Result<()> {
        let config = self.config.lock().await;
        let content = serde_json::to_string_pretty(&*config)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("writing config to {:?}", self.path))?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// Persisted counterpart of the listing's "show previews" toggle.
    pub async fn set_show_previews(&self, value: bool) -> Result<()> {
        {
            let mut config = self.config.lock().await;
            config.show_previews = value;
        }
        self.save().await
    }
}
