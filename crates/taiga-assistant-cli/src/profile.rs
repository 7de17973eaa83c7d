use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_BACKEND_URL: &str = "https://api.taiga.io/api/v1";

/// Where the assistant server lives and who we are on the Taiga side
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Profile {
    pub server_url: String,
    pub backend_url: String,
    pub username: String,
    pub token: String,
}

pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("taiga-assistant");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }
    Ok(config_dir)
}

pub fn profile_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("profile.yaml"))
}

impl Profile {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let profile = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid profile at {}", path.display()))?;
        Ok(Some(profile))
    }

    /// Load the saved profile or explain how to create one
    pub fn require(path: &Path) -> Result<Self> {
        Self::load(path)?.ok_or_else(|| {
            anyhow::anyhow!("Not logged in. Run `taiga-assistant login` first.")
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}
