use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_PREFIX;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  pub app: AppConfig,
  #[serde(default)]
  pub worker: WorkerConfig,
  #[serde(default)]
  pub precache: PrecacheConfig,
  #[serde(default)]
  pub offline: OfflineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Base URL of the hosted backend (REST and auth live under it)
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Origin the application shell is served from
  pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Name of the current cache generation; bump to invalidate everything
  pub cache_name: String,
  /// Path prefix of immutable build assets
  pub static_prefix: String,
  /// Document served for navigations that are neither cached nor reachable
  pub offline_document: String,
  /// Assets that must all be fetched for install to succeed
  pub shell_assets: Vec<String>,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      cache_name: "hacktrackr-pwa-v1".to_string(),
      static_prefix: "/_next/static/".to_string(),
      offline_document: "/offline.html".to_string(),
      shell_assets: [
        "/",
        "/offline.html",
        "/icon.svg",
        "/apple-icon.png",
        "/icon-light-32x32.png",
        "/icon-dark-32x32.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrecacheConfig {
  /// Shell routes warmed right after sign-in
  pub routes: Vec<String>,
  /// Rows per id page
  pub page_size: usize,
  /// URLs per worker message
  pub batch_size: usize,
}

impl Default for PrecacheConfig {
  fn default() -> Self {
    Self {
      routes: [
        "/",
        "/dashboard",
        "/tasks",
        "/hackathons",
        "/calendar",
        "/team",
        "/settings",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      page_size: 500,
      batch_size: 150,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
  /// Namespace of local cache keys
  pub cache_prefix: String,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      cache_prefix: DEFAULT_PREFIX.to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hacknotify.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hacknotify/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/hacknotify/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hacknotify.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hacknotify").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;

    if config.precache.page_size == 0 || config.precache.batch_size == 0 {
      return Err(eyre!("precache page_size and batch_size must be positive"));
    }

    Ok(config)
  }

  /// Get the backend's public API key from environment variables.
  ///
  /// Checks HACKNOTIFY_ANON_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_anon_key() -> Result<String> {
    std::env::var("HACKNOTIFY_ANON_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Backend API key not found. Set HACKNOTIFY_ANON_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Get the sign-in password from environment variables.
  ///
  /// Checks HACKNOTIFY_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("HACKNOTIFY_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set HACKNOTIFY_PASSWORD environment variable."))
  }
}
