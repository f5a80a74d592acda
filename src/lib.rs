//! Headless-browser client for a conversational web app
//!
//! Drives a real Chrome instance against the chat app's prompt URLs, detects
//! when the remote model has finished generating, and extracts the answer
//! (text or a generated image) from an unstructured, frequently-changing SPA.

mod browser;
pub mod browser_setup;
pub mod catalog;
pub mod extract;
mod manager;
pub mod session;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::extract::ExtractConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the chat app.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Access token planted into page storage and sent as a bearer header.
    /// The `T3_ACCESS_TOKEN` environment variable overrides this.
    #[serde(default)]
    pub access_token: String,

    /// Path to the model catalog markdown file.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Model used when the caller doesn't name one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Pause after navigations for the SPA to hydrate.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub extract: ExtractConfig,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

fn default_base_url() -> String {
    "https://beta.t3.chat".to_string()
}

fn default_catalog_path() -> String {
    "models.md".to_string()
}

fn default_model() -> String {
    "Gemini 2.5 Flash".to_string()
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_headless() -> bool {
    true
}

fn default_disable_security() -> bool {
    false // SECURE BY DEFAULT
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: String::new(),
            catalog_path: default_catalog_path(),
            default_model: default_model(),
            settle_ms: default_settle_ms(),
            browser: BrowserConfig::default(),
            extract: ExtractConfig::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Config {
    /// Effective access token: environment variable wins over the config file
    /// so the token never has to live on disk.
    pub fn access_token(&self) -> &str {
        static ENV_TOKEN: std::sync::OnceLock<Option<String>> = std::sync::OnceLock::new();
        ENV_TOKEN
            .get_or_init(|| std::env::var("T3_ACCESS_TOKEN").ok())
            .as_deref()
            .unwrap_or(&self.access_token)
    }
}

/// Load config from config.yaml in package root
pub fn load_yaml_config() -> anyhow::Result<Config> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

pub use browser::{
    BrowserError, BrowserResult, BrowserWrapper, download_managed_browser,
    find_browser_executable, launch_browser,
};
pub use catalog::{Model, ModelCatalog, ModelTier};
pub use extract::{GenerationKind, RequestContext, RunOutcome, RunResult, run_extraction};
pub use manager::BrowserManager;
pub use session::{AskOutcome, ChatSession, SessionError};
