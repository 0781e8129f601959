use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;

pub const DEFAULT_NOTIFICATION_REFRESH: Duration = Duration::from_secs(30);
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

const API_URL_VAR: &str = "DOCLIB_API_URL";
const STATE_DIR_VAR: &str = "DOCLIB_STATE_DIR";
const REFRESH_SECS_VAR: &str = "DOCLIB_REFRESH_SECS";
const DEBOUNCE_MS_VAR: &str = "DOCLIB_DEBOUNCE_MS";

/// Runtime settings shared by every surface of the client.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the backend API, including any path prefix.
    pub base_url: Url,
    /// Directory for the session cache and staged preview files.
    pub state_dir: PathBuf,
    /// How often the notification feed refreshes in the background.
    pub notification_refresh: Duration,
    /// How long search input must stay quiet before a query fires.
    pub search_debounce: Duration,
}

impl Config {
    pub fn new(mut base_url: Url) -> Self {
        // A trailing slash keeps Url::join from eating the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            state_dir: default_state_dir(),
            notification_refresh: DEFAULT_NOTIFICATION_REFRESH,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
        }
    }

    pub fn from_env() -> Result<Self> {
        let raw = env::var(API_URL_VAR)
            .with_context(|| format!("{API_URL_VAR} environment variable is not set"))?;
        let base_url = Url::parse(raw.trim())
            .with_context(|| format!("{API_URL_VAR} is not a valid URL: {raw}"))?;

        let mut config = Self::new(base_url);
        if let Ok(dir) = env::var(STATE_DIR_VAR) {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env::var(REFRESH_SECS_VAR).ok().and_then(|v| v.parse().ok()) {
            config.notification_refresh = Duration::from_secs(secs);
        }
        if let Some(ms) = env::var(DEBOUNCE_MS_VAR).ok().and_then(|v| v.parse().ok()) {
            config.search_debounce = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_notification_refresh(mut self, interval: Duration) -> Self {
        self.notification_refresh = interval;
        self
    }

    pub fn with_search_debounce(mut self, delay: Duration) -> Self {
        self.search_debounce = delay;
        self
    }

    /// Scheme and authority of the API with no path, query, or fragment.
    /// Relative asset paths sent by the server resolve against this.
    pub fn origin(&self) -> Url {
        let mut origin = self.base_url.clone();
        origin.set_path("");
        origin.set_query(None);
        origin.set_fragment(None);
        origin
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("doclib")
}
