//! Extension settings: the persisted TOML file, its defaults, and the store that broadcasts
//! every change to the open pages.
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

pub const SETTINGS_VERSION: u32 = 1;
pub const DEFAULT_ITEM_ID_SELECTOR: &str = "#product-scan";
pub const DEFAULT_STATUS_ID_SELECTOR: &str = "#status-scan";
pub const DEFAULT_API_URL_PATTERN: &str = "/api/scan";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("toml encode: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("HOME is not set")]
    NoHome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url_pattern: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_item_selector")]
    pub item_id_selector: String,
    #[serde(default = "default_status_selector")]
    pub status_id_selector: String,
    #[serde(default = "default_api_pattern")]
    pub api_url_pattern: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorScheme {
    #[default]
    Default,
    HighContrast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub version: u32,
    pub item_id_selector: String,
    pub status_id_selector: String,
    pub api_url_pattern: String,
    pub audio_enabled: bool,
    pub audio_volume: u8,
    pub overlay_duration: u64,
    pub dismiss_key: String,
    pub color_scheme: ColorScheme,
    pub auto_focus_after_scan: bool,
    pub debug_mode: bool,
    pub max_history_entries: usize,
    pub intercept_form_submit: bool,
    // Arrays of tables must follow plain keys in TOML output.
    pub sites: Vec<SiteConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            item_id_selector: DEFAULT_ITEM_ID_SELECTOR.to_string(),
            status_id_selector: DEFAULT_STATUS_ID_SELECTOR.to_string(),
            api_url_pattern: DEFAULT_API_URL_PATTERN.to_string(),
            audio_enabled: true,
            audio_volume: 50,
            overlay_duration: 2000,
            dismiss_key: "Escape".to_string(),
            color_scheme: ColorScheme::Default,
            auto_focus_after_scan: true,
            debug_mode: false,
            max_history_entries: 100,
            intercept_form_submit: true,
            sites: Vec::new(),
        }
    }
}

impl Settings {
    /// Site list used for resolution. Settings without explicit sites apply the top-level
    /// selectors to every page.
    pub fn effective_sites(&self) -> Vec<SiteConfig> {
        if !self.sites.is_empty() {
            return self.sites.clone();
        }
        vec![SiteConfig {
            id: "default".to_string(),
            name: "Default".to_string(),
            url_pattern: ".*".to_string(),
            enabled: true,
            item_id_selector: self.item_id_selector.clone(),
            status_id_selector: self.status_id_selector.clone(),
            api_url_pattern: self.api_url_pattern.clone(),
        }]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overlay_duration == 0 {
            return Err(ConfigError::Invalid("overlayDuration must be > 0".into()));
        }
        if self.audio_volume > 100 {
            return Err(ConfigError::Invalid("audioVolume must be within 0..=100".into()));
        }
        if self.max_history_entries == 0 {
            return Err(ConfigError::Invalid("maxHistoryEntries must be > 0".into()));
        }
        if self.dismiss_key.trim().is_empty() {
            return Err(ConfigError::Invalid("dismissKey must not be empty".into()));
        }
        for site in &self.sites {
            if site.id.trim().is_empty() {
                return Err(ConfigError::Invalid("site id must not be empty".into()));
            }
            if site.item_id_selector.trim().is_empty() || site.status_id_selector.trim().is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "site {}: selectors must not be empty",
                    site.id
                )));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_item_selector() -> String {
    DEFAULT_ITEM_ID_SELECTOR.to_string()
}

fn default_status_selector() -> String {
    DEFAULT_STATUS_ID_SELECTOR.to_string()
}

fn default_api_pattern() -> String {
    DEFAULT_API_URL_PATTERN.to_string()
}

pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".scan-overlay"))
}

pub fn default_settings_path() -> Result<PathBuf, ConfigError> {
    Ok(get_config_dir()?.join("settings.toml"))
}

pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Reads the settings file, writing the defaults first when it does not exist. A file that
/// does not parse falls back to defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        let settings = Settings::default();
        write_settings(path, &settings)?;
        info!(path = %path.display(), "wrote default settings");
        return Ok(settings);
    }

    let content = std::fs::read_to_string(path)?;
    Ok(parse_settings(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "settings did not parse, using defaults");
        Settings::default()
    }))
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Owns the current settings. `save` is the only write path; every accepted change is
/// broadcast to subscribers.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
    tx: broadcast::Sender<Settings>,
}

impl SettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = load_settings(&path)?;
        let (tx, _) = broadcast::channel(16);
        Ok(Self {
            path,
            current: RwLock::new(settings),
            tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Settings {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn save(&self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        write_settings(&self.path, &settings)?;
        self.replace(settings);
        Ok(())
    }

    /// Re-reads the file. Returns whether the settings changed.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let content = std::fs::read_to_string(&self.path)?;
        let settings = parse_settings(&content)?;
        settings.validate()?;
        if settings == self.current() {
            debug!("settings file touched without changes");
            return Ok(false);
        }
        self.replace(settings);
        Ok(true)
    }

    fn replace(&self, settings: Settings) {
        match self.current.write() {
            Ok(mut guard) => *guard = settings.clone(),
            Err(poisoned) => *poisoned.into_inner() = settings.clone(),
        }
        let receivers = self.tx.send(settings).unwrap_or(0);
        debug!(receivers, "settings broadcast");
    }

    /// Watches the settings file and reloads on external edits. The returned watcher must be
    /// kept alive.
    pub fn watch(self: &std::sync::Arc<Self>) -> Result<RecommendedWatcher, ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "settings watcher error"),
            }
        })
        .map_err(|e| ConfigError::Invalid(format!("watcher: {e}")))?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Invalid(format!("watch {}: {e}", dir.display())))?;

        let store = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                match store.reload() {
                    Ok(true) => info!("settings reloaded from disk"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "settings reload failed"),
                }
            }
        });
        Ok(watcher)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
