use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::persist::{self, PersistError};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_REALTIME_URL: &str = "ws://localhost:5000/ws";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TYPING_QUIET_MS: u64 = 3_000;
pub const DEFAULT_REMOTE_TYPING_TTL_MS: u64 = 5_000;
pub const SETTINGS_DIRECTORY_NAME: &str = "courier";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "COURIER_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_typing_quiet_ms")]
    pub typing_quiet_ms: u64,
    #[serde(default = "default_remote_typing_ttl_ms")]
    pub remote_typing_ttl_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            realtime_url: default_realtime_url(),
            request_timeout_secs: default_request_timeout_secs(),
            typing_quiet_ms: default_typing_quiet_ms(),
            remote_typing_ttl_ms: default_remote_typing_ttl_ms(),
        }
    }
}

impl ClientSettings {
    pub fn typing_quiet(&self) -> Duration {
        Duration::from_millis(self.typing_quiet_ms)
    }

    pub fn remote_typing_ttl(&self) -> Duration {
        Duration::from_millis(self.remote_typing_ttl_ms)
    }

    pub fn normalized(mut self) -> Self {
        self.api_base_url = non_blank_or(self.api_base_url, default_api_base_url);
        self.realtime_url = non_blank_or(self.realtime_url, default_realtime_url);

        // Zero durations would make every keystroke expire immediately.
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.typing_quiet_ms == 0 {
            self.typing_quiet_ms = default_typing_quiet_ms();
        }
        if self.remote_typing_ttl_ms == 0 {
            self.remote_typing_ttl_ms = default_remote_typing_ttl_ms();
        }

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".courier"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    /// Normalizes, writes and then publishes `settings`; the value in memory
    /// only changes once the file is in place.
    pub fn save(&self, settings: ClientSettings) -> Result<Arc<ClientSettings>, SettingsError> {
        let settings = Arc::new(settings.normalized());
        let content = serde_json::to_string_pretty(settings.as_ref()).context(EncodeSnafu {
            stage: "settings-encode",
        })?;
        persist::replace_file(&self.config_path, &content).context(StoreSnafu {
            stage: "settings-save",
        })?;

        self.settings.store(Arc::clone(&settings));
        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(settings)
    }

    fn load_from_disk(path: &Path) -> ClientSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let figment = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(SETTINGS_ENV_PREFIX));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to encode settings on `{stage}`: {source}"))]
    Encode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to store settings on `{stage}`: {source}"))]
    Store {
        stage: &'static str,
        source: PersistError,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_realtime_url() -> String {
    DEFAULT_REALTIME_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_typing_quiet_ms() -> u64 {
    DEFAULT_TYPING_QUIET_MS
}

fn default_remote_typing_ttl_ms() -> u64 {
    DEFAULT_REMOTE_TYPING_TTL_MS
}
