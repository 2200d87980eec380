use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub api_base: String,
    /// Opaque identifiers forwarded to the backend untouched.
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub request_timeout_ms: u64,
    pub history_limit: u32,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:5000".into(),
            user_id: None,
            device_id: None,
            request_timeout_ms: 5_000,
            history_limit: 50,
        }
    }
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    pub sample_period_ms: u64,
    /// Width of the frame sent to the backend; height follows the aspect ratio.
    pub frame_width: u32,
    pub jpeg_quality: u8,
    pub frame_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sample_period_ms: 300,
            frame_width: 320,
            jpeg_quality: 70,
            frame_attempts: 3,
            backoff_base_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraSettings {
    /// OpenCV device index; 0 is the system default camera.
    pub device_index: i32,
    /// Requested capture size. Devices may ignore it and deliver their own.
    pub capture_width: u32,
    pub capture_height: u32,
    pub capture_fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            capture_width: 640,
            capture_height: 480,
            capture_fps: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertSettings {
    pub chime_enabled: bool,
    pub desktop_enabled: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            chime_enabled: true,
            desktop_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub session: SessionSettings,
    pub camera: CameraSettings,
    pub alerts: AlertSettings,
}

impl Settings {
    /// Apply `EYECARE_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_base) = lookup("EYECARE_API_BASE").filter(|v| !v.is_empty()) {
            self.backend.api_base = api_base;
        }
        if let Some(user_id) = lookup("EYECARE_USER_ID").filter(|v| !v.is_empty()) {
            self.backend.user_id = Some(user_id);
        }
        if let Some(device_id) = lookup("EYECARE_DEVICE_ID").filter(|v| !v.is_empty()) {
            self.backend.device_id = Some(device_id);
        }
    }
}

pub fn debug_requested() -> bool {
    std::env::var("EYECARE_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid settings file {}", path.display()))?
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// File values with environment overrides applied.
    pub fn effective(&self) -> Settings {
        let mut settings = self.snapshot();
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    pub fn snapshot(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Write the current values out, creating parent directories.
    pub fn save(&self) -> Result<()> {
        let settings = self.snapshot();
        self.persist(&settings)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("eyecare-settings-{}-{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let store = SettingsStore::new(temp_path("missing").join("settings.json")).unwrap();
        let settings = store.snapshot();
        assert_eq!(settings.session.sample_period_ms, 300);
        assert_eq!(settings.session.frame_attempts, 3);
        assert_eq!(settings.backend.api_base, "http://127.0.0.1:5000");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = temp_path("partial");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, r#"{"session": {"sample_period_ms": 1000}}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().snapshot();
        assert_eq!(settings.session.sample_period_ms, 1000);
        assert_eq!(settings.session.jpeg_quality, 70);
        assert!(settings.alerts.chime_enabled);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn save_creates_parents_and_reloads() {
        let dir = temp_path("save");
        let path = dir.join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        store.save().unwrap();
        assert!(path.exists());

        let reloaded = SettingsStore::new(path.clone()).unwrap().snapshot();
        assert_eq!(reloaded, Settings::default());
        assert_eq!(reloaded.camera.device_index, 0);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn save_fills_defaults_around_file_values() {
        let dir = temp_path("roundtrip");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, r#"{"camera": {"device_index": 2}, "backend": {"device_id": "2"}}"#)
            .unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        store.save().unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["camera"]["device_index"], 2);
        assert_eq!(written["camera"]["capture_width"], 640);
        assert_eq!(written["backend"]["device_id"], "2");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn env_overrides_only_non_empty_values() {
        let mut settings = Settings::default();
        settings.apply_env(|key| match key {
            "EYECARE_API_BASE" => Some("http://10.0.0.5:5000".into()),
            "EYECARE_USER_ID" => Some(String::new()),
            "EYECARE_DEVICE_ID" => Some("7".into()),
            _ => None,
        });
        assert_eq!(settings.backend.api_base, "http://10.0.0.5:5000");
        assert_eq!(settings.backend.user_id, None);
        assert_eq!(settings.backend.device_id.as_deref(), Some("7"));
    }
}
