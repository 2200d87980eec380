//! Best-effort alert side channels: an audible chime and a desktop
//! notification. Failures are returned to the caller only so they can be
//! logged; they never feed into session state.

use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::AudioEngineHandle;
use crate::settings::AlertSettings;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "eyecare::alerts";

use crate::log_debug;

pub const NOTIFICATION_TITLE: &str = "EyeCare Alert";

pub trait AlertSink: Send + Sync + 'static {
    fn play_chime(&self) -> Result<(), String>;

    fn notify_desktop(&self, title: &str, body: &str) -> Result<(), String>;

    /// Whether the user is already looking at the app, in which case a desktop
    /// notification would duplicate the in-app message.
    fn is_foreground(&self) -> bool;
}

/// Chime through the rodio engine, notification through the platform's
/// notifier command.
pub struct SystemAlerts {
    audio: AudioEngineHandle,
    settings: AlertSettings,
    foreground: Arc<AtomicBool>,
}

impl SystemAlerts {
    pub fn new(audio: AudioEngineHandle, settings: AlertSettings) -> Self {
        Self {
            audio,
            settings,
            foreground: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag the host flips when its window gains or loses focus.
    pub fn foreground_flag(&self) -> Arc<AtomicBool> {
        self.foreground.clone()
    }
}

impl AlertSink for SystemAlerts {
    fn play_chime(&self) -> Result<(), String> {
        if !self.settings.chime_enabled {
            return Ok(());
        }
        self.audio.chime()
    }

    fn notify_desktop(&self, title: &str, body: &str) -> Result<(), String> {
        if !self.settings.desktop_enabled {
            return Ok(());
        }
        let mut command = notifier_command(title, body)
            .ok_or_else(|| "desktop notifications are not supported on this platform".to_string())?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|mut child| {
                log_debug!("desktop notification dispatched (pid {})", child.id());
                // Reap off-thread; the notifier may linger until dismissed.
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            })
            .map_err(|err| format!("desktop notifier failed to start: {err}"))
    }

    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }
}

fn notifier_command(title: &str, body: &str) -> Option<Command> {
    if cfg!(target_os = "macos") {
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            escape_applescript(body),
            escape_applescript(title)
        );
        let mut command = Command::new("osascript");
        command.args(["-e", script.as_str()]);
        Some(command)
    } else if cfg!(target_os = "linux") || cfg!(target_os = "freebsd") {
        let mut command = Command::new("notify-send");
        command.args(["--app-name=eyecare", title, body]);
        Some(command)
    } else {
        None
    }
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Sink that drops every alert; backs `detect --quiet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlerts;

impl AlertSink for SilentAlerts {
    fn play_chime(&self) -> Result<(), String> {
        Ok(())
    }

    fn notify_desktop(&self, _title: &str, _body: &str) -> Result<(), String> {
        Ok(())
    }

    fn is_foreground(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applescript_quotes_are_escaped() {
        assert_eq!(escape_applescript(r#"say "hi" \ bye"#), r#"say \"hi\" \\ bye"#);
    }

    #[test]
    fn disabled_channels_are_no_ops() {
        let alerts = SystemAlerts::new(
            AudioEngineHandle::new(),
            AlertSettings {
                chime_enabled: false,
                desktop_enabled: false,
            },
        );
        assert_eq!(alerts.play_chime(), Ok(()));
        assert_eq!(alerts.notify_desktop(NOTIFICATION_TITLE, "body"), Ok(()));
    }

    #[test]
    fn foreground_flag_is_shared() {
        let alerts = SystemAlerts::new(AudioEngineHandle::new(), AlertSettings::default());
        assert!(!alerts.is_foreground());
        alerts.foreground_flag().store(true, Ordering::SeqCst);
        assert!(alerts.is_foreground());
    }

    #[test]
    fn silent_alerts_swallow_everything() {
        let alerts = SilentAlerts;
        assert_eq!(alerts.play_chime(), Ok(()));
        assert_eq!(alerts.notify_desktop(NOTIFICATION_TITLE, "⚠️ blink more"), Ok(()));
        assert!(alerts.is_foreground());
    }
}
