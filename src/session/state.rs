use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FrameResponse;

/// Backend message prefixes. The backend marks alerts and completion by
/// prefixing the message; anything else is neutral.
pub const WARNING_PREFIX: &str = "⚠️";
pub const SUCCESS_PREFIX: &str = "✅";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Acquiring,
    Active,
    Stopping,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlinkStats {
    pub total_blinks: u32,
    pub blink_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WarningKind {
    Warning,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub message: String,
    pub kind: WarningKind,
    /// Offer a jump to the history view (set after a successful save).
    pub show_history_link: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Warning,
    Success,
    Neutral,
}

pub fn classify_message(message: &str) -> MessageClass {
    let message = message.trim_start();
    if message.starts_with(WARNING_PREFIX) {
        MessageClass::Warning
    } else if message.starts_with(SUCCESS_PREFIX) {
        MessageClass::Success
    } else {
        MessageClass::Neutral
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: SessionPhase,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stats: BlinkStats,
    pub warning: Option<Warning>,
    /// Bumped on every start so results from an earlier session are ignored.
    #[serde(skip)]
    pub epoch: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_acquiring(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.phase = SessionPhase::Acquiring;
        self.epoch
    }

    pub fn activate(&mut self, session_id: String, started_at: DateTime<Utc>) {
        self.phase = SessionPhase::Active;
        self.session_id = Some(session_id);
        self.started_at = Some(started_at);
        self.stats = BlinkStats::default();
        self.warning = None;
    }

    /// True while `epoch` names the running session.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.phase == SessionPhase::Active && self.epoch == epoch
    }

    pub fn set_warning(&mut self, kind: WarningKind, message: impl Into<String>) {
        self.warning = Some(Warning {
            message: message.into(),
            kind,
            show_history_link: false,
        });
    }

    /// Fold one frame result into the session and classify its message.
    pub fn apply_frame_response(&mut self, response: &FrameResponse) -> MessageClass {
        self.stats = BlinkStats {
            total_blinks: response.total_blinks,
            blink_rate: response.blink_rate.max(0.0),
        };
        self.apply_message(&response.message)
    }

    pub fn apply_message(&mut self, message: &str) -> MessageClass {
        let class = classify_message(message);
        match class {
            MessageClass::Warning => self.set_warning(WarningKind::Warning, message),
            MessageClass::Success => self.set_warning(WarningKind::Success, message),
            MessageClass::Neutral => {
                // A completion message outlives the neutral ticks after it.
                if matches!(&self.warning, Some(w) if w.kind == WarningKind::Warning) {
                    self.warning = None;
                }
            }
        }
        class
    }

    /// Back to `Idle` with zeroed stats. The warning stays so the reason for
    /// ending is still visible.
    pub fn reset_to_idle(&mut self) {
        self.phase = SessionPhase::Idle;
        self.session_id = None;
        self.started_at = None;
        self.stats = BlinkStats::default();
    }
}
