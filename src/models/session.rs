//! Wire shapes of the analysis backend's session endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `POST /process_frame` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameRequest {
    /// `data:image/jpeg;base64,...`
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameResponse {
    pub total_blinks: u32,
    pub blink_rate: f64,
    #[serde(default)]
    pub message: String,
}

/// `POST /stop_detection` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopRequest {
    pub total_blinks: u32,
    pub blink_rate: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Authoritative totals the backend computed for the finished session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopResponse {
    pub total_blinks: u32,
    /// Seconds.
    pub duration: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub blink_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: DateTime<Utc>,
    pub total_blinks: u32,
    pub duration_secs: f64,
}

impl SessionSummary {
    pub fn from_response(
        session_id: String,
        started_at: Option<DateTime<Utc>>,
        stopped_at: DateTime<Utc>,
        response: &StopResponse,
    ) -> Self {
        Self {
            session_id,
            started_at,
            stopped_at,
            total_blinks: response.total_blinks,
            duration_secs: response.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_response_tolerates_extra_fields_and_missing_message() {
        let body = r#"{"total_blinks": 4, "blink_count": 2, "blink_rate": 12.5}"#;
        let parsed: FrameResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.total_blinks, 4);
        assert_eq!(parsed.blink_rate, 12.5);
        assert!(parsed.message.is_empty());
    }

    #[test]
    fn stop_request_omits_absent_identifiers() {
        let request = StopRequest {
            total_blinks: 3,
            blink_rate: 9.0,
            start_time: None,
            timestamp: "2026-10-19T09:00:00Z".parse().unwrap(),
            user_id: None,
            device_id: Some("2".into()),
            session_id: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("user_id").is_none());
        assert_eq!(value["device_id"], "2");
        assert_eq!(value["start_time"], serde_json::Value::Null);
        assert_eq!(value["timestamp"], "2026-10-19T09:00:00Z");
    }
}
