use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A restriction window definition, fetched fresh from the control plane
/// each cycle. Times are "HH:MM" 24-hour strings; a value that does not
/// parse makes the schedule never-active (see `schedule` module).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: i64,

    /// Human-readable label, not used in evaluation
    pub name: String,

    /// Window start, "HH:MM"
    pub start_time: String,

    /// Window end, "HH:MM"
    pub end_time: String,

    /// Lowercase canonical day names ("monday" .. "sunday")
    pub days_of_week: Vec<String>,

    /// An inactive schedule never matches regardless of time or day
    pub is_active: bool,
}

/// Outbound status snapshot, built fresh on every enforcement transition
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusReport {
    pub device_id: String,
    pub is_locked: bool,

    /// Epoch milliseconds at the time the report was built
    pub last_checked: i64,

    /// Best-effort battery percentage (100 when unreadable)
    pub battery_level: u8,

    pub is_online: bool,
}

impl DeviceStatusReport {
    /// Build a report for the current instant
    pub fn now(device_id: &str, is_locked: bool, battery_level: u8) -> Self {
        Self {
            device_id: device_id.to_string(),
            is_locked,
            last_checked: Utc::now().timestamp_millis(),
            battery_level,
            is_online: true,
        }
    }
}

/// Registration payload sent once when the device is enrolled
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistration {
    pub device_id: String,
    pub device_name: String,
    pub child_name: String,
    pub parent_phone: String,
    pub device_model: String,
    pub device_brand: String,
    pub os_version: String,
}

/// Response envelope used by the control plane's mutating endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

/// Heartbeat timestamp in the wire format the control plane expects
pub fn heartbeat_timestamp(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_deserializes_from_control_plane_json() {
        let json = r#"{
            "id": 7,
            "name": "School night",
            "startTime": "21:00",
            "endTime": "07:00",
            "daysOfWeek": ["sunday", "monday", "tuesday", "wednesday", "thursday"],
            "isActive": true
        }"#;

        let schedule: Schedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.id, 7);
        assert_eq!(schedule.start_time, "21:00");
        assert_eq!(schedule.days_of_week.len(), 5);
        assert!(schedule.is_active);
    }

    #[test]
    fn status_report_serializes_camel_case() {
        let report = DeviceStatusReport::now("device-1", true, 85);
        let json = serde_json::to_string(&report).unwrap();

        assert!(json.contains("\"deviceId\":\"device-1\""));
        assert!(json.contains("\"isLocked\":true"));
        assert!(json.contains("\"batteryLevel\":85"));
        assert!(json.contains("\"isOnline\":true"));
    }

    #[test]
    fn api_response_tolerates_missing_data_and_message() {
        let json = r#"{"success": true, "data": null, "message": null}"#;
        let ack: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(ack.success);
        assert!(ack.data.is_none());
    }

    #[test]
    fn heartbeat_timestamp_is_epoch_millis() {
        let now = Utc::now();
        assert_eq!(heartbeat_timestamp(now), now.timestamp_millis());
    }
}
