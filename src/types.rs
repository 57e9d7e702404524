use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateStatus {
    Registered,
    Unregistered,
}

impl PlateStatus {
    /// Reads a status label, treating anything that is not clearly
    /// "registered" as unregistered, the way the service defaults it.
    pub fn lenient(label: &str) -> PlateStatus {
        let label = label.to_lowercase();
        if label.contains("registered") && !label.contains("unregistered") {
            PlateStatus::Registered
        } else {
            PlateStatus::Unregistered
        }
    }
}

impl Default for PlateStatus {
    fn default() -> Self {
        PlateStatus::Unregistered
    }
}

impl fmt::Display for PlateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlateStatus::Registered => f.write_str("registered"),
            PlateStatus::Unregistered => f.write_str("unregistered"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub plate_number: String,
    pub status: PlateStatus,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleInfo>,
}

impl DetectionEvent {
    pub fn parse(s: &str) -> serde_json::Result<DetectionEvent> {
        serde_json::from_str(s)
    }

    pub fn is_registered(&self) -> bool {
        self.status == PlateStatus::Registered
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub id: i64,
    pub name: String,
    pub plate_number: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub date_registered: DateTime<Utc>,
}

/// Body for creating or replacing a vehicle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewVehicle {
    pub name: String,
    pub plate_number: String,
    pub purpose: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub plate_number: String,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: PlateStatus,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub vehicle_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLogEntry {
    pub plate_number: String,
    pub status: PlateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<i64>,
}

fn lenient_status<'de, D>(deserializer: D) -> Result<PlateStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let label: Option<String> = Option::deserialize(deserializer)?;
    Ok(label.map(|l| PlateStatus::lenient(&l)).unwrap_or_default())
}

/// The service writes both offset-aware RFC 3339 timestamps and naive
/// ISO-8601 ones; naive values are UTC.
pub mod timestamp {
    use super::*;
    use serde::de::Error;

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| D::Error::custom(format!("invalid timestamp {:?}", s)))
    }
}
