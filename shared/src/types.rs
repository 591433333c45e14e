use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use crate::protocol::MAX_PRIORITY;

/// Syslog severity (RFC 5424 §6.2.1), 0 = emergency through 7 = debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

const SEVERITIES: [Severity; 8] = [
    Severity::Emergency,
    Severity::Alert,
    Severity::Critical,
    Severity::Error,
    Severity::Warning,
    Severity::Notice,
    Severity::Info,
    Severity::Debug,
];

const SEVERITY_NAMES: [&str; 8] = [
    "emergency", "alert", "critical", "error",
    "warning", "notice", "info", "debug",
];

impl Severity {
    /// Look up a severity by its numeric code. Codes above 7 have no level.
    pub fn from_code(code: u8) -> Option<Self> {
        SEVERITIES.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        SEVERITY_NAMES[self as usize]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded `<PRI>` value.
///
/// Facility and severity only ever exist together, so a record carries an
/// `Option<Priority>` rather than two independent optionals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    facility: u8,
    severity: Severity,
}

impl Priority {
    /// Decode a raw priority. Values above 191 are not valid syslog priorities.
    pub fn from_raw(pri: u16) -> Option<Self> {
        if pri > MAX_PRIORITY {
            return None;
        }
        Some(Self {
            facility: (pri >> 3) as u8,
            severity: Severity::from_code((pri & 0x07) as u8)?,
        })
    }

    pub fn facility(&self) -> u8 {
        self.facility
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Recombine into the wire value, `facility * 8 + severity`
    pub fn raw(&self) -> u16 {
        u16::from(self.facility) * 8 + u16::from(self.severity.code())
    }
}

/// The normalized, format-independent form of one syslog message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalLogRecord {
    /// Validated hostname or IP, or the `unknown-device` sentinel
    pub source_identifier: String,

    /// Message time in UTC (receipt time when the message carried none)
    pub timestamp: DateTime<Utc>,

    /// Decoded priority, absent when the message had no valid `<PRI>`
    pub priority: Option<Priority>,

    pub process_name: Option<String>,

    pub process_id: Option<u32>,

    /// Cleaned message content, never empty of meaning: falls back to the raw text
    pub message: String,

    /// The decoded datagram, untouched
    pub raw_message: String,

    /// Fields with no dedicated column, stored verbatim by the persistence layer
    pub structured_data: Option<Map<String, Value>>,
}

impl CanonicalLogRecord {
    pub fn facility(&self) -> Option<u8> {
        self.priority.map(|p| p.facility())
    }

    pub fn severity(&self) -> Option<Severity> {
        self.priority.map(|p| p.severity())
    }

    /// Named level derived from severity, e.g. "info"
    pub fn level(&self) -> Option<&'static str> {
        self.severity().map(Severity::as_str)
    }
}

/// A registered log source, keyed by `ip_address` (hostname or IP literal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn default_name(ip_address: &str) -> String {
        format!("Device-{}", ip_address)
    }

    pub fn default_description(ip_address: &str) -> String {
        format!("Auto-created device for {}", ip_address)
    }
}

/// Persisted form of a [`CanonicalLogRecord`].
///
/// The `pushed_*` / `push_*` fields belong to the downstream AI consumer; the
/// listener only writes their initial values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub device_id: i64,
    pub device_ip: String,
    pub timestamp: DateTime<Utc>,
    pub log_level: Option<String>,
    pub facility: Option<u8>,
    pub severity: Option<u8>,
    pub process_name: Option<String>,
    pub process_id: Option<u32>,
    pub message: String,
    pub raw_message: String,
    pub structured_data: Option<Value>,
    pub pushed_to_ai: bool,
    pub pushed_at: Option<DateTime<Utc>>,
    pub push_attempts: u32,
    pub last_push_error: Option<String>,
}

/// Store-wide aggregates, computed on demand from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub devices: u64,
    pub log_entries: u64,
    /// Entries whose message timestamp falls after the summary cutoff
    pub recent_entries: u64,
    pub levels: Vec<LevelCount>,
    pub top_devices: Vec<DeviceCount>,
    pub latest: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCount {
    /// `None` for messages without a valid priority
    pub log_level: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCount {
    pub device_ip: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_decodes_facility_and_severity() {
        let pri = Priority::from_raw(134).unwrap();
        assert_eq!(pri.facility(), 16);
        assert_eq!(pri.severity(), Severity::Info);
        assert_eq!(pri.raw(), 134);
    }

    #[test]
    fn test_priority_rejects_out_of_range() {
        assert!(Priority::from_raw(191).is_some());
        assert!(Priority::from_raw(192).is_none());
        assert!(Priority::from_raw(999).is_none());
    }

    #[test]
    fn test_all_priorities_recombine() {
        for p in 0..=MAX_PRIORITY {
            let pri = Priority::from_raw(p).unwrap();
            assert_eq!(u16::from(pri.facility()), p >> 3);
            assert_eq!(u16::from(pri.severity().code()), p & 7);
            assert_eq!(pri.raw(), p);
        }
    }

    #[test]
    fn test_severity_names() {
        assert_eq!(Severity::from_code(0).unwrap().as_str(), "emergency");
        assert_eq!(Severity::from_code(6).unwrap().to_string(), "info");
        assert_eq!(Severity::from_code(7).unwrap().as_str(), "debug");
        assert!(Severity::from_code(8).is_none());
    }

    #[test]
    fn test_device_defaults() {
        assert_eq!(Device::default_name("10.0.0.1"), "Device-10.0.0.1");
        assert_eq!(
            Device::default_description("router"),
            "Auto-created device for router"
        );
    }
}
