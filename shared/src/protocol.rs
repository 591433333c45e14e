/// Device key shared by every message whose source could not be validated
pub const UNKNOWN_DEVICE: &str = "unknown-device";

/// Largest valid `<PRI>` value: facility 23 * 8 + severity 7
pub const MAX_PRIORITY: u16 = 191;

/// Default UDP port for the listener (non-privileged)
pub const DEFAULT_SYSLOG_PORT: u16 = 10514;

/// Largest payload a UDP datagram can carry
pub const MAX_UDP_PAYLOAD: usize = 65535;

/// Structured-data keys written by the normalizer
pub const SD_PRIORITY: &str = "priority";
pub const SD_FORMAT: &str = "format";
pub const SD_SENDER: &str = "sender";
pub const SD_MSGID: &str = "msgid";
pub const SD_PROCID: &str = "procid";
pub const SD_ELEMENTS: &str = "sd";
pub const SD_PREFIX: &str = "prefix";
pub const SD_TIMESTAMP_RAW: &str = "timestamp_raw";
pub const SD_TIMESTAMP_FALLBACK: &str = "timestamp_fallback";
