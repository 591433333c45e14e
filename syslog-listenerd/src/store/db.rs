use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use shared::types::{CanonicalLogRecord, Device, DeviceCount, LevelCount, LogEntry, StoreSummary};
use super::error::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TOP_DEVICES: u32 = 10;
const LATEST_ENTRIES: u32 = 5;

const DEVICE_COLUMNS: &str = "id, name, ip_address, description, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, device_id, device_ip, timestamp, log_level, facility, severity,
    process_name, process_id, message, raw_message, structured_data,
    pushed_to_ai, pushed_at, push_attempts, last_push_error";

/// Result of persisting one record
#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub device: Device,
    /// True when this message caused the device to be registered
    pub device_created: bool,
    pub entry_id: i64,
}

pub struct LogDb {
    conn: Connection,
}

impl LogDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;

        // Enable WAL mode for better concurrency and crash recovery
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("Failed to configure database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                ip_address  TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS log_entries (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id       INTEGER NOT NULL REFERENCES devices(id),
                device_ip       TEXT NOT NULL,
                timestamp       TEXT NOT NULL,
                log_level       TEXT,
                facility        INTEGER,
                severity        INTEGER,
                process_name    TEXT,
                process_id      INTEGER,
                message         TEXT NOT NULL,
                raw_message     TEXT,
                structured_data TEXT,
                pushed_to_ai    INTEGER NOT NULL DEFAULT 0,
                pushed_at       TEXT,
                push_attempts   INTEGER NOT NULL DEFAULT 0,
                last_push_error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_log_entries_device ON log_entries(device_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_log_entries_pushed ON log_entries(pushed_to_ai);
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Look up the device for `ip_address`, registering it if absent.
    /// Returns the device and whether this call created it.
    pub fn resolve_device(&self, ip_address: &str) -> Result<(Device, bool), StoreError> {
        Ok(get_or_create_device(&self.conn, ip_address)?)
    }

    /// Store one record: device get-or-create and log insert commit together
    /// or not at all.
    pub fn persist(&mut self, record: &CanonicalLogRecord) -> Result<PersistOutcome, StoreError> {
        let structured_data = record
            .structured_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Take the write lock before reading the device row
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (device, device_created) = get_or_create_device(&tx, &record.source_identifier)?;

        tx.execute(
            r#"
            INSERT INTO log_entries (
                device_id, device_ip, timestamp, log_level, facility, severity,
                process_name, process_id, message, raw_message, structured_data,
                pushed_to_ai, push_attempts
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, 0)
            "#,
            params![
                device.id,
                &device.ip_address,
                record.timestamp.to_rfc3339(),
                record.level(),
                record.facility(),
                record.severity().map(|s| s.code()),
                &record.process_name,
                record.process_id,
                &record.message,
                &record.raw_message,
                structured_data,
            ],
        )?;
        let entry_id = tx.last_insert_rowid();

        tx.commit()?;

        Ok(PersistOutcome {
            device,
            device_created,
            entry_id,
        })
    }

    /// Get a single device by its key
    pub fn get_device(&self, ip_address: &str) -> Result<Option<Device>, StoreError> {
        let device = self
            .conn
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE ip_address = ?1"),
                params![ip_address],
                row_to_device,
            )
            .optional()?;

        Ok(device)
    }

    /// Get all devices, oldest first
    pub fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY id"))?;

        let devices = stmt
            .query_map([], row_to_device)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(devices)
    }

    /// Most recent entries for a device, newest first
    pub fn recent_entries(&self, device_ip: &str, limit: u32) -> Result<Vec<LogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM log_entries WHERE device_ip = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;

        let entries = stmt
            .query_map(params![device_ip, limit], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    pub fn count_entries(&self) -> Result<u64, StoreError> {
        self.count("SELECT COUNT(*) FROM log_entries", [])
    }

    /// Totals, per-level and per-device breakdowns, and the newest entries
    /// across all devices. `since` bounds the recent-activity count.
    pub fn summary(&self, since: DateTime<Utc>) -> Result<StoreSummary, StoreError> {
        let devices = self.count("SELECT COUNT(*) FROM devices", [])?;
        let log_entries = self.count_entries()?;
        let recent_entries = self.count(
            "SELECT COUNT(*) FROM log_entries WHERE timestamp > ?1",
            params![since.to_rfc3339()],
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT log_level, COUNT(*) AS n FROM log_entries
             GROUP BY log_level ORDER BY n DESC, log_level",
        )?;
        let levels = stmt
            .query_map([], |row| {
                Ok(LevelCount {
                    log_level: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT device_ip, COUNT(*) AS n FROM log_entries
             GROUP BY device_ip ORDER BY n DESC, device_ip LIMIT ?1",
        )?;
        let top_devices = stmt
            .query_map(params![TOP_DEVICES], |row| {
                Ok(DeviceCount {
                    device_ip: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM log_entries ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let latest = stmt
            .query_map(params![LATEST_ENTRIES], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StoreSummary {
            devices,
            log_entries,
            recent_entries,
            levels,
            top_devices,
            latest,
        })
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(sql, params, |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Atomic get-or-create keyed on the UNIQUE `ip_address` column. The insert
/// is a no-op when another writer got there first, so concurrent callers all
/// end up with the same row.
fn get_or_create_device(conn: &Connection, ip_address: &str) -> Result<(Device, bool), rusqlite::Error> {
    let now = Utc::now().to_rfc3339();

    let inserted = conn.execute(
        r#"
        INSERT INTO devices (name, ip_address, description, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        ON CONFLICT(ip_address) DO NOTHING
        "#,
        params![
            Device::default_name(ip_address),
            ip_address,
            Device::default_description(ip_address),
            now,
        ],
    )?;

    let device = conn.query_row(
        &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE ip_address = ?1"),
        params![ip_address],
        row_to_device,
    )?;

    Ok((device, inserted == 1))
}

fn parse_time(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))
}

fn row_to_device(row: &rusqlite::Row) -> Result<Device, rusqlite::Error> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(Device {
        id: row.get(0)?,
        name: row.get(1)?,
        ip_address: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_time(4, &created_at)?,
        updated_at: parse_time(5, &updated_at)?,
    })
}

fn row_to_entry(row: &rusqlite::Row) -> Result<LogEntry, rusqlite::Error> {
    let timestamp: String = row.get(3)?;
    let structured_json: Option<String> = row.get(11)?;
    let pushed_at: Option<String> = row.get(13)?;

    let structured_data = structured_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
            11,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))?;

    Ok(LogEntry {
        id: row.get(0)?,
        device_id: row.get(1)?,
        device_ip: row.get(2)?,
        timestamp: parse_time(3, &timestamp)?,
        log_level: row.get(4)?,
        facility: row.get(5)?,
        severity: row.get(6)?,
        process_name: row.get(7)?,
        process_id: row.get(8)?,
        message: row.get(9)?,
        raw_message: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        structured_data,
        pushed_to_ai: row.get::<_, i32>(12)? != 0,
        pushed_at: pushed_at.as_deref().map(|s| parse_time(13, s)).transpose()?,
        push_attempts: row.get(14)?,
        last_push_error: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use chrono::TimeZone;
    use serde_json::json;
    use shared::protocol::UNKNOWN_DEVICE;
    use crate::parser::normalize;

    fn record(raw: &str) -> CanonicalLogRecord {
        let received = Utc.with_ymd_and_hms(2025, 12, 20, 8, 0, 0).unwrap();
        normalize(raw, received, None)
    }

    #[test]
    fn test_persist_creates_device_and_entry() {
        let mut db = LogDb::open(":memory:").unwrap();
        let rec = record("<134>Dec 15 10:30:45 router sshd[1234]: Failed password for user admin");

        let outcome = db.persist(&rec).unwrap();
        assert!(outcome.device_created);
        assert_eq!(outcome.device.ip_address, "router");
        assert_eq!(outcome.device.name, "Device-router");
        assert_eq!(outcome.device.description.as_deref(), Some("Auto-created device for router"));

        let entries = db.recent_entries("router", 10).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, outcome.entry_id);
        assert_eq!(entry.device_id, outcome.device.id);
        assert_eq!(entry.device_ip, "router");
        assert_eq!(entry.timestamp, rec.timestamp);
        assert_eq!(entry.log_level.as_deref(), Some("info"));
        assert_eq!(entry.facility, Some(16));
        assert_eq!(entry.severity, Some(6));
        assert_eq!(entry.process_name.as_deref(), Some("sshd"));
        assert_eq!(entry.process_id, Some(1234));
        assert_eq!(entry.message, "Failed password for user admin");
        assert_eq!(entry.raw_message, rec.raw_message);
        assert_eq!(entry.structured_data.as_ref().unwrap()["priority"], json!(134));
        assert!(!entry.pushed_to_ai);
        assert_eq!(entry.pushed_at, None);
        assert_eq!(entry.push_attempts, 0);
        assert_eq!(entry.last_push_error, None);
    }

    #[test]
    fn test_second_message_reuses_device() {
        let mut db = LogDb::open(":memory:").unwrap();

        let first = db.persist(&record("Dec 15 10:30:45 router kernel: up")).unwrap();
        let second = db.persist(&record("Dec 15 10:30:46 router kernel: down")).unwrap();

        assert!(first.device_created);
        assert!(!second.device_created);
        assert_eq!(first.device.id, second.device.id);
        assert_eq!(db.list_devices().unwrap().len(), 1);
        assert_eq!(db.count_entries().unwrap(), 2);

        let entries = db.recent_entries("router", 1).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "down");
    }

    #[test]
    fn test_unparseable_sources_share_sentinel_device() {
        let mut db = LogDb::open(":memory:").unwrap();

        let a = db.persist(&record("23 something garbled")).unwrap();
        let b = db.persist(&record("more garbage without structure")).unwrap();

        assert_eq!(a.device.ip_address, UNKNOWN_DEVICE);
        assert_eq!(a.device.id, b.device.id);

        let entries = db.recent_entries(UNKNOWN_DEVICE, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, "23 something garbled");
        assert_eq!(entries[1].log_level, None);
        assert_eq!(entries[1].facility, None);
    }

    #[test]
    fn test_resolve_device_is_idempotent() {
        let db = LogDb::open(":memory:").unwrap();

        let (created, was_new) = db.resolve_device("10.0.0.1").unwrap();
        let (again, again_new) = db.resolve_device("10.0.0.1").unwrap();

        assert!(was_new);
        assert!(!again_new);
        assert_eq!(created, again);
        assert_eq!(db.get_device("10.0.0.1").unwrap(), Some(created));
        assert_eq!(db.get_device("10.0.0.2").unwrap(), None);
    }

    #[test]
    fn test_concurrent_resolution_creates_one_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");
        LogDb::open(&path).unwrap();

        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let db = LogDb::open(&path).unwrap();
                    barrier.wait();
                    db.resolve_device("192.168.1.100").unwrap()
                })
            })
            .collect();

        let results: Vec<(Device, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let created = results.iter().filter(|(_, new)| *new).count();
        assert_eq!(created, 1, "exactly one resolver should create the device");
        assert!(results.iter().all(|(d, _)| d.id == results[0].0.id));

        let db = LogDb::open(&path).unwrap();
        assert_eq!(db.list_devices().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_persist_from_new_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");
        LogDb::open(&path).unwrap();

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let mut db = LogDb::open(&path).unwrap();
                    let rec = record(&format!("<14>Dec 15 10:30:4{i} fresh-host app: message {i}"));
                    barrier.wait();
                    db.persist(&rec).unwrap()
                })
            })
            .collect();

        let outcomes: Vec<PersistOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| o.device_created).count(), 1);

        let db = LogDb::open(&path).unwrap();
        assert_eq!(db.list_devices().unwrap().len(), 1);
        assert_eq!(db.count_entries().unwrap(), 4);
    }

    fn summary_db() -> LogDb {
        let mut db = LogDb::open(":memory:").unwrap();
        for raw in [
            "<134>Dec 19 09:00:00 router sshd: a",
            "<131>Dec 20 07:00:00 router sshd: b",
            "<134>Dec 20 07:30:00 switch kernel: c",
            "Dec 20 07:45:00 switch kernel: d",
            "23 garbled",
        ] {
            db.persist(&record(raw)).unwrap();
        }
        db
    }

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_summary_totals() {
        let summary = summary_db().summary(cutoff()).unwrap();
        assert_eq!(summary.devices, 3);
        assert_eq!(summary.log_entries, 5);
        assert_eq!(summary.recent_entries, 4);
    }

    #[test]
    fn test_summary_level_breakdown() {
        let summary = summary_db().summary(cutoff()).unwrap();
        let level = |name: Option<&str>, count| LevelCount {
            log_level: name.map(str::to_string),
            count,
        };
        assert_eq!(
            summary.levels,
            vec![level(None, 2), level(Some("info"), 2), level(Some("error"), 1)]
        );
    }

    #[test]
    fn test_summary_top_devices() {
        let summary = summary_db().summary(cutoff()).unwrap();
        let top: Vec<_> = summary
            .top_devices
            .iter()
            .map(|d| (d.device_ip.as_str(), d.count))
            .collect();
        assert_eq!(top, vec![("router", 2), ("switch", 2), (UNKNOWN_DEVICE, 1)]);
    }

    #[test]
    fn test_summary_top_devices_capped() {
        let mut db = LogDb::open(":memory:").unwrap();
        for i in 0..12 {
            db.persist(&record(&format!("<134>Dec 15 10:30:45 host{} app: x", i))).unwrap();
        }
        assert_eq!(db.summary(cutoff()).unwrap().top_devices.len(), 10);
    }

    #[test]
    fn test_summary_latest_across_devices() {
        let summary = summary_db().summary(cutoff()).unwrap();
        let messages: Vec<_> = summary.latest.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["23 garbled", "d", "c", "b", "a"]);
    }

    #[test]
    fn test_summary_of_empty_store() {
        let summary = LogDb::open(":memory:").unwrap().summary(cutoff()).unwrap();
        assert_eq!(summary.devices, 0);
        assert_eq!(summary.log_entries, 0);
        assert!(summary.levels.is_empty());
        assert!(summary.top_devices.is_empty());
        assert!(summary.latest.is_empty());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.db");

        {
            let mut db = LogDb::open(&path).unwrap();
            db.persist(&record("Dec 15 10:30:45 router kernel: up")).unwrap();
        }

        let db = LogDb::open(&path).unwrap();
        assert_eq!(db.count_entries().unwrap(), 1);
        assert!(db.get_device("router").unwrap().is_some());
    }
}
