use std::net::SocketAddr;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use shared::protocol::{
    SD_ELEMENTS, SD_FORMAT, SD_MSGID, SD_PREFIX, SD_PRIORITY, SD_PROCID, SD_SENDER,
    SD_TIMESTAMP_FALLBACK, SD_TIMESTAMP_RAW, UNKNOWN_DEVICE,
};
use shared::types::{CanonicalLogRecord, Priority};
use super::hostname;
use super::matchers::{self, Match, MatcherKind, PartialFields};
use super::timestamp;

const BOM: char = '\u{feff}';

/// Normalize one decoded datagram into a canonical record.
///
/// Never fails: the matcher chain ends in the raw fallback. The output depends
/// only on the arguments, so the same datagram always yields the same record.
pub fn normalize(
    raw: &str,
    received_at: DateTime<Utc>,
    sender: Option<SocketAddr>,
) -> CanonicalLogRecord {
    let line = trim_line(raw);
    let Match { kind, fields } = matchers::run_chain(line);

    let mut sd = Map::new();
    sd.insert(SD_FORMAT.to_string(), json!(kind.as_str()));
    if let Some(sender) = sender {
        sd.insert(SD_SENDER.to_string(), json!(sender.to_string()));
    }

    if kind == MatcherKind::Raw {
        return CanonicalLogRecord {
            source_identifier: UNKNOWN_DEVICE.to_string(),
            timestamp: received_at,
            priority: None,
            process_name: None,
            process_id: None,
            message: line.to_string(),
            raw_message: raw.to_string(),
            structured_data: Some(sd),
        };
    }

    let priority = fields.priority.and_then(Priority::from_raw);
    if let Some(pri) = fields.priority {
        sd.insert(SD_PRIORITY.to_string(), json!(pri));
    }

    let ts = timestamp::resolve(fields.timestamp, kind, received_at);
    if ts.fallback {
        sd.insert(SD_TIMESTAMP_FALLBACK.to_string(), Value::Bool(true));
        if let Some(token) = fields.timestamp {
            sd.insert(SD_TIMESTAMP_RAW.to_string(), json!(token));
        }
    }

    let process_id = match fields.pid {
        Some(pid) => match pid.parse::<u32>() {
            Ok(n) => Some(n),
            Err(_) => {
                sd.insert(SD_PROCID.to_string(), json!(pid));
                None
            }
        },
        None => None,
    };

    insert_opt(&mut sd, SD_MSGID, fields.msgid);
    insert_opt(&mut sd, SD_ELEMENTS, fields.structured_data);
    insert_opt(&mut sd, SD_PREFIX, fields.prefix);

    let message = clean_message(&fields, kind).unwrap_or(line).to_string();

    CanonicalLogRecord {
        source_identifier: hostname::resolve_source(fields.hostname),
        timestamp: ts.instant,
        priority,
        process_name: fields.program.map(str::to_string),
        process_id,
        message,
        raw_message: raw.to_string(),
        structured_data: Some(sd),
    }
}

/// Datagrams often carry a trailing newline or NUL padding.
fn trim_line(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

/// Cleaned message tail, or `None` when nothing is left of it.
fn clean_message<'a>(fields: &PartialFields<'a>, kind: MatcherKind) -> Option<&'a str> {
    let mut msg = trim_line(fields.message);
    if kind == MatcherKind::Rfc5424 {
        msg = msg.trim_start_matches(BOM).trim_start();
    }
    if let Some(rest) = fields.program.and_then(|program| strip_program_marker(msg, program)) {
        msg = rest;
    }
    Some(msg).filter(|m| !m.is_empty())
}

/// Strip a repeated `PROGRAM[PID]:` or `PROGRAM:` marker from the start of a
/// message body. Only the program the matcher already extracted is stripped.
fn strip_program_marker<'a>(msg: &'a str, program: &str) -> Option<&'a str> {
    let rest = msg.strip_prefix(program)?;
    let rest = match rest.strip_prefix('[') {
        Some(inner) => &inner[inner.find(']')? + 1..],
        None => rest,
    };
    let rest = rest.strip_prefix(':')?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn insert_opt(sd: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        sd.insert(key.to_string(), json!(value));
    }
}
