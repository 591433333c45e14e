//! The ordered format-matcher chain.
//!
//! Each matcher is a plain function from a trimmed line to an optional set of
//! borrowed fields. [`MATCHERS`] fixes the order: RFC 5424 must run before
//! RFC 3164 because both start with `<PRI>` and the looser 3164 grammar would
//! otherwise swallow 5424 lines. The raw fallback is not in the table; it is
//! what [`run_chain`] returns when every matcher declines.

use std::fmt;
use std::sync::LazyLock;
use regex::{Captures, Regex};

/// RFC 5424 NILVALUE
const NIL: &str = "-";

static RE_RFC5424: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?s)^<(?P<pri>\d{1,3})>(?P<version>[1-9]\d{0,2})\s+"#,
        r#"(?P<ts>-|\d{4}-\d{2}-\d{2}T\S+)\s+"#,
        r#"(?P<host>\S+)\s+(?P<app>\S+)\s+(?P<procid>\S+)\s+(?P<msgid>\S+)\s+"#,
        r#"(?P<sd>-|(?:\[(?:[^\]"\\]|\\.|"(?:[^"\\]|\\.)*")*\])+)"#,
        r#"(?:\s+(?P<msg>.*))?$"#,
    ))
    .unwrap()
});

// After a fixed `TIMESTAMP HOST` header the tag is positional, so the colon
// and PID are both optional (`sshd[1234]:msg`, `kernel msg`). A tail that does
// not start with a tag token is kept whole as the message.
macro_rules! bsd_tail {
    () => {
        r"(?:(?P<program>[^\s\[\]:<>]+)(?:\[(?P<pid>[^\]]*)\])?(?::\s*|\s+|$))?(?P<msg>.*)$"
    };
}

static RE_RFC3164: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)^<(?P<pri>\d{1,3})>\s*",
        r"(?P<ts>[A-Za-z]{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+",
        r"(?P<host>\S*[^\s:])\s+",
        bsd_tail!(),
    ))
    .unwrap()
});

static RE_NO_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)^(?P<ts>[A-Za-z]{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+",
        r"(?P<host>\S*[^\s:])\s+",
        bsd_tail!(),
    ))
    .unwrap()
});

// Heuristic: the first `PROGRAM[PID]:` / `PROGRAM:` marker that is followed
// by whitespace or end of line ends the prefix. A colon inside a token
// (`18:07:02`, `http://`) never counts as a marker.
static RE_ENHANCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)^(?:<(?P<pri>\d{1,3})>)?\s*(?:(?P<prefix>.*?)\s+)?",
        r"(?P<program>[^\s\[\]:<>]+)(?:\[(?P<pid>[^\]]*)\])?:(?:\s+(?P<msg>.*))?$",
    ))
    .unwrap()
});

// Cisco IOS / ASA message mnemonic, `%FACILITY-SEVERITY-MNEMONIC:`
static RE_MNEMONIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^%(?P<tag>[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)*-\d-[A-Za-z0-9_]+):(?:\s+(?P<msg>.*))?$")
        .unwrap()
});

static RE_PREFIX_BSD_TS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<ts>[A-Za-z]{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)(?:\s+(?P<rest>.*))?$")
        .unwrap()
});

static RE_PREFIX_ISO_TS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s)^(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:[Zz]|[+-]\d{2}:?\d{2})?)",
        r"(?:\s+(?P<rest>.*))?$",
    ))
    .unwrap()
});

/// Which wire variant produced a set of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    Rfc5424,
    Rfc3164,
    NoPriority,
    Enhanced,
    Raw,
}

impl MatcherKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MatcherKind::Rfc5424 => "rfc5424",
            MatcherKind::Rfc3164 => "rfc3164",
            MatcherKind::NoPriority => "no-priority",
            MatcherKind::Enhanced => "enhanced",
            MatcherKind::Raw => "raw",
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields extracted by one matcher, borrowed from the input line.
/// Absent means the line did not carry the field (or carried NILVALUE).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialFields<'a> {
    /// Raw `<PRI>` digits as a number; may exceed 191
    pub priority: Option<u16>,
    pub timestamp: Option<&'a str>,
    pub hostname: Option<&'a str>,
    pub program: Option<&'a str>,
    pub pid: Option<&'a str>,
    pub msgid: Option<&'a str>,
    /// RFC 5424 structured-data section, verbatim
    pub structured_data: Option<&'a str>,
    /// Enhanced matcher: prefix tokens that were neither timestamp nor hostname
    pub prefix: Option<&'a str>,
    pub message: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<'a> {
    pub kind: MatcherKind,
    pub fields: PartialFields<'a>,
}

pub type MatchFn = for<'a> fn(&'a str) -> Option<PartialFields<'a>>;

/// The chain, in priority order. First match wins.
pub const MATCHERS: [(MatcherKind, MatchFn); 4] = [
    (MatcherKind::Rfc5424, match_rfc5424),
    (MatcherKind::Rfc3164, match_rfc3164),
    (MatcherKind::NoPriority, match_no_priority),
    (MatcherKind::Enhanced, match_enhanced),
];

/// Run the chain over a trimmed line. Always produces a match: the raw
/// fallback terminates the chain.
pub fn run_chain(line: &str) -> Match<'_> {
    MATCHERS
        .iter()
        .find_map(|(kind, matcher)| matcher(line).map(|fields| Match { kind: *kind, fields }))
        .unwrap_or_else(|| Match {
            kind: MatcherKind::Raw,
            fields: match_raw(line),
        })
}

pub fn match_rfc5424(line: &str) -> Option<PartialFields<'_>> {
    let caps = RE_RFC5424.captures(line)?;
    let sd = caps.name("sd").map(|m| m.as_str()).filter(|s| *s != NIL);

    Some(PartialFields {
        priority: priority(&caps),
        timestamp: non_nil(&caps, "ts"),
        hostname: non_nil(&caps, "host"),
        program: non_nil(&caps, "app"),
        pid: non_nil(&caps, "procid"),
        msgid: non_nil(&caps, "msgid"),
        structured_data: sd,
        prefix: None,
        message: message(&caps),
    })
}

pub fn match_rfc3164(line: &str) -> Option<PartialFields<'_>> {
    let caps = RE_RFC3164.captures(line)?;
    Some(bsd_fields(&caps, priority(&caps)))
}

pub fn match_no_priority(line: &str) -> Option<PartialFields<'_>> {
    let caps = RE_NO_PRIORITY.captures(line)?;
    Some(bsd_fields(&caps, None))
}

/// Loose matcher for vendor lines that drop or mangle the hostname and
/// timestamp. A timestamp at the start of the prefix is still recognised;
/// the last remaining prefix token is taken as the hostname candidate.
///
/// Cisco devices send `HOST: %FAC-SEV-MNEMONIC: text`. When nothing but a
/// timestamp precedes the marker and the body opens with a mnemonic, the
/// marker is the hostname and the mnemonic is the program.
pub fn match_enhanced(line: &str) -> Option<PartialFields<'_>> {
    let caps = RE_ENHANCED.captures(line)?;

    let mut rest = caps.name("prefix").map(|m| m.as_str().trim());
    let mut timestamp = None;
    if let Some(prefix) = rest {
        let ts_caps = RE_PREFIX_BSD_TS
            .captures(prefix)
            .or_else(|| RE_PREFIX_ISO_TS.captures(prefix));
        if let Some(ts_caps) = ts_caps {
            timestamp = ts_caps.name("ts").map(|m| m.as_str());
            rest = ts_caps.name("rest").map(|m| m.as_str().trim());
        }
    }

    let (prefix, mut hostname) = match rest.filter(|r| !r.is_empty()) {
        Some(r) => match r.rsplit_once(char::is_whitespace) {
            Some((head, host)) => (Some(head.trim_end()), Some(host)),
            None => (None, Some(r)),
        },
        None => (None, None),
    };

    let mut program = caps.name("program").map(|m| m.as_str());
    let mut msg = message(&caps);
    if hostname.is_none() && caps.name("pid").is_none() {
        if let Some(mnemonic) = RE_MNEMONIC.captures(msg) {
            hostname = program;
            program = mnemonic.name("tag").map(|m| m.as_str());
            msg = mnemonic.name("msg").map_or("", |m| m.as_str());
        }
    }

    Some(PartialFields {
        priority: priority(&caps),
        timestamp,
        hostname,
        program,
        pid: pid(&caps),
        msgid: None,
        structured_data: None,
        prefix,
        message: msg,
    })
}

/// Always matches: the whole line is the message.
pub fn match_raw(line: &str) -> PartialFields<'_> {
    PartialFields {
        message: line,
        ..PartialFields::default()
    }
}

fn bsd_fields<'a>(caps: &Captures<'a>, priority: Option<u16>) -> PartialFields<'a> {
    PartialFields {
        priority,
        timestamp: caps.name("ts").map(|m| m.as_str()),
        hostname: caps.name("host").map(|m| m.as_str()),
        program: caps.name("program").map(|m| m.as_str()),
        pid: pid(caps),
        msgid: None,
        structured_data: None,
        prefix: None,
        message: message(caps),
    }
}

fn priority(caps: &Captures<'_>) -> Option<u16> {
    caps.name("pri").and_then(|m| m.as_str().parse().ok())
}

fn pid<'a>(caps: &Captures<'a>) -> Option<&'a str> {
    caps.name("pid").map(|m| m.as_str().trim()).filter(|s| !s.is_empty())
}

fn non_nil<'a>(caps: &Captures<'a>, name: &str) -> Option<&'a str> {
    caps.name(name).map(|m| m.as_str()).filter(|s| *s != NIL)
}

fn message<'a>(caps: &Captures<'a>) -> &'a str {
    caps.name("msg").map_or("", |m| m.as_str())
}
