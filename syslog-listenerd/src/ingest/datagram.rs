use std::borrow::Cow;
use std::net::SocketAddr;
use chrono::{DateTime, Utc};

/// One inbound packet, owned by the ingest loop for a single receive-process cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDatagram {
    pub bytes: Vec<u8>,
    pub sender: SocketAddr,
    pub received_at: DateTime<Utc>,
}

impl RawDatagram {
    pub fn new(bytes: Vec<u8>, sender: SocketAddr, received_at: DateTime<Utc>) -> Self {
        Self { bytes, sender, received_at }
    }

    /// Decode as UTF-8, replacing invalid sequences with U+FFFD. Never fails.
    pub fn decode(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// True when the payload carries nothing but whitespace or NUL padding
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(|b| b.is_ascii_whitespace() || *b == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram(bytes: &[u8]) -> RawDatagram {
        RawDatagram::new(bytes.to_vec(), "127.0.0.1:5140".parse().unwrap(), Utc::now())
    }

    #[test]
    fn test_decode_valid_utf8_borrows() {
        let d = datagram("<13>Dec 15 10:30:45 host app: café".as_bytes());
        assert!(matches!(d.decode(), Cow::Borrowed(_)));
        assert_eq!(d.decode(), "<13>Dec 15 10:30:45 host app: café");
    }

    #[test]
    fn test_decode_replaces_invalid_sequences() {
        let d = datagram(b"<13>Dec 15 10:30:45 host app: bad \xff\xfe bytes");
        assert_eq!(d.decode(), "<13>Dec 15 10:30:45 host app: bad \u{fffd}\u{fffd} bytes");
    }

    #[test]
    fn test_blank_payloads() {
        assert!(datagram(b"").is_blank());
        assert!(datagram(b" \r\n\0\0").is_blank());
        assert!(!datagram(b" x ").is_blank());
    }
}
