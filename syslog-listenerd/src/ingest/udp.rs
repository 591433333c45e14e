use std::sync::Arc;
use anyhow::{Context, Result};
use chrono::Utc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use crate::parser;
use crate::store::PersistOutcome;
use crate::store_manager::StoreHandle;
use super::{IngestStats, RawDatagram};

pub async fn bind(listen: &str) -> Result<UdpSocket> {
    UdpSocket::bind(listen)
        .await
        .with_context(|| format!("Failed to bind UDP socket to {}", listen))
}

/// Receive loop: one datagram at a time, each processed to completion
/// (normalize, resolve device, persist) before the next receive.
pub async fn run_listener(
    socket: UdpSocket,
    store: StoreHandle,
    stats: Arc<IngestStats>,
    max_datagram_size: usize,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Listening for syslog on {}", socket.local_addr()?);

    let mut buf = vec![0u8; max_datagram_size];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, sender)) => {
                        if len == buf.len() {
                            tracing::warn!(
                                "Datagram from {} filled the {} byte receive buffer and may be truncated",
                                sender,
                                buf.len()
                            );
                        }
                        let datagram = RawDatagram::new(buf[..len].to_vec(), sender, Utc::now());
                        process(&datagram, &store, &stats).await;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to receive datagram: {}", e);
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Syslog listener shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Normalize and persist one datagram. Persistence failures are logged with
/// the full raw message and the message is dropped.
pub async fn process(
    datagram: &RawDatagram,
    store: &StoreHandle,
    stats: &IngestStats,
) -> Option<PersistOutcome> {
    IngestStats::bump(&stats.received);

    if datagram.is_blank() {
        tracing::debug!("Skipping empty datagram from {}", datagram.sender);
        IngestStats::bump(&stats.skipped);
        return None;
    }

    let text = datagram.decode();
    let record = parser::normalize(&text, datagram.received_at, Some(datagram.sender));

    tracing::debug!(
        sender = %datagram.sender,
        source = %record.source_identifier,
        level = record.level().unwrap_or("-"),
        "Normalized message"
    );

    match store.persist(record).await {
        Ok(outcome) => {
            IngestStats::bump(&stats.persisted);
            if outcome.device_created {
                IngestStats::bump(&stats.devices_created);
                tracing::info!(
                    "Registered new device {} (id {})",
                    outcome.device.ip_address,
                    outcome.device.id
                );
            }
            Some(outcome)
        }
        Err(e) => {
            IngestStats::bump(&stats.failed);
            tracing::error!(
                target: "syslog_listenerd::persist",
                sender = %datagram.sender,
                raw_message = %text,
                "Failed to persist log entry, message dropped: {}",
                e
            );
            None
        }
    }
}
