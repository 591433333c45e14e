//! Test sender for syslog-listenerd.
//!
//! Usage:
//!   syslog-client --host 127.0.0.1 --port 10514 --count 10
//!   syslog-client --corpus

use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use shared::protocol::DEFAULT_SYSLOG_PORT;
use tokio::net::UdpSocket;

/// Vendor lines seen in the field, one per supported format
const CORPUS: &[&str] = &[
    "<134>Dec 15 10:30:45 testhost sshd[1234]: Failed password for user admin",
    "<165>1 2024-12-15T10:30:45.123Z testhost sshd 1234 ID47 [exampleSDID@32473 iut=\"3\" eventSource=\"Application\"] Failed login",
    "Dec 15 10:30:45 testhost sshd[1234]: Failed password for user admin",
    "Dec 15 10:30:45 testhost /usr/sbin/ntpclient[5678]: Time synchronized",
    "Dec 15 10:30:45 testhost systemd-udevd[9012]: Processing device",
    "Dec 15 10:30:45 testhost dnsmasq: exiting on receipt of SIGTERM",
    "Dec 15 10:30:45 testhost kernel: key mismatch: pktlist key 16635 elem key 20731",
    "Jun 20 18:07:02 miniupnpd[3227]: Invalid Callback in SUBSCRIBE <http://192.168.10.82:2869/upnp/eventing/jurkesulrl>",
    "Jun 20 18:07:55 wlceventd: wlceventd_proc_event(464): eth6: Deauth_ind 9A:EB:8A:3F:C4:C0, status: 0, reason: Disassociated due to inactivity (4)",
    "Jun 20 18:20:44 kernel: key mismatch: pktlist key 16635 elem key 20731",
    "Jun 21 02:25:09 WATCHDOG: [FAUPGRADE][auto_firmware_check:(6193)]retrieve firmware information",
    "Jun 21 08:07:44 rc_service: httpd 1413:notify_rc restart_logger",
    "23 something garbled",
];

#[derive(Parser, Debug)]
#[command(name = "syslog-client", about = "Send test syslog datagrams to a listener")]
struct Args {
    /// Listener host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listener UDP port
    #[arg(short, long, default_value_t = DEFAULT_SYSLOG_PORT)]
    port: u16,

    /// Number of generated messages to send (0 = until interrupted)
    #[arg(short, long, default_value_t = 0)]
    count: u64,

    /// Seconds between generated messages
    #[arg(short, long, default_value_t = 5)]
    interval: u64,

    /// Send the built-in sample corpus once and exit
    #[arg(long)]
    corpus: bool,
}

/// RFC 3164 test line, local time as a BSD timestamp
fn test_message(now: DateTime<Local>) -> String {
    format!(
        "<134>{} test-host test-app: Test message at {}",
        now.format("%b %e %H:%M:%S"),
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

async fn send(socket: &UdpSocket, target: &str, line: &str) -> Result<()> {
    socket
        .send_to(line.as_bytes(), target)
        .await
        .with_context(|| format!("Failed to send to {}", target))?;
    tracing::info!("Sent: {}", line);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("syslog_client=info")),
        )
        .init();

    let args = Args::parse();
    let target = format!("{}:{}", args.host, args.port);
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Failed to bind UDP socket")?;

    tracing::info!("Testing syslog listener on {}", target);

    if args.corpus {
        for line in CORPUS {
            send(&socket, &target, line).await?;
        }
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                send(&socket, &target, &test_message(Local::now())).await?;
                sent += 1;
                if args.count != 0 && sent >= args.count {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping test client");
                break;
            }
        }
    }

    tracing::info!("Sent {} messages", sent);
    Ok(())
}
