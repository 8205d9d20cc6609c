//! Fitness Machine Service (FTMS) telemetry: the Indoor Bike Data decoder and
//! the byte-record sources that feed it.
//!
//! Device discovery and pairing stay outside this crate. Records arrive one
//! notification at a time, either from a host callback
//! ([`notification_handler`]), from a bridge that forwards each notification
//! as one UDP datagram ([`FtmsUdpSource`]), or from a recording
//! ([`ReplaySource`]).

mod indoor_bike;

use anyhow::Context;
use bytes::Bytes;
use ride_ingest_core::*;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::UdpSocket;
use tokio::time::{self, Duration};

pub use indoor_bike::{decode, unit_of, FieldSpec, Kind, Presence, FIELDS};

/// Callback for a notification-driven host: decodes one record and forwards
/// the sample. Returns `false` once the receiving side is gone.
pub fn notification_handler(tx: TelemetryTx) -> impl Fn(&[u8]) -> bool + Send + Sync + 'static {
    move |record: &[u8]| tx.send(decode(record)).is_ok()
}

/// Parse one hex-encoded record (`"44 0a f6 09"`, `"440af609"`, `"0x44:0a"`).
pub fn parse_hex_record(line: &str) -> Result<Bytes, IngestError> {
    let line = line.trim();
    let line = line.strip_prefix("0x").unwrap_or(line);
    let digits: Vec<u8> = line
        .bytes()
        .filter(|b| !matches!(b, b' ' | b':' | b'-' | b'\t'))
        .collect();
    if digits.len() % 2 != 0 {
        return Err(IngestError::Msg(format!("odd number of hex digits in {line:?}")));
    }
    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        let s = std::str::from_utf8(pair)
            .map_err(|_| IngestError::Msg(format!("invalid hex in {line:?}")))?;
        let b = u8::from_str_radix(s, 16)
            .map_err(|_| IngestError::Msg(format!("invalid hex byte {s:?}")))?;
        out.push(b);
    }
    Ok(Bytes::from(out))
}

#[derive(Clone, Debug)]
pub struct FtmsUdpConfig {
    pub bind_addr: String, // e.g. "0.0.0.0:6182"
}

impl Default for FtmsUdpConfig {
    fn default() -> Self {
        // 6182 == 0x1826, the FTMS service id
        Self { bind_addr: "0.0.0.0:6182".into() }
    }
}

/// Receives Indoor Bike Data notifications relayed one per datagram.
pub struct FtmsUdpSource {
    socket: UdpSocket,
}

impl FtmsUdpSource {
    pub async fn bind(cfg: &FtmsUdpConfig) -> Result<Self, IngestError> {
        let socket = UdpSocket::bind(&cfg.bind_addr)
            .await
            .with_context(|| format!("bind {}", cfg.bind_addr))?;
        tracing::info!(addr = %cfg.bind_addr, "listening for indoor bike data");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IngestError> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait::async_trait]
impl TelemetrySource for FtmsUdpSource {
    async fn run(&self, tx: TelemetryTx) -> Result<(), IngestError> {
        let on_record = notification_handler(tx);
        // a notification never exceeds the negotiated ATT MTU
        let mut buf = vec![0u8; 512];
        loop {
            let (len, _peer) = self.socket.recv_from(&mut buf).await?;
            if !on_record(&buf[..len]) {
                tracing::debug!("telemetry receiver dropped, stopping udp source");
                return Ok(());
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReplayConfig {
    pub interval: Duration,
    pub looped: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { interval: Duration::from_millis(250), looped: false }
    }
}

/// Replays recorded notifications at a fixed pace.
pub struct ReplaySource {
    records: Vec<Bytes>,
    cfg: ReplayConfig,
}

impl ReplaySource {
    pub fn new(records: Vec<Bytes>, cfg: ReplayConfig) -> Self {
        Self { records, cfg }
    }

    /// One hex record per line; blank lines and `#` comments are skipped.
    pub fn from_text(text: &str, cfg: ReplayConfig) -> Result<Self, IngestError> {
        let records = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(parse_hex_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(records, cfg))
    }

    pub fn open(path: &Path, cfg: ReplayConfig) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read replay {}", path.display()))?;
        Self::from_text(&text, cfg)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ReplaySource {
    async fn run(&self, tx: TelemetryTx) -> Result<(), IngestError> {
        if self.records.is_empty() {
            return Ok(());
        }
        let on_record = notification_handler(tx);
        let mut ticker = time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            for rec in &self.records {
                ticker.tick().await;
                if !on_record(rec) {
                    return Ok(());
                }
            }
            if !self.cfg.looped {
                tracing::debug!(records = self.records.len(), "replay finished");
                return Ok(());
            }
        }
    }
}
