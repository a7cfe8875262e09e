//! Drift-corrected time source
//!
//! Every windowed engine reads "now" through one shared [`TimeSource`], so
//! they all agree on a single time base even when the host clock is skewed.
//! `now()` is the local wall clock shifted into the exchange frame plus a
//! drift learned from a remote time service. Resynchronisation is
//! best-effort: a failed or slow round trip leaves the previous drift in
//! place and is reported only as `false` and a log line.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::net::UdpSocket;
use tracing::{debug, warn};
use types::time::{utc_to_exchange, ExchangeTime};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_EPOCH_DELTA: u64 = 2_208_988_800;

/// SNTP packet size (RFC 4330 §4).
const SNTP_PACKET_LEN: usize = 48;

/// Errors from a remote time service round trip.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("time service I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("time service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("invalid time service response: {0}")]
    InvalidResponse(String),
}

/// Source of the local (possibly skewed) wall clock.
pub trait WallClock: Send + Sync {
    fn utc_now(&self) -> DateTime<Utc>;
}

/// The host's system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock that only moves when told to. Used for replays and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl WallClock for ManualClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A remote reference clock.
#[async_trait]
pub trait TimeService: Send + Sync {
    /// Current UTC time according to the remote service.
    async fn remote_now(&self) -> Result<DateTime<Utc>, ClockError>;
}

/// Minimal SNTP client (client mode, version 3).
#[derive(Debug, Clone)]
pub struct SntpTimeService {
    server: String,
}

impl SntpTimeService {
    /// `server` is a `host:port` pair, e.g. `ntp.nict.jp:123`.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

#[async_trait]
impl TimeService for SntpTimeService {
    async fn remote_now(&self) -> Result<DateTime<Utc>, ClockError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(&self.server).await?;

        let mut request = [0u8; SNTP_PACKET_LEN];
        // LI = 0, VN = 3, Mode = 3 (client)
        request[0] = 0x1B;
        socket.send(&request).await?;

        let mut response = [0u8; SNTP_PACKET_LEN];
        let len = socket.recv(&mut response).await?;
        decode_sntp_response(&response[..len])
    }
}

/// Extract the transmit timestamp from an SNTP server response.
pub fn decode_sntp_response(packet: &[u8]) -> Result<DateTime<Utc>, ClockError> {
    if packet.len() < SNTP_PACKET_LEN {
        return Err(ClockError::InvalidResponse(format!(
            "short packet: {} bytes",
            packet.len()
        )));
    }

    let mode = packet[0] & 0x07;
    if mode != 4 && mode != 5 {
        return Err(ClockError::InvalidResponse(format!("unexpected mode {}", mode)));
    }

    // Stratum 0 is a kiss-of-death packet.
    if packet[1] == 0 {
        return Err(ClockError::InvalidResponse("kiss-of-death".to_string()));
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]) as u64;

    let unix_seconds = seconds
        .checked_sub(NTP_UNIX_EPOCH_DELTA)
        .ok_or_else(|| ClockError::InvalidResponse("timestamp before 1970".to_string()))?;
    let nanos = (fraction * 1_000_000_000) >> 32;

    DateTime::<Utc>::from_timestamp(unix_seconds as i64, nanos as u32)
        .ok_or_else(|| ClockError::InvalidResponse("timestamp out of range".to_string()))
}

/// Process-wide drift-corrected clock.
///
/// Construct one and share it (`Arc<TimeSource>`) with every engine that
/// needs `now()`.
pub struct TimeSource {
    wall: Arc<dyn WallClock>,
    service: Option<Arc<dyn TimeService>>,
    timeout: Duration,
    drift_ns: AtomicI64,
}

impl TimeSource {
    pub fn new(
        wall: Arc<dyn WallClock>,
        service: Option<Arc<dyn TimeService>>,
        timeout: Duration,
    ) -> Self {
        Self {
            wall,
            service,
            timeout,
            drift_ns: AtomicI64::new(0),
        }
    }

    /// A time source without a remote service; `resync` always fails.
    pub fn local(wall: Arc<dyn WallClock>) -> Self {
        Self::new(wall, None, Duration::ZERO)
    }

    /// System clock corrected against an SNTP server.
    pub fn sntp(server: impl Into<String>, timeout: Duration) -> Self {
        Self::new(
            Arc::new(SystemClock),
            Some(Arc::new(SntpTimeService::new(server))),
            timeout,
        )
    }

    /// Drift-corrected current time in the exchange frame.
    pub fn now(&self) -> ExchangeTime {
        utc_to_exchange(self.wall.utc_now()) + self.drift()
    }

    /// `now() - window`, saturating at the earliest representable time.
    pub fn cutoff(&self, window: Duration) -> ExchangeTime {
        chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| self.now().checked_sub_signed(window))
            .unwrap_or(NaiveDateTime::MIN)
    }

    /// Minutes since the epoch of `now()`; used to schedule resyncs.
    pub fn minute_index(&self) -> i64 {
        self.now().and_utc().timestamp().div_euclid(60)
    }

    pub fn drift(&self) -> chrono::Duration {
        chrono::Duration::nanoseconds(self.drift_ns.load(Ordering::Relaxed))
    }

    /// Overwrite the drift. Drifts beyond ±292 years saturate.
    pub fn set_drift(&self, drift: chrono::Duration) {
        let nanos = drift.num_nanoseconds().unwrap_or(if drift < chrono::Duration::zero() {
            i64::MIN
        } else {
            i64::MAX
        });
        self.drift_ns.store(nanos, Ordering::Relaxed);
    }

    /// One best-effort round trip to the remote service.
    ///
    /// Returns `true` when the drift was updated. Any failure, including a
    /// timeout, keeps the previous drift.
    pub async fn resync(&self) -> bool {
        let Some(service) = &self.service else {
            debug!("No time service configured; keeping local drift");
            return false;
        };

        let result = tokio::time::timeout(self.timeout, service.remote_now())
            .await
            .unwrap_or(Err(ClockError::Timeout(self.timeout)));

        match result {
            Ok(remote) => {
                let drift = remote - self.wall.utc_now();
                self.set_drift(drift);
                debug!(drift_ms = drift.num_milliseconds(), "Time source resynchronised");
                true
            }
            Err(err) => {
                warn!(error = %err, "Time resync failed; keeping previous drift");
                false
            }
        }
    }
}

impl std::fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSource")
            .field("has_service", &self.service.is_some())
            .field("timeout", &self.timeout)
            .field("drift_ns", &self.drift_ns.load(Ordering::Relaxed))
            .finish()
    }
}
