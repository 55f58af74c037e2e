use std::fmt::{Debug, Display, Formatter};
use std::ops::{Add, Sub};
use std::time::Duration;

use anyhow::{anyhow, bail};

pub mod timer_queue;


/// A point on the (simulated or wall-clock derived) timeline, measured from the start of the
///  timeline. Protocol logic works with [Timestamp]s rather than `Instant`s, and the same agents
///  run in the deterministic simulation and on a real network.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub const fn from_duration(since_start: Duration) -> Timestamp {
        Timestamp(since_start)
    }

    pub const fn from_secs(secs: u64) -> Timestamp {
        Timestamp(Duration::from_secs(secs))
    }

    pub const fn from_millis(millis: u64) -> Timestamp {
        Timestamp(Duration::from_millis(millis))
    }

    pub fn since_start(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    /// Signed distance in whole and fractional milliseconds, negative if `other` is later.
    pub fn millis_since(&self, other: Timestamp) -> f64 {
        if *self >= other {
            (self.0 - other.0).as_secs_f64() * 1000.0
        }
        else {
            -((other.0 - self.0).as_secs_f64() * 1000.0)
        }
    }

    /// Renders the timestamp as decimal seconds without trailing zeros, e.g. `35`, `35.5` or
    ///  `0.000000001`. The representation is exact, so [Timestamp::parse_secs] restores the
    ///  identical value.
    pub fn format_secs(&self) -> String {
        let secs = self.0.as_secs();
        let nanos = self.0.subsec_nanos();
        if nanos == 0 {
            return secs.to_string();
        }

        let fraction = format!("{:09}", nanos);
        format!("{}.{}", secs, fraction.trim_end_matches('0'))
    }

    /// Parses decimal seconds. Plain decimals are parsed exactly (fractional digits beyond
    ///  nanosecond precision are truncated), anything else is attempted as a float.
    pub fn parse_secs(s: &str) -> anyhow::Result<Timestamp> {
        if let Some(exact) = Self::parse_exact_decimal(s) {
            return Ok(exact);
        }

        let value: f64 = s.parse()?;
        if !value.is_finite() || value < 0.0 {
            bail!("not a valid point in time: {}", s);
        }
        Duration::try_from_secs_f64(value)
            .map(Timestamp)
            .map_err(|e| anyhow!("seconds out of range: {} ({})", s, e))
    }

    fn parse_exact_decimal(s: &str) -> Option<Timestamp> {
        let (whole, fraction) = match s.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (s, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let secs: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };

        let mut nanos: u32 = 0;
        for (i, digit) in fraction.bytes().take(9).enumerate() {
            nanos += (digit - b'0') as u32 * 10u32.pow(8 - i as u32);
        }

        Some(Timestamp(Duration::new(secs, nanos)))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs))
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl Debug for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.format_secs())
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.format_secs())
    }
}
