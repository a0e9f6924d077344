//! Event time representations

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Epoch timestamp with nanosecond precision
///
/// Ordering is chronological (seconds first, then nanoseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventTime {
    sec: i64,
    nsec: u32,
}

impl EventTime {
    /// Create from seconds and nanoseconds; nanoseconds overflow into seconds
    ///
    /// Seconds saturate at `i64::MAX`.
    pub fn new(sec: i64, nsec: u32) -> Self {
        Self {
            sec: sec.saturating_add(i64::from(nsec / NANOS_PER_SEC)),
            nsec: nsec % NANOS_PER_SEC,
        }
    }

    /// Whole-second event time
    pub fn from_secs(sec: i64) -> Self {
        Self { sec, nsec: 0 }
    }

    /// From fractional epoch seconds
    pub fn from_secs_f64(secs: f64) -> Self {
        let sec = secs.floor();
        let nsec = ((secs - sec) * f64::from(NANOS_PER_SEC)).round() as u32;
        Self::new(sec as i64, nsec)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(elapsed.as_secs() as i64, elapsed.subsec_nanos())
    }

    #[inline]
    pub fn sec(&self) -> i64 {
        self.sec
    }

    #[inline]
    pub fn nsec(&self) -> u32 {
        self.nsec
    }

    /// Fractional epoch seconds
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + f64::from(self.nsec) / f64::from(NANOS_PER_SEC)
    }

    /// Representation handed to encoders and formatters
    ///
    /// `time_as_integer` truncates the sub-second component.
    #[inline]
    pub fn to_timestamp(self, time_as_integer: bool) -> Timestamp {
        if time_as_integer {
            Timestamp::Integer(self.sec)
        } else {
            Timestamp::Event(self)
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

impl Serialize for EventTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

/// Timestamp as it appears in encoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Integer epoch seconds
    Integer(i64),
    /// Rich event time, sub-second precision retained
    Event(EventTime),
}

impl Timestamp {
    /// Whole epoch seconds
    pub fn secs(&self) -> i64 {
        match self {
            Self::Integer(sec) => *sec,
            Self::Event(t) => t.sec(),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Integer(sec) => serializer.serialize_i64(*sec),
            Self::Event(t) => t.serialize(serializer),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(sec) => write!(f, "{sec}"),
            Self::Event(t) => write!(f, "{t}"),
        }
    }
}
