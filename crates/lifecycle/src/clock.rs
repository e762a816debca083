//! Civil time
//!
//! Declarations are stamped in the municipality's civil time, not UTC.
//! Timestamps are truncated to microseconds, the precision they are stored
//! and hashed at.

use chrono::{DateTime, Duration, FixedOffset, Offset, SubsecRound, Utc};
use std::sync::Mutex;

/// UTC offset of America/Bogota (no daylight saving)
pub const BOGOTA_OFFSET_HOURS: i32 = -5;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock at a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct CivilClock {
    offset: FixedOffset,
}

impl CivilClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// `None` when the offset is outside ±23 hours
    pub fn from_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(Self::new)
    }

    pub fn bogota() -> Self {
        Self::from_hours(BOGOTA_OFFSET_HOURS).unwrap_or(Self::new(Utc.fix()))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Default for CivilClock {
    fn default() -> Self {
        Self::bogota()
    }
}

impl Clock for CivilClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset).trunc_subsecs(6)
    }
}

/// Manually driven clock
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now.trunc_subsecs(6)),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now.trunc_subsecs(6);
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
