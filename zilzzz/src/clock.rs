//! Wall-clock source used for draft defaults and creation stamps, and the
//! time zone local times are read and written in.

use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use parking_lot::Mutex;

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Milliseconds since the Unix epoch, clamped to zero for earlier instants.
#[must_use]
pub fn epoch_millis(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}

/// Time zone for the user's local times.
///
/// [`LocalZone::System`] follows the machine's zone rules, so each date gets
/// the offset in force on that date. [`LocalZone::Fixed`] pins one offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZone {
    /// The operating system's local zone.
    #[default]
    System,
    /// A constant offset from UTC.
    Fixed(FixedOffset),
}

impl From<FixedOffset> for LocalZone {
    fn from(offset: FixedOffset) -> Self {
        Self::Fixed(offset)
    }
}

impl TimeZone for LocalZone {
    type Offset = FixedOffset;

    fn from_offset(offset: &FixedOffset) -> Self {
        Self::Fixed(*offset)
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
        match self {
            Self::System => Local.offset_from_local_date(local),
            Self::Fixed(offset) => offset.offset_from_local_date(local),
        }
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        match self {
            Self::System => Local.offset_from_local_datetime(local),
            Self::Fixed(offset) => offset.offset_from_local_datetime(local),
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        match self {
            Self::System => Local.offset_from_utc_date(utc),
            Self::Fixed(offset) => offset.offset_from_utc_date(utc),
        }
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        match self {
            Self::System => Local.offset_from_utc_datetime(utc),
            Self::Fixed(offset) => offset.offset_from_utc_datetime(utc),
        }
    }
}

/// Maps a local wall time in `zone` to an instant.
///
/// A time repeated when clocks go back resolves to its first occurrence. A
/// time skipped when clocks go forward moves one hour later.
pub fn resolve_local<Tz: TimeZone>(zone: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            local
                .checked_add_signed(Duration::hours(1))
                .and_then(|later| zone.from_local_datetime(&later).earliest())
        })
        .map(|at| at.with_timezone(&Utc))
}

/// A zone with daylight saving time, for tests.
#[cfg(test)]
pub(crate) mod test_zone {
    use chrono::{FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

    /// Central European time in 2026: +01:00, and +02:00 from 29 March
    /// 01:00 UTC until 25 October 01:00 UTC.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Cet2026;

    fn utc(month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, month, day)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap()
    }

    pub(crate) fn winter() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    pub(crate) fn summer() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    impl TimeZone for Cet2026 {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            Self
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let fits = |offset: FixedOffset| {
                self.offset_from_utc_datetime(&(*local - offset)) == offset
            };
            match (fits(summer()), fits(winter())) {
                (true, true) => LocalResult::Ambiguous(summer(), winter()),
                (true, false) => LocalResult::Single(summer()),
                (false, true) => LocalResult::Single(winter()),
                (false, false) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, at: &NaiveDateTime) -> FixedOffset {
            if *at >= utc(3, 29) && *at < utc(10, 25) {
                summer()
            } else {
                winter()
            }
        }
    }
}
