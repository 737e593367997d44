//! Two-step due date picker: first a calendar date, then a time of day.
//!
//! ```text
//! Idle --begin_pick--> PickingDate --choose_date--> PickingTime --choose_time--> Idle
//!   ^                        |                            |
//!   +--------cancel----------+------------cancel----------+
//! ```
//!
//! Calendar arithmetic happens in the user's zone, using the offset in force
//! on the picked date. Picked instants are whole minutes.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

use crate::clock::{LocalZone, resolve_local};

/// Errors from composing a due date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PickError {
    /// Hour or minute out of range.
    #[error("invalid time {hour:02}:{minute:02}")]
    InvalidTime {
        /// Requested hour.
        hour: u32,
        /// Requested minute.
        minute: u32,
    },
    /// The date and time have no instant in the zone.
    #[error("local time does not exist")]
    NoSuchTime,
}

/// Combines a local date and time of day into one instant in `zone`.
///
/// # Errors
///
/// Returns [`PickError::NoSuchTime`] if the zone cannot place the time.
pub fn compose<Tz: TimeZone>(
    date: NaiveDate,
    time: NaiveTime,
    zone: &Tz,
) -> Result<DateTime<Utc>, PickError> {
    resolve_local(zone, date.and_time(time)).ok_or(PickError::NoSuchTime)
}

/// Waiting for a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateStep<Tz = LocalZone> {
    seed: DateTime<Utc>,
    zone: Tz,
}

impl<Tz: TimeZone> DateStep<Tz> {
    /// The due date the pick started from.
    #[must_use]
    pub const fn seed(&self) -> DateTime<Utc> {
        self.seed
    }

    /// The local calendar date of the seed, for pre-filling the date input.
    #[must_use]
    pub fn seed_date(&self) -> NaiveDate {
        self.seed.with_timezone(&self.zone).date_naive()
    }

    /// Takes the chosen date; the seed's time of day stays as the
    /// provisional time.
    #[must_use]
    pub fn choose(self, date: NaiveDate) -> TimeStep<Tz> {
        let local = self.seed.with_timezone(&self.zone);
        let provisional =
            NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or(NaiveTime::MIN);
        TimeStep {
            date,
            provisional,
            zone: self.zone,
        }
    }
}

/// Date chosen, waiting for a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeStep<Tz = LocalZone> {
    date: NaiveDate,
    provisional: NaiveTime,
    zone: Tz,
}

impl<Tz: TimeZone> TimeStep<Tz> {
    /// The chosen calendar date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// The chosen date at the previous time of day.
    #[must_use]
    pub fn provisional(&self) -> Option<DateTime<Utc>> {
        compose(self.date, self.provisional, &self.zone).ok()
    }

    /// Combines the chosen date with `hour:minute`.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::InvalidTime`] if the hour is not 0–23 or the
    /// minute is not 0–59.
    pub fn choose(self, hour: u32, minute: u32) -> Result<DateTime<Utc>, PickError> {
        let time =
            NaiveTime::from_hms_opt(hour, minute, 0).ok_or(PickError::InvalidTime { hour, minute })?;
        compose(self.date, time, &self.zone)
    }
}

/// Where the picker currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerState<Tz = LocalZone> {
    /// No pick in progress.
    Idle,
    /// Waiting for a date.
    PickingDate(DateStep<Tz>),
    /// Waiting for a time.
    PickingTime(TimeStep<Tz>),
}

/// Drives one date-then-time pick at a time.
#[derive(Debug, Clone)]
pub struct DueDateComposer<Tz = LocalZone> {
    state: PickerState<Tz>,
    zone: Tz,
}

impl<Tz: TimeZone + Copy + fmt::Debug> DueDateComposer<Tz> {
    /// Creates an idle composer working in `zone`.
    #[must_use]
    pub const fn new(zone: Tz) -> Self {
        Self {
            state: PickerState::Idle,
            zone,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &PickerState<Tz> {
        &self.state
    }

    /// Whether no pick is in progress.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, PickerState::Idle)
    }

    /// Starts a pick seeded with `current`.
    ///
    /// Returns `false` and changes nothing if a pick is already open.
    pub fn begin_pick(&mut self, current: DateTime<Utc>) -> bool {
        if !self.is_idle() {
            tracing::debug!("pick already in progress, ignoring");
            return false;
        }
        self.state = PickerState::PickingDate(DateStep {
            seed: current,
            zone: self.zone,
        });
        true
    }

    /// Chooses the date. Returns the new time step, or `None` if no date
    /// was being picked.
    pub fn choose_date(&mut self, date: NaiveDate) -> Option<TimeStep<Tz>> {
        let PickerState::PickingDate(step) = self.state else {
            tracing::debug!(state = ?self.state, "date chosen while not picking a date, ignoring");
            return None;
        };
        let next = step.choose(date);
        self.state = PickerState::PickingTime(next);
        Some(next)
    }

    /// Chooses the time and finishes the pick.
    ///
    /// Returns the composed due date, or `Ok(None)` if no time was being
    /// picked.
    ///
    /// # Errors
    ///
    /// Returns a [`PickError`] if the time is invalid; the picker stays
    /// waiting for a time.
    pub fn choose_time(
        &mut self,
        hour: u32,
        minute: u32,
    ) -> Result<Option<DateTime<Utc>>, PickError> {
        let PickerState::PickingTime(step) = self.state else {
            tracing::debug!(state = ?self.state, "time chosen while not picking a time, ignoring");
            return Ok(None);
        };
        let due = step.choose(hour, minute)?;
        self.state = PickerState::Idle;
        Ok(Some(due))
    }

    /// Abandons any open pick. Returns `true` if one was open.
    pub fn cancel(&mut self) -> bool {
        let was_open = !self.is_idle();
        self.state = PickerState::Idle;
        was_open
    }
}
