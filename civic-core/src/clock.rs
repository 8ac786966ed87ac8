//! Accelerated simulation clock.
//!
//! Tracks the time of day in (fractional) minutes since midnight plus the
//! calendar date. Simulated time advances proportionally to real elapsed time.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

use crate::config::ClockConfig;
use crate::error::{CivicError, Result};

/// Minutes in one simulated day.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Clock that tracks both time of day and calendar date.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    /// How many simulated minutes elapse per real second.
    pub minutes_per_second: f64,
    minutes: f64,
    current_date: NaiveDate,
}

impl SimulationClock {
    /// Create a clock at `start_minutes` past midnight on `start_date`.
    #[must_use]
    pub fn new(minutes_per_second: f64, start_date: NaiveDate, start_minutes: f64) -> Self {
        let mut clock = Self {
            minutes_per_second,
            minutes: 0.0,
            current_date: start_date,
        };
        // Normalise out-of-range start values through the regular path.
        if let Err(err) = clock.advance_minutes(start_minutes.max(0.0)) {
            warn!(%err, "Start time out of range; starting at midnight");
        }
        clock
    }

    /// Build a clock from configuration.
    #[must_use]
    pub fn from_config(config: &ClockConfig) -> Self {
        Self::new(
            config.minutes_per_second,
            config.start_date,
            f64::from(config.start_minutes),
        )
    }

    /// Advance by `dt_seconds` of real time.
    ///
    /// Negative or non-finite deltas are ignored.
    ///
    /// # Errors
    /// Returns [`CivicError::DateOverflow`] if the new date is past what the
    /// calendar can represent; the clock is left unchanged.
    pub fn advance(&mut self, dt_seconds: f64) -> Result<()> {
        if !dt_seconds.is_finite() || dt_seconds <= 0.0 {
            return Ok(());
        }
        self.advance_minutes(dt_seconds * self.minutes_per_second)
    }

    fn advance_minutes(&mut self, delta: f64) -> Result<()> {
        let day = f64::from(MINUTES_PER_DAY);
        let total = self.minutes + delta;
        if total < day {
            self.minutes = total;
            return Ok(());
        }
        let days = (total / day).floor();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole_days = days as u64;
        let date = Some(self.current_date)
            .filter(|_| total.is_finite())
            .and_then(|d| d.checked_add_days(Days::new(whole_days)))
            .ok_or(CivicError::DateOverflow {
                from: self.current_date,
                days: whole_days,
            })?;
        self.current_date = date;
        self.minutes = total - days * day;
        Ok(())
    }

    /// Whole minutes since midnight, in `0..1440`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn minute_of_day(&self) -> u32 {
        (self.minutes.floor() as u32) % MINUTES_PER_DAY
    }

    /// Current hour of day (0–23).
    #[must_use]
    pub fn hour(&self) -> u32 {
        self.minute_of_day() / 60
    }

    /// Current minute within the hour (0–59).
    #[must_use]
    pub fn minute(&self) -> u32 {
        self.minute_of_day() % 60
    }

    /// Current calendar date.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.current_date
    }

    /// Current simulated date and time, truncated to the minute.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN);
        self.current_date.and_time(time)
    }

    /// Time of day as `hh:mm AM/PM`.
    #[must_use]
    pub fn formatted_time(&self) -> String {
        let hour = self.hour();
        let suffix = if hour < 12 { "AM" } else { "PM" };
        let display_hour = match hour % 12 {
            0 => 12,
            h => h,
        };
        format!("{display_hour:02}:{:02} {suffix}", self.minute())
    }

    /// Date as `Jan 01, 2026`.
    #[must_use]
    pub fn formatted_date(&self) -> String {
        self.current_date.format("%b %d, %Y").to_string()
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::from_config(&ClockConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date")
    }

    #[test]
    fn advances_proportionally_to_real_time() {
        let mut clock = SimulationClock::new(30.0, jan_first(), 8.0 * 60.0);
        clock.advance(2.0).expect("in range");
        assert_eq!(clock.minute_of_day(), 8 * 60 + 60);
        assert_eq!(clock.date(), jan_first());
    }

    #[test]
    fn rolls_over_multiple_days() {
        let mut clock = SimulationClock::new(720.0, jan_first(), 23.0 * 60.0);
        // 5 real seconds = 3600 simulated minutes = 2.5 days
        clock.advance(5.0).expect("in range");
        assert_eq!(clock.date(), NaiveDate::from_ymd_opt(2026, 1, 4).expect("valid"));
        assert_eq!(clock.minute_of_day(), 11 * 60);
    }

    #[test]
    fn ignores_negative_and_nan_deltas() {
        let mut clock = SimulationClock::new(30.0, jan_first(), 450.0);
        clock.advance(-3.0).expect("ignored");
        clock.advance(f64::NAN).expect("ignored");
        assert_eq!(clock.minute_of_day(), 450);
    }

    #[test]
    fn overflowing_advance_is_an_error_and_keeps_time() {
        let mut clock = SimulationClock::new(720.0, jan_first(), 450.0);
        let err = clock.advance(1e300).expect_err("past the calendar");
        assert!(matches!(err, CivicError::DateOverflow { from, .. } if from == jan_first()));
        assert_eq!(clock.date(), jan_first());
        assert_eq!(clock.minute_of_day(), 450);

        clock.advance(1.0).expect("still usable");
        assert_eq!(clock.minute_of_day(), 450 + 720);
    }

    #[test]
    fn absurd_start_minutes_start_at_midnight() {
        let clock = SimulationClock::new(720.0, jan_first(), f64::MAX);
        assert_eq!(clock.date(), jan_first());
        assert_eq!(clock.minute_of_day(), 0);
    }

    #[test]
    fn formats_like_the_hud() {
        let clock = SimulationClock::new(30.0, jan_first(), 0.0);
        assert_eq!(clock.formatted_time(), "12:00 AM");
        assert_eq!(clock.formatted_date(), "Jan 01, 2026");

        let clock = SimulationClock::new(30.0, jan_first(), 13.0 * 60.0 + 5.0);
        assert_eq!(clock.formatted_time(), "01:05 PM");
        assert_eq!(clock.now().format("%H:%M").to_string(), "13:05");
    }
}
