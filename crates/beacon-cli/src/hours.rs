//! Working-hours predicate.
//!
//! While someone is in the office the light stays dark; the alert only
//! runs outside this window.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};

/// Weekday/time window during which the indicator is suppressed.
///
/// Both bounds are exclusive, so an 08:45 start means the first in-hours
/// instant is 08:45:01.
#[derive(Clone, Copy, Debug)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    /// Monday through Friday, 08:45 to 18:00.
    pub fn weekdays_default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 45, 0).expect("valid time"),
            end: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
        }
    }

    /// Whether `now` falls inside the working-hours window.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let weekday = matches!(
            now.weekday(),
            Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri
        );
        weekday && self.start < now.time() && now.time() < self.end
    }

    /// Window description for startup logging.
    pub fn describe(&self) -> String {
        format!(
            "Mon-Fri {:02}:{:02}-{:02}:{:02}",
            self.start.hour(),
            self.start.minute(),
            self.end.hour(),
            self.end.minute()
        )
    }
}
