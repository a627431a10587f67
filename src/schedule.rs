use chrono::{DateTime, Datelike, Local, Timelike, Weekday};
use tracing::warn;

use crate::api::models::Schedule;

/// Parse an "HH:MM" 24-hour time into a minute-of-day value (0-1439).
///
/// Returns `None` for anything that does not parse or is out of range;
/// callers treat such schedules as never-active rather than failing.
pub fn parse_minute_of_day(value: &str) -> Option<u16> {
    let (hours, minutes) = value.split_once(':')?;
    let hours: u16 = hours.trim().parse().ok()?;
    let minutes: u16 = minutes.trim().parse().ok()?;

    if hours > 23 || minutes > 59 {
        return None;
    }

    Some(hours * 60 + minutes)
}

/// Lowercase canonical day name for a weekday
fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Whether a single schedule is active at the given local time.
///
/// Restriction windows are wall-clock concepts for the child's day, so
/// `now` must be in the device's local zone.
pub fn is_active(schedule: &Schedule, now: DateTime<Local>) -> bool {
    if !schedule.is_active {
        return false;
    }

    let day = weekday_name(now.weekday());
    if !schedule.days_of_week.iter().any(|d| d == day) {
        return false;
    }

    let (start, end) = match (
        parse_minute_of_day(&schedule.start_time),
        parse_minute_of_day(&schedule.end_time),
    ) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            warn!(
                "Schedule {} ('{}') has malformed times ({} - {}); treating as never active",
                schedule.id, schedule.name, schedule.start_time, schedule.end_time
            );
            return false;
        }
    };

    let cur = (now.hour() * 60 + now.minute()) as u16;

    if end > start {
        // Same-day window, inclusive at both ends
        start <= cur && cur <= end
    } else {
        // Window wraps midnight. Note start == end takes this branch and
        // matches only at exactly that minute; inherited behavior, kept
        // as-is.
        cur >= start || cur <= end
    }
}

/// Whether any schedule in the set is active at the given local time
pub fn any_active(schedules: &[Schedule], now: DateTime<Local>) -> bool {
    schedules.iter().any(|schedule| is_active(schedule, now))
}
