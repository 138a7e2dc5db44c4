use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use crate::types::ScheduleFrequency;

/// Compute the next execution instant strictly after `now` for a schedule
/// anchored at `anchor`.
///
/// Catch-up, not backlog: when the engine was offline across several
/// intervals, the missed occurrences are skipped and the result jumps
/// directly past `now`, preserving the anchor's phase (time-of-day,
/// day-of-week, day-of-month).
///
/// Returns `None` for `Once` — a one-shot schedule has no next occurrence —
/// and in the degenerate case where chrono cannot represent a candidate.
pub fn next_occurrence(
    anchor: DateTime<Utc>,
    frequency: ScheduleFrequency,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match frequency {
        ScheduleFrequency::Once => None,

        ScheduleFrequency::Daily => Some(advance_by_steps(anchor, now, Duration::days(1))),

        ScheduleFrequency::Weekly => Some(advance_by_steps(anchor, now, Duration::days(7))),

        ScheduleFrequency::Monthly => {
            // Walk month by month from the anchor's (year, month) until the
            // candidate lands strictly after `now`. Start near `now` so an
            // old anchor does not cost one iteration per elapsed month.
            let mut months = months_between(anchor, now);
            loop {
                let candidate = add_months_clamped(anchor, months)?;
                if candidate > now {
                    return Some(candidate);
                }
                months += 1;
            }
        }
    }
}

/// Smallest `anchor + k * step` strictly after `now` (k >= 0).
fn advance_by_steps(anchor: DateTime<Utc>, now: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    if anchor > now {
        return anchor;
    }
    let elapsed_steps = (now - anchor).num_seconds() / step.num_seconds();
    anchor + step * (elapsed_steps as i32 + 1)
}

/// Whole calendar months from the anchor's (year, month) to now's, floored
/// at zero so a future anchor starts the walk at the anchor itself.
fn months_between(anchor: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let span = (now.year() - anchor.year()) * 12 + now.month0() as i32 - anchor.month0() as i32;
    span.max(0) as u32
}

/// `anchor` shifted forward by `months` calendar months, preserving
/// time-of-day and day-of-month, clamping the day to the target month's last
/// valid day (Jan 31 + 1 month = Feb 28, or Feb 29 in a leap year).
fn add_months_clamped(anchor: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    let zero_based = anchor.month0() + months;
    let year = anchor.year() + (zero_based / 12) as i32;
    let month = zero_based % 12 + 1;
    let day = anchor.day().min(days_in_month(year, month));

    Utc.with_ymd_and_hms(
        year,
        month,
        day,
        anchor.hour(),
        anchor.minute(),
        anchor.second(),
    )
    .single()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => unreachable!("month out of range: {month}"),
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}
