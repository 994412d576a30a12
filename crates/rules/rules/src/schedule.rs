//! The schedule predicate that gates whether a rule is even considered at
//! a given instant, independent of whether its condition tree would fire.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use factoryops_core::{ScheduleConfig, ScheduleType};

/// Evaluate `is_scheduled(rule, now, tz)` from the rule evaluator design:
/// `always` is trivially true, `time_window` checks weekday and
/// time-of-day (wrapping past midnight when `end_time < start_time`), and
/// `date_range` checks the calendar date.
///
/// A `time_window`/`date_range` rule whose config is missing the fields it
/// needs is treated as not scheduled, matching the conservative handling of
/// malformed rules elsewhere in the evaluator.
#[must_use]
pub fn is_scheduled(
    schedule_type: ScheduleType,
    config: &ScheduleConfig,
    now: DateTime<Utc>,
    tz: Tz,
) -> bool {
    let local = now.with_timezone(&tz);
    match schedule_type {
        ScheduleType::Always => true,
        ScheduleType::TimeWindow => {
            let (Some(start), Some(end)) = (config.start_time, config.end_time) else {
                return false;
            };
            if !config.days.is_empty() && !config.days.contains(&local.weekday()) {
                return false;
            }
            let time_of_day = local.time();
            if end < start {
                // Window wraps past midnight: in-window iff at or after
                // start, or at or before end.
                time_of_day >= start || time_of_day <= end
            } else {
                time_of_day >= start && time_of_day <= end
            }
        }
        ScheduleType::DateRange => {
            let (Some(start), Some(end)) = (config.start_date, config.end_date) else {
                return false;
            };
            let date = local.date_naive();
            date >= start && date <= end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Weekday};

    fn kolkata() -> Tz {
        "Asia/Kolkata".parse().unwrap()
    }

    #[test]
    fn always_is_always_scheduled() {
        let now = Utc::now();
        assert!(is_scheduled(
            ScheduleType::Always,
            &ScheduleConfig::default(),
            now,
            Tz::UTC
        ));
    }

    #[test]
    fn time_window_gates_by_weekday_and_time() {
        let config = ScheduleConfig {
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start_time: Some(NaiveTime::from_hms_opt(6, 0, 0).unwrap()),
            end_time: Some(NaiveTime::from_hms_opt(22, 0, 0).unwrap()),
            ..Default::default()
        };
        let tz = kolkata();

        // Saturday 10:00 local -> not scheduled (wrong weekday).
        let saturday_10am_utc = tz
            .with_ymd_and_hms(2024, 6, 1, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!is_scheduled(ScheduleType::TimeWindow, &config, saturday_10am_utc, tz));

        // Monday 21:59 local -> scheduled.
        let monday_2159_utc = tz
            .with_ymd_and_hms(2024, 6, 3, 21, 59, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(is_scheduled(ScheduleType::TimeWindow, &config, monday_2159_utc, tz));

        // Monday 22:01 local -> not scheduled.
        let monday_2201_utc = tz
            .with_ymd_and_hms(2024, 6, 3, 22, 1, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!is_scheduled(ScheduleType::TimeWindow, &config, monday_2201_utc, tz));
    }

    #[test]
    fn time_window_wraps_past_midnight() {
        let config = ScheduleConfig {
            days: vec![],
            start_time: Some(NaiveTime::from_hms_opt(22, 0, 0).unwrap()),
            end_time: Some(NaiveTime::from_hms_opt(6, 0, 0).unwrap()),
            ..Default::default()
        };
        let late_night = Utc.with_ymd_and_hms(2024, 6, 3, 23, 0, 0).unwrap();
        let early_morning = Utc.with_ymd_and_hms(2024, 6, 3, 3, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        assert!(is_scheduled(ScheduleType::TimeWindow, &config, late_night, Tz::UTC));
        assert!(is_scheduled(ScheduleType::TimeWindow, &config, early_morning, Tz::UTC));
        assert!(!is_scheduled(ScheduleType::TimeWindow, &config, midday, Tz::UTC));
    }

    #[test]
    fn date_range_checks_calendar_date() {
        let config = ScheduleConfig {
            start_date: Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            end_date: Some(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()),
            ..Default::default()
        };
        let inside = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(is_scheduled(ScheduleType::DateRange, &config, inside, Tz::UTC));
        assert!(!is_scheduled(ScheduleType::DateRange, &config, outside, Tz::UTC));
    }

    #[test]
    fn malformed_time_window_config_is_not_scheduled() {
        assert!(!is_scheduled(
            ScheduleType::TimeWindow,
            &ScheduleConfig::default(),
            Utc::now(),
            Tz::UTC
        ));
    }
}
