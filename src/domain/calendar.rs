use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashSet;

pub const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// Every calendar day in `[start, end]`, inclusive.
///
/// Days are stepped on `NaiveDate`, which carries no time or zone, so the
/// sequence is immune to daylight-saving and local-offset drift. An inverted
/// range yields nothing.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start
        .iter_days()
        .take_while(move |day| *day <= end)
}

/// Days in `[start, end]` whose weekday is in `weekdays`.
pub fn qualifying_days<'a>(
    start: NaiveDate,
    end: NaiveDate,
    weekdays: &'a HashSet<Weekday>,
) -> impl Iterator<Item = NaiveDate> + 'a {
    days_inclusive(start, end).filter(move |day| weekdays.contains(&day.weekday()))
}

/// Sunday-based weekday index (Sunday = 0), matching the calendar grid columns.
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

pub fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn parse_date(value: &str, field_name: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_month_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month_first
        .and_then(|next| next.pred_opt())
        .unwrap_or(first);
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn days_inclusive_covers_both_ends() {
        let days = days_inclusive(date("2024-06-10"), date("2024-06-12")).collect::<Vec<_>>();
        assert_eq!(
            days,
            vec![date("2024-06-10"), date("2024-06-11"), date("2024-06-12")]
        );
    }

    #[test]
    fn days_inclusive_is_empty_for_inverted_range() {
        assert_eq!(days_inclusive(date("2024-06-12"), date("2024-06-10")).count(), 0);
    }

    #[test]
    fn days_inclusive_steps_across_dst_transitions() {
        // 2024-03-10 and 2024-11-03 are DST switch days in North America,
        // 2024-03-31 and 2024-10-27 in Europe.
        let days = days_inclusive(date("2024-03-09"), date("2024-04-01")).collect::<Vec<_>>();
        assert_eq!(days.len(), 24);
        assert!(days.contains(&date("2024-03-10")));
        assert!(days.contains(&date("2024-03-31")));
        assert_eq!(days_inclusive(date("2024-10-26"), date("2024-11-04")).count(), 10);
    }

    #[test]
    fn qualifying_days_filters_by_weekday() {
        let weekdays = HashSet::from([Weekday::Mon, Weekday::Wed]);
        let days = qualifying_days(date("2024-06-09"), date("2024-06-16"), &weekdays)
            .collect::<Vec<_>>();
        assert_eq!(days, vec![date("2024-06-10"), date("2024-06-12")]);
    }

    #[test]
    fn weekday_index_is_sunday_based() {
        assert_eq!(weekday_index(date("2024-06-09")), 0);
        assert_eq!(weekday_index(date("2024-06-10")), 1);
        assert_eq!(weekday_index(date("2024-06-15")), 6);
    }

    #[test]
    fn parse_weekday_accepts_short_and_long_names() {
        assert_eq!(parse_weekday("Mon"), Some(Weekday::Mon));
        assert_eq!(parse_weekday(" saturday "), Some(Weekday::Sat));
        assert_eq!(parse_weekday("someday"), None);
        for weekday in ALL_WEEKDAYS {
            assert_eq!(parse_weekday(weekday_name(weekday)), Some(weekday));
        }
    }

    #[test]
    fn month_bounds_handles_december_and_leap_years() {
        assert_eq!(
            month_bounds(date("2024-12-15")),
            (date("2024-12-01"), date("2024-12-31"))
        );
        assert_eq!(
            month_bounds(date("2024-02-10")),
            (date("2024-02-01"), date("2024-02-29"))
        );
    }

    proptest! {
        #[test]
        fn day_count_matches_calendar_distance(offset in 0i64..3_000, length in 0i64..400) {
            let start = date("2020-01-01") + chrono::Duration::days(offset);
            let end = start + chrono::Duration::days(length);
            prop_assert_eq!(days_inclusive(start, end).count() as i64, length + 1);
        }

        #[test]
        fn all_weekdays_keep_every_day(offset in 0i64..3_000, length in 0i64..60) {
            let start = date("2020-01-01") + chrono::Duration::days(offset);
            let end = start + chrono::Duration::days(length);
            let weekdays = ALL_WEEKDAYS.into_iter().collect::<HashSet<_>>();
            prop_assert_eq!(
                qualifying_days(start, end, &weekdays).count(),
                days_inclusive(start, end).count()
            );
        }
    }
}
