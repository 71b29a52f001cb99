//! Window validation, bucketing and the canonical timestamp text format.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{ScoreError, ScoreResult};
use crate::models::DateRange;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Windows longer than this many whole days are bucketed by week.
const DAILY_BUCKET_LIMIT_DAYS: i64 = 30;

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
}

/// The default (Unix epoch) timestamp stands in for an unset bound.
fn is_set(value: NaiveDateTime) -> bool {
    value != NaiveDateTime::default()
}

pub fn validate_range(
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
) -> ScoreResult<DateRange> {
    let from = from
        .filter(|value| is_set(*value))
        .ok_or(ScoreError::InvalidRange("missing [from]"))?;
    let to = to
        .filter(|value| is_set(*value))
        .ok_or(ScoreError::InvalidRange("missing [to]"))?;
    if from > to {
        return Err(ScoreError::InvalidRange("[from] is after [to]"));
    }
    Ok(DateRange { from, to })
}

fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    start_of_day(day)
        .checked_add_signed(Duration::days(1) - Duration::nanoseconds(1))
        .unwrap_or(NaiveDateTime::MAX)
}

pub fn generate_buckets(range: DateRange) -> Vec<DateRange> {
    if (range.to - range.from).num_days() > DAILY_BUCKET_LIMIT_DAYS {
        weekly_buckets(range)
    } else {
        daily_buckets(range)
    }
}

fn daily_buckets(range: DateRange) -> Vec<DateRange> {
    let last_day = range.to.date();
    range
        .from
        .date()
        .iter_days()
        .take_while(|day| *day <= last_day)
        .map(|day| DateRange {
            from: start_of_day(day).max(range.from),
            to: end_of_day(day).min(range.to),
        })
        .collect()
}

/// Monday-to-Sunday buckets, the first and last clipped to the window.
fn weekly_buckets(range: DateRange) -> Vec<DateRange> {
    let mut buckets = Vec::new();
    let mut start = range.from;
    loop {
        let day = start.date();
        let sunday = day
            .checked_add_signed(Duration::days(
                6 - i64::from(day.weekday().num_days_from_monday()),
            ))
            .unwrap_or(NaiveDate::MAX);
        let end = end_of_day(sunday).min(range.to);
        buckets.push(DateRange { from: start, to: end });
        match end.checked_add_signed(Duration::nanoseconds(1)) {
            Some(next) if end < range.to => start = next,
            _ => break,
        }
    }
    buckets
}

/// The window of equal duration that ends 1ns before `range` starts. Fails
/// when that window would begin before the earliest representable instant.
pub fn previous_period(range: DateRange) -> ScoreResult<DateRange> {
    let to = range
        .from
        .checked_sub_signed(Duration::nanoseconds(1))
        .ok_or(ScoreError::InvalidRange("previous period is out of range"))?;
    let from = to
        .checked_sub_signed(range.to - range.from)
        .ok_or(ScoreError::InvalidRange("previous period is out of range"))?;
    Ok(DateRange { from, to })
}

/// Parses `YYYY-MM-DD` or `YYYY-MM-DD<separator>YYYY-MM-DD` into a window
/// covering the named days entirely.
pub fn parse_period(text: &str, separator: &str) -> anyhow::Result<DateRange> {
    let parts: Vec<&str> = text.split(separator).collect();
    let (from, to) = match parts.as_slice() {
        [day] => (*day, *day),
        [from, to] => (*from, *to),
        _ => anyhow::bail!("invalid period string {text:?}"),
    };
    let from = NaiveDate::parse_from_str(from.trim(), DATE_FORMAT)?;
    let to = NaiveDate::parse_from_str(to.trim(), DATE_FORMAT)?;
    Ok(DateRange {
        from: start_of_day(from),
        to: to.and_hms_opt(23, 59, 59).unwrap_or_else(|| end_of_day(to)),
    })
}

pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(*value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> NaiveDateTime {
        parse_timestamp(value).expect("valid timestamp")
    }

    fn window(from: &str, to: &str) -> DateRange {
        DateRange {
            from: ts(from),
            to: ts(to),
        }
    }

    fn assert_contiguous(range: DateRange, buckets: &[DateRange]) {
        assert_eq!(buckets.first().map(|b| b.from), Some(range.from));
        assert_eq!(buckets.last().map(|b| b.to), Some(range.to));
        for bucket in buckets {
            assert!(bucket.from <= bucket.to);
        }
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].to + Duration::nanoseconds(1), pair[1].from);
        }
    }

    #[test]
    fn short_window_gets_one_bucket_per_day() {
        let range = window("2019-07-01T00:00:00", "2019-07-03T00:00:00");
        let buckets = generate_buckets(range);
        let days: Vec<_> = buckets
            .iter()
            .map(|b| (b.from.date().to_string(), b.to.date().to_string()))
            .collect();
        assert_eq!(
            days,
            vec![
                ("2019-07-01".to_string(), "2019-07-01".to_string()),
                ("2019-07-02".to_string(), "2019-07-02".to_string()),
                ("2019-07-03".to_string(), "2019-07-03".to_string()),
            ]
        );
        assert_contiguous(range, &buckets);
    }

    #[test]
    fn daily_buckets_follow_calendar_days_not_elapsed_hours() {
        let range = window("2019-07-01T10:00:00", "2019-07-03T08:00:00");
        let buckets = generate_buckets(range);
        assert_eq!(buckets.len(), 3);
        assert_contiguous(range, &buckets);
    }

    #[test]
    fn single_instant_window_is_one_bucket() {
        let range = window("2019-07-17T12:00:00", "2019-07-17T12:00:00");
        assert_eq!(generate_buckets(range), vec![range]);
    }

    #[test]
    fn thirty_days_is_still_daily() {
        let range = window("2019-07-01T00:00:00", "2019-07-31T00:00:00");
        let buckets = generate_buckets(range);
        assert_eq!(buckets.len(), 31);
        assert_contiguous(range, &buckets);
    }

    #[test]
    fn long_window_uses_monday_weeks() {
        // 2019-07-03 is a Wednesday.
        let range = window("2019-07-03T00:00:00", "2019-08-20T12:00:00");
        let buckets = generate_buckets(range);
        assert_contiguous(range, &buckets);
        assert_eq!(buckets[0].to.date().to_string(), "2019-07-07");
        assert_eq!(buckets[1].from, ts("2019-07-08T00:00:00"));
        for bucket in &buckets {
            assert!((bucket.to - bucket.from) < Duration::days(7));
        }
        for bucket in &buckets[1..] {
            assert_eq!(bucket.from.weekday(), chrono::Weekday::Mon);
        }
        assert_eq!(buckets.len(), 8);
    }

    #[test]
    fn rejects_inverted_and_missing_bounds() {
        let from = ts("2019-07-18T00:00:00");
        let to = ts("2019-07-17T00:00:00");
        assert!(matches!(
            validate_range(Some(from), Some(to)),
            Err(ScoreError::InvalidRange(_))
        ));
        assert!(matches!(
            validate_range(None, Some(to)),
            Err(ScoreError::InvalidRange("missing [from]"))
        ));
        assert!(matches!(
            validate_range(Some(from), Some(NaiveDateTime::default())),
            Err(ScoreError::InvalidRange("missing [to]"))
        ));
        assert!(validate_range(Some(to), Some(from)).is_ok());
    }

    #[test]
    fn previous_period_ends_one_nanosecond_before() {
        let range = window("2019-07-17T00:00:00", "2019-07-17T23:59:00");
        let previous = previous_period(range).expect("previous window");
        assert_eq!(previous.to, ts("2019-07-17T00:00:00") - Duration::nanoseconds(1));
        assert_eq!(previous.to - previous.from, range.to - range.from);
        assert_eq!(previous.from.date().to_string(), "2019-07-16");
    }

    #[test]
    fn previous_period_before_the_earliest_instant_is_rejected() {
        let at_min = DateRange {
            from: NaiveDateTime::MIN,
            to: NaiveDateTime::MIN + Duration::days(1),
        };
        assert!(matches!(
            previous_period(at_min),
            Err(ScoreError::InvalidRange(_))
        ));

        let near_min = DateRange {
            from: NaiveDateTime::MIN + Duration::hours(1),
            to: NaiveDateTime::MIN + Duration::days(2),
        };
        assert!(matches!(
            previous_period(near_min),
            Err(ScoreError::InvalidRange(_))
        ));
    }

    #[test]
    fn buckets_reach_the_latest_instant() {
        let to = NaiveDateTime::MAX;
        let daily = generate_buckets(DateRange {
            from: to - Duration::days(2),
            to,
        });
        assert_eq!(daily.len(), 3);
        assert_eq!(daily.last().map(|bucket| bucket.to), Some(to));

        let weekly = generate_buckets(DateRange {
            from: to - Duration::days(60),
            to,
        });
        assert!(weekly.len() > 1);
        assert_eq!(weekly.last().map(|bucket| bucket.to), Some(to));
        for pair in weekly.windows(2) {
            assert_eq!(pair[1].from - pair[0].to, Duration::nanoseconds(1));
        }
    }

    #[test]
    fn parses_single_day_and_ranged_periods() {
        let day = parse_period("2019-07-17", "..").expect("single day");
        assert_eq!(day, window("2019-07-17T00:00:00", "2019-07-17T23:59:59"));

        let span = parse_period("2019-07-01..2019-07-07", "..").expect("range");
        assert_eq!(span, window("2019-07-01T00:00:00", "2019-07-07T23:59:59"));

        assert!(parse_period("2019-07-01..2019-07-02..2019-07-03", "..").is_err());
        assert!(parse_period("July", "..").is_err());
    }

    #[test]
    fn timestamp_text_round_trips() {
        let value = ts("2019-07-17T10:00:00");
        assert_eq!(format_timestamp(value), "2019-07-17T10:00:00");
        assert!(parse_timestamp("2019-07-17 10:00:00").is_err());
    }
}
