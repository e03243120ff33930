use crate::error::Error;
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

/// How far ahead `next_after` looks before giving up (covers leap-day schedules).
const MAX_SEARCH_DAYS: u64 = 4 * 366;

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// One parsed position of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CronField {
    Any,
    Single(u32),
    Range(u32, u32),
    /// `*/n`: every n-th value starting from the field minimum.
    Step(u32),
    /// Comma list of `Single` and `Range` items.
    List(Vec<CronField>),
}

impl CronField {
    fn parse(s: &str, min: u32, max: u32) -> Result<Self, String> {
        if s == "*" {
            return Ok(CronField::Any);
        }
        if let Some(step) = s.strip_prefix("*/") {
            let step = parse_number(step)?;
            if step == 0 || step > max {
                return Err(format!("step must be between 1 and {}", max));
            }
            return Ok(CronField::Step(step));
        }
        if s.contains(',') {
            let items = s
                .split(',')
                .map(|item| CronField::parse_item(item, min, max))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(CronField::List(items));
        }
        CronField::parse_item(s, min, max)
    }

    fn parse_item(s: &str, min: u32, max: u32) -> Result<Self, String> {
        match s.split_once('-') {
            Some((start, end)) => {
                let start = parse_in_range(start, min, max)?;
                let end = parse_in_range(end, min, max)?;
                if start > end {
                    return Err(format!("range {}-{} is reversed", start, end));
                }
                Ok(CronField::Range(start, end))
            }
            None => Ok(CronField::Single(parse_in_range(s, min, max)?)),
        }
    }

    fn matches(&self, value: u32, min: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Single(v) => *v == value,
            CronField::Range(start, end) => (*start..=*end).contains(&value),
            CronField::Step(step) => value >= min && (value - min) % step == 0,
            CronField::List(items) => items.iter().any(|item| item.matches(value, min)),
        }
    }

    fn is_any(&self) -> bool {
        matches!(self, CronField::Any)
    }

    fn single(&self) -> Option<u32> {
        match self {
            CronField::Single(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronField::Any => write!(f, "*"),
            CronField::Single(v) => write!(f, "{}", v),
            CronField::Range(start, end) => write!(f, "{}-{}", start, end),
            CronField::Step(step) => write!(f, "*/{}", step),
            CronField::List(items) => {
                let items: Vec<String> = items.iter().map(|item| item.to_string()).collect();
                write!(f, "{}", items.join(","))
            }
        }
    }
}

/// A validated five-field cron expression: minute, hour, day of month,
/// month, day of week (0 and 7 are both Sunday).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, Error> {
        let invalid = |reason: String| Error::ScheduleValidation {
            expression: expression.to_string(),
            reason,
        };

        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", parts.len())));
        }

        let field = |index: usize, name: &str, min: u32, max: u32| {
            CronField::parse(parts[index], min, max)
                .map_err(|reason| invalid(format!("{} '{}': {}", name, parts[index], reason)))
        };

        Ok(Self {
            minute: field(0, "minute", 0, 59)?,
            hour: field(1, "hour", 0, 23)?,
            day_of_month: field(2, "day of month", 1, 31)?,
            month: field(3, "month", 1, 12)?,
            day_of_week: field(4, "day of week", 0, 7)?,
        })
    }

    pub fn expression(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }

    /// Whether the schedule fires on `date`. Like cron, when both day of
    /// month and day of week are restricted, either one matching is enough.
    fn matches_date(&self, date: NaiveDate) -> bool {
        if !self.month.matches(date.month(), 1) {
            return false;
        }
        let weekday = date.weekday().num_days_from_sunday();
        let dom = self.day_of_month.matches(date.day(), 1);
        let dow = self.day_of_week.matches(weekday, 0)
            || (weekday == 0 && self.day_of_week.matches(7, 0));

        match (self.day_of_month.is_any(), self.day_of_week.is_any()) {
            (false, false) => dom || dow,
            _ => dom && dow,
        }
    }

    /// First minute strictly after `now` at which the schedule fires.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        for offset in 0..=MAX_SEARCH_DAYS {
            let date = now.date().checked_add_days(Days::new(offset))?;
            if !self.matches_date(date) {
                continue;
            }
            for hour in (0..24).filter(|h| self.hour.matches(*h, 0)) {
                if date == now.date() && hour < now.hour() {
                    continue;
                }
                for minute in (0..60).filter(|m| self.minute.matches(*m, 0)) {
                    let candidate = date.and_hms_opt(hour, minute, 0)?;
                    if candidate > now {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Human description with the next occurrence after `now`. Daily,
    /// weekly and hourly patterns are named; anything else echoes the
    /// expression.
    pub fn describe_next(&self, now: NaiveDateTime) -> String {
        let label = self
            .pattern_label()
            .unwrap_or_else(|| format!("cron schedule '{}'", self.expression()));
        match self.next_after(now) {
            Some(next) => format!("{} (next run {})", label, next.format("%Y-%m-%d %H:%M")),
            None => label,
        }
    }

    fn pattern_label(&self) -> Option<String> {
        if !self.day_of_month.is_any() || !self.month.is_any() {
            return None;
        }
        let minute = self.minute.single()?;
        match (&self.hour, &self.day_of_week) {
            (CronField::Single(hour), CronField::Any) => {
                Some(format!("daily at {:02}:{:02}", hour, minute))
            }
            (CronField::Single(hour), CronField::Single(weekday)) => Some(format!(
                "weekly on {} at {:02}:{:02}",
                WEEKDAYS[(*weekday % 7) as usize],
                hour,
                minute
            )),
            (CronField::Any, CronField::Any) => Some(format!("hourly at minute {}", minute)),
            _ => None,
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

impl FromStr for CronSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CronSchedule::parse(s)
    }
}

fn parse_number(s: &str) -> Result<u32, String> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("'{}' is not a number", s));
    }
    s.parse::<u32>().map_err(|_| format!("'{}' is not a number", s))
}

fn parse_in_range(s: &str, min: u32, max: u32) -> Result<u32, String> {
    let n = parse_number(s)?;
    if n < min || n > max {
        return Err(format!("{} is outside {}-{}", n, min, max));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_accepts_valid_expressions() {
        for expr in [
            "0 3 * * 0",
            "*/15 * * * *",
            "0 2 1-15 * 1,3,5",
            "30 23 31 12 7",
            "0 0 * 1,6-8 *",
        ] {
            assert!(CronSchedule::parse(expr).is_ok(), "{} should be valid", expr);
        }
    }

    #[test]
    fn test_rejects_out_of_range_and_malformed() {
        for expr in [
            "60 3 * * 0",
            "0 24 * * *",
            "0 3 0 * *",
            "0 3 * 13 *",
            "0 3 * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "0 3 * *",
            "0 3 * * 0 extra",
            "a 3 * * *",
            "0 3 * * -1",
            "",
        ] {
            assert!(
                matches!(CronSchedule::parse(expr), Err(Error::ScheduleValidation { .. })),
                "{} should be rejected",
                expr
            );
        }
    }

    #[test]
    fn test_daily_description() {
        let schedule = CronSchedule::parse("0 3 * * *").unwrap();
        assert_eq!(
            schedule.describe_next(at(2026, 10, 18, 1, 0)),
            "daily at 03:00 (next run 2026-10-18 03:00)"
        );
        assert_eq!(
            schedule.describe_next(at(2026, 10, 18, 3, 0)),
            "daily at 03:00 (next run 2026-10-19 03:00)"
        );
    }

    #[test]
    fn test_weekly_description() {
        // 2026-10-18 is a Sunday
        let schedule = CronSchedule::parse("0 3 * * 0").unwrap();
        assert_eq!(
            schedule.describe_next(at(2026, 10, 18, 12, 0)),
            "weekly on Sunday at 03:00 (next run 2026-10-25 03:00)"
        );
        let wednesday = CronSchedule::parse("30 4 * * 3").unwrap();
        assert_eq!(
            wednesday.describe_next(at(2026, 10, 18, 12, 0)),
            "weekly on Wednesday at 04:30 (next run 2026-10-21 04:30)"
        );
    }

    #[test]
    fn test_other_patterns_echo_expression() {
        let schedule = CronSchedule::parse("*/15 * * * 1-5").unwrap();
        assert_eq!(
            schedule.describe_next(at(2026, 10, 18, 12, 0)),
            "cron schedule '*/15 * * * 1-5' (next run 2026-10-19 00:00)"
        );
        let hourly = CronSchedule::parse("5 * * * *").unwrap();
        assert_eq!(
            hourly.describe_next(at(2026, 10, 18, 12, 0)),
            "hourly at minute 5 (next run 2026-10-18 12:05)"
        );
    }

    #[test]
    fn test_impossible_date_has_no_next_run() {
        let schedule = CronSchedule::parse("0 0 31 2 *").unwrap();
        assert_eq!(schedule.next_after(at(2026, 10, 18, 12, 0)), None);
        assert_eq!(
            schedule.describe_next(at(2026, 10, 18, 12, 0)),
            "cron schedule '0 0 31 2 *'"
        );
    }

    #[test]
    fn test_field_parse() {
        assert_eq!(CronField::parse("*", 0, 59).unwrap(), CronField::Any);
        assert_eq!(CronField::parse("7", 0, 59).unwrap(), CronField::Single(7));
        assert_eq!(CronField::parse("1-5", 0, 7).unwrap(), CronField::Range(1, 5));
        assert_eq!(CronField::parse("*/15", 0, 59).unwrap(), CronField::Step(15));
        assert_eq!(
            CronField::parse("1,3-4", 1, 12).unwrap(),
            CronField::List(vec![CronField::Single(1), CronField::Range(3, 4)])
        );
        assert!(CronField::parse("1,,2", 0, 59).is_err());
        assert!(CronField::parse("*/5,1", 0, 59).is_err());
    }

    #[test]
    fn test_field_matches() {
        let step = CronField::parse("*/15", 0, 59).unwrap();
        assert!(step.matches(0, 0) && step.matches(45, 0));
        assert!(!step.matches(20, 0));

        // day-of-month steps count from 1
        let odd_days = CronField::parse("*/2", 1, 31).unwrap();
        assert!(odd_days.matches(1, 1) && odd_days.matches(31, 1));
        assert!(!odd_days.matches(2, 1));
    }

    #[test]
    fn test_expression_round_trips_through_display() {
        let schedule: CronSchedule = "0  2 1-15 *   1,3,5".parse().unwrap();
        assert_eq!(schedule.to_string(), "0 2 1-15 * 1,3,5");
    }

    #[test]
    fn test_seven_is_sunday() {
        let schedule = CronSchedule::parse("30 23 * * 7").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 10, 14, 0, 0)),
            Some(at(2026, 10, 18, 23, 30))
        );
    }

    #[test]
    fn test_day_of_month_or_day_of_week() {
        // the 1st of the month or any Monday, whichever comes first
        let schedule = CronSchedule::parse("0 6 1 * 1").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 10, 18, 12, 0)),
            Some(at(2026, 10, 19, 6, 0))
        );
        assert_eq!(
            schedule.next_after(at(2026, 10, 26, 12, 0)),
            Some(at(2026, 11, 1, 6, 0))
        );
    }

    #[test]
    fn test_next_after_skips_past_hours_of_today() {
        let schedule = CronSchedule::parse("0 2 1-15 * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 10, 15, 3, 0)),
            Some(at(2026, 11, 1, 2, 0))
        );
    }
}
