//! Calendar occurrences: weekly rules expanded for one month, merged with
//! one-off events.
//!
//! Rules carry a local time of day, so expansion happens in a fixed UTC
//! offset (the academy's wall clock) and every occurrence keeps that offset.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Timelike, Utc,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::model::{ScheduleEvent, ScheduleRule};

/// Longest a recurring session may run.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

static TIME_HM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2}):(\d{2})\s*$").expect("valid time regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("title is required")]
    MissingTitle,
    #[error("at least one weekday (0-6) is required")]
    MissingWeekdays,
    #[error("duration must be between 1 and {MAX_DURATION_MINUTES} minutes, got {0}")]
    InvalidDuration(i64),
    #[error("invalid time of day: {0}")]
    InvalidTime(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("end date is before start date")]
    InvertedRange,
    #[error("event ends before it starts")]
    InvertedEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    pub offset: FixedOffset,
    pub default_duration_minutes: i64,
    pub default_time: (u32, u32),
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix()),
            default_duration_minutes: 60,
            default_time: (19, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceSource {
    Rule,
    Event,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_at: DateTime<FixedOffset>,
    pub end_at: DateTime<FixedOffset>,
    pub teacher: String,
    pub place: String,
    pub source: OccurrenceSource,
}

impl Occurrence {
    pub fn from_event(event: &ScheduleEvent, offset: FixedOffset) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            kind: event.kind.clone(),
            start_at: event.start_at.with_timezone(&offset),
            end_at: event.end_at.with_timezone(&offset),
            teacher: event.teacher.clone(),
            place: event.place.clone(),
            source: OccurrenceSource::Event,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }
}

pub fn parse_time_hm(s: &str) -> Option<(u32, u32)> {
    let caps = TIME_HM.captures(s)?;
    let h: u32 = caps[1].parse().ok()?;
    let m: u32 = caps[2].parse().ok()?;
    (h < 24 && m < 60).then_some((h, m))
}

pub fn parse_date_ymd(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn valid_weekdays(rule: &ScheduleRule) -> Vec<u32> {
    rule.weekdays
        .iter()
        .map(|d| u32::from(*d))
        .filter(|d| *d <= 6)
        .collect()
}

/// Checks applied when an admin saves a rule. Expansion itself is lenient.
pub fn validate_rule(rule: &ScheduleRule) -> Result<(), ScheduleError> {
    if rule.title.trim().is_empty() {
        return Err(ScheduleError::MissingTitle);
    }
    if valid_weekdays(rule).is_empty() {
        return Err(ScheduleError::MissingWeekdays);
    }
    if parse_time_hm(&rule.time).is_none() {
        return Err(ScheduleError::InvalidTime(rule.time.clone()));
    }
    // Zero means "use the default length".
    if rule.duration_minutes != 0 && !(1..=MAX_DURATION_MINUTES).contains(&rule.duration_minutes) {
        return Err(ScheduleError::InvalidDuration(rule.duration_minutes));
    }
    let start = optional_date(&rule.start_date)?;
    let end = optional_date(&rule.end_date)?;
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ScheduleError::InvertedRange);
        }
    }
    Ok(())
}

pub fn validate_event(event: &ScheduleEvent) -> Result<(), ScheduleError> {
    if event.title.trim().is_empty() {
        return Err(ScheduleError::MissingTitle);
    }
    if event.end_at < event.start_at {
        return Err(ScheduleError::InvertedEvent);
    }
    Ok(())
}

fn optional_date(s: &str) -> Result<Option<NaiveDate>, ScheduleError> {
    if s.trim().is_empty() {
        return Ok(None);
    }
    parse_date_ymd(s)
        .map(Some)
        .ok_or_else(|| ScheduleError::InvalidDate(s.to_string()))
}

fn month_days(year: i32, month: u32) -> Result<Vec<NaiveDate>, ScheduleError> {
    let first =
        NaiveDate::from_ymd_opt(year, month, 1).ok_or(ScheduleError::InvalidMonth { year, month })?;
    Ok(first
        .iter_days()
        .take_while(|d| d.month() == month)
        .collect())
}

/// Expand weekly rules into concrete occurrences for one month, sorted by start.
///
/// Rules without a title or without a valid weekday are skipped. Unset date
/// bounds default to a window from the previous year through two years ahead.
pub fn expand_month(
    rules: &[ScheduleRule],
    year: i32,
    month: u32,
    opts: &ExpandOptions,
) -> Result<Vec<Occurrence>, ScheduleError> {
    let days = month_days(year, month)?;
    let default_start = NaiveDate::from_ymd_opt(year - 1, 1, 1);
    let default_end = NaiveDate::from_ymd_opt(year + 2, 12, 31);

    let mut out = Vec::new();
    for rule in rules {
        let weekdays = valid_weekdays(rule);
        if rule.title.trim().is_empty() || weekdays.is_empty() {
            continue;
        }
        let start_bound = parse_date_ymd(&rule.start_date).or(default_start);
        let end_bound = parse_date_ymd(&rule.end_date).or(default_end);
        let (h, m) = parse_time_hm(&rule.time).unwrap_or(opts.default_time);
        let minutes = if (1..=MAX_DURATION_MINUTES).contains(&rule.duration_minutes) {
            rule.duration_minutes
        } else {
            opts.default_duration_minutes
        };
        let Some(length) = Duration::try_minutes(minutes) else {
            continue;
        };

        for day in &days {
            if !weekdays.contains(&day.weekday().num_days_from_sunday()) {
                continue;
            }
            if start_bound.is_some_and(|b| *day < b) || end_bound.is_some_and(|b| *day > b) {
                continue;
            }
            let Some(start_at) = local_at(opts.offset, *day, h, m) else {
                continue;
            };
            let Some(end_at) = start_at.checked_add_signed(length) else {
                continue;
            };
            out.push(Occurrence {
                id: format!("{}_{}", rule.id, day.format("%Y-%m-%d")),
                title: rule.title.clone(),
                kind: rule.kind.clone(),
                start_at,
                end_at,
                teacher: rule.teacher.clone(),
                place: rule.place.clone(),
                source: OccurrenceSource::Rule,
            });
        }
    }
    out.sort_by_key(|o| o.start_at);
    Ok(out)
}

fn local_at(offset: FixedOffset, day: NaiveDate, h: u32, m: u32) -> Option<DateTime<FixedOffset>> {
    let naive: NaiveDateTime = day.and_hms_opt(h, m, 0)?;
    offset.from_local_datetime(&naive).single()
}

/// One-off events whose local start falls inside the month.
pub fn events_in_month(
    events: &[ScheduleEvent],
    year: i32,
    month: u32,
    offset: FixedOffset,
) -> Vec<Occurrence> {
    events
        .iter()
        .map(|e| Occurrence::from_event(e, offset))
        .filter(|o| o.start_at.year() == year && o.start_at.month() == month)
        .collect()
}

pub fn merge(recurring: Vec<Occurrence>, one_off: Vec<Occurrence>) -> Vec<Occurrence> {
    let mut all: Vec<Occurrence> = recurring.into_iter().chain(one_off).collect();
    all.sort_by_key(|o| o.start_at);
    all
}

/// Everything shown on the month calendar: rule occurrences plus that month's events.
pub fn build_month(
    rules: &[ScheduleRule],
    events: &[ScheduleEvent],
    year: i32,
    month: u32,
    opts: &ExpandOptions,
) -> Result<Vec<Occurrence>, ScheduleError> {
    let recurring = expand_month(rules, year, month, opts)?;
    let one_off = events_in_month(events, year, month, opts.offset);
    Ok(merge(recurring, one_off))
}

pub fn bucket_by_date(all: &[Occurrence]) -> BTreeMap<NaiveDate, Vec<Occurrence>> {
    let mut map: BTreeMap<NaiveDate, Vec<Occurrence>> = BTreeMap::new();
    for o in all {
        map.entry(o.start_at.date_naive()).or_default().push(o.clone());
    }
    map
}

/// Occurrences starting at or after `now`, optionally of one type, capped at `limit`.
pub fn upcoming(
    all: &[Occurrence],
    now: DateTime<Utc>,
    kind: Option<&str>,
    limit: usize,
) -> Vec<Occurrence> {
    all.iter()
        .filter(|o| o.start_at.with_timezone(&Utc) >= now)
        .filter(|o| kind.map_or(true, |k| o.kind == k))
        .take(limit)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub in_month: bool,
}

/// Sunday-first grid of whole weeks covering the month.
pub fn calendar_grid(year: i32, month: u32) -> Result<Vec<CalendarDay>, ScheduleError> {
    let days = month_days(year, month)?;
    let first = days[0];
    let lead = i64::from(first.weekday().num_days_from_sunday());
    let total = ((lead + days.len() as i64) + 6) / 7 * 7;
    Ok((0..total)
        .map(|i| {
            let date = first + Duration::days(i - lead);
            CalendarDay {
                date,
                in_month: date.month() == month && date.year() == year,
            }
        })
        .collect())
}

fn days_between(now: DateTime<Utc>, at: DateTime<FixedOffset>) -> i64 {
    let today = now.with_timezone(at.offset()).date_naive();
    (at.date_naive() - today).num_days()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBadge {
    Today { hour: u32, minute: u32 },
    DaysLeft(i64),
    Past,
}

impl fmt::Display for StartBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartBadge::Today { hour, minute } => write!(f, "오늘 {hour:02}:{minute:02}"),
            StartBadge::DaysLeft(n) => write!(f, "D-{n}"),
            StartBadge::Past => f.write_str("진행/지난 일정"),
        }
    }
}

pub fn start_badge(now: DateTime<Utc>, start: DateTime<FixedOffset>) -> StartBadge {
    match days_between(now, start) {
        0 => StartBadge::Today {
            hour: start.hour(),
            minute: start.minute(),
        },
        d if d > 0 => StartBadge::DaysLeft(d),
        _ => StartBadge::Past,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineBadge {
    Today,
    DaysLeft(i64),
    Closed,
}

impl fmt::Display for DeadlineBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadlineBadge::Today => f.write_str("오늘 마감"),
            DeadlineBadge::DaysLeft(n) => write!(f, "D-{n}"),
            DeadlineBadge::Closed => f.write_str("마감"),
        }
    }
}

pub fn deadline_badge(now: DateTime<Utc>, deadline: DateTime<FixedOffset>) -> DeadlineBadge {
    match days_between(now, deadline) {
        0 => DeadlineBadge::Today,
        d if d > 0 => DeadlineBadge::DaysLeft(d),
        _ => DeadlineBadge::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn rule(id: &str, weekdays: Vec<u8>, time: &str, minutes: i64) -> ScheduleRule {
        ScheduleRule {
            id: id.into(),
            title: format!("라이브 {id}"),
            kind: "live".into(),
            weekdays,
            time: time.into(),
            duration_minutes: minutes,
            start_date: String::new(),
            end_date: String::new(),
            teacher: "김지백".into(),
            place: "Zoom".into(),
        }
    }

    fn event(id: &str, kind: &str, start: &str) -> ScheduleEvent {
        let start_at = DateTime::parse_from_rfc3339(start).unwrap().with_timezone(&Utc);
        ScheduleEvent {
            id: id.into(),
            title: format!("특강 {id}"),
            kind: kind.into(),
            start_at,
            end_at: start_at + Duration::minutes(90),
            teacher: String::new(),
            place: String::new(),
        }
    }

    #[test]
    fn monday_wednesday_rule_over_february() {
        let rules = vec![rule("r1", vec![1, 3], "19:00", 90)];
        let occ = expand_month(&rules, 2027, 2, &ExpandOptions::default()).unwrap();
        assert_eq!(occ.len(), 8);
        for o in &occ {
            assert_eq!(o.duration(), Duration::minutes(90));
            assert_eq!(o.start_at.hour(), 19);
            let wd = o.start_at.weekday().num_days_from_sunday();
            assert!(wd == 1 || wd == 3);
        }
        assert!(occ.windows(2).all(|w| w[0].start_at <= w[1].start_at));
        assert_eq!(occ[0].id, "r1_2027-02-01");
    }

    #[test]
    fn defaults_for_time_and_duration() {
        let rules = vec![rule("r", vec![0], "whenever", 0)];
        let occ = expand_month(&rules, 2026, 3, &ExpandOptions::default()).unwrap();
        assert_eq!(occ.len(), 5);
        assert_eq!(occ[0].start_at.hour(), 19);
        assert_eq!(occ[0].duration(), Duration::minutes(60));
    }

    #[test]
    fn date_range_is_inclusive() {
        let mut r = rule("r", vec![1], "20:30", 80);
        r.start_date = "2026-02-09".into();
        r.end_date = "2026-02-16".into();
        let occ = expand_month(&[r], 2026, 2, &ExpandOptions::default()).unwrap();
        let days: Vec<String> = occ
            .iter()
            .map(|o| o.start_at.format("%Y-%m-%d").to_string())
            .collect();
        assert_eq!(days, vec!["2026-02-09", "2026-02-16"]);
    }

    #[test]
    fn skips_untitled_and_weekdayless_rules() {
        let mut untitled = rule("a", vec![1], "19:00", 60);
        untitled.title = "  ".into();
        let no_days = rule("b", vec![7, 9], "19:00", 60);
        let occ = expand_month(&[untitled, no_days], 2026, 2, &ExpandOptions::default()).unwrap();
        assert!(occ.is_empty());
    }

    #[test]
    fn rejects_bad_month() {
        let err = expand_month(&[], 2026, 13, &ExpandOptions::default()).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidMonth { year: 2026, month: 13 });
    }

    #[test]
    fn merged_list_is_sorted_regardless_of_input_order() {
        let events = vec![
            event("late", "special", "2026-02-27T10:00:00+09:00"),
            event("early", "deadline", "2026-02-02T08:00:00+09:00"),
            event("other-month", "special", "2026-03-02T08:00:00+09:00"),
        ];
        let rules = vec![rule("r2", vec![2, 4], "19:00", 90), rule("r1", vec![1], "20:30", 80)];
        let all = build_month(&rules, &events, 2026, 2, &ExpandOptions::default()).unwrap();
        assert!(all.windows(2).all(|w| w[0].start_at <= w[1].start_at));
        assert_eq!(all[0].id, "early");
        assert!(all.iter().all(|o| o.id != "other-month"));
        assert_eq!(all.iter().filter(|o| o.source == OccurrenceSource::Event).count(), 2);
    }

    #[test]
    fn event_month_uses_local_offset() {
        // 2026-02-28 23:30 UTC is already March 1st in KST.
        let e = event("edge", "special", "2026-02-28T23:30:00Z");
        assert!(events_in_month(&[e.clone()], 2026, 2, kst()).is_empty());
        assert_eq!(events_in_month(&[e], 2026, 3, kst()).len(), 1);
    }

    #[test]
    fn buckets_by_local_date() {
        let rules = vec![rule("r", vec![1], "19:00", 60), rule("s", vec![1], "21:00", 60)];
        let occ = expand_month(&rules, 2026, 2, &ExpandOptions::default()).unwrap();
        let buckets = bucket_by_date(&occ);
        assert_eq!(buckets.len(), 4);
        let first = buckets
            .get(&NaiveDate::from_ymd_opt(2026, 2, 2).unwrap())
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "r_2026-02-02");
    }

    #[test]
    fn upcoming_filters_and_caps() {
        let rules = vec![rule("r", vec![0, 1, 2, 3, 4, 5, 6], "19:00", 60)];
        let events = vec![event("sp", "special", "2026-02-20T12:00:00+09:00")];
        let all = build_month(&rules, &events, 2026, 2, &ExpandOptions::default()).unwrap();
        let now = DateTime::parse_from_rfc3339("2026-02-10T19:00:00+09:00")
            .unwrap()
            .with_timezone(&Utc);

        let next = upcoming(&all, now, None, 7);
        assert_eq!(next.len(), 7);
        assert_eq!(next[0].id, "r_2026-02-10");

        let special = upcoming(&all, now, Some("special"), 7);
        assert_eq!(special.len(), 1);
        assert_eq!(special[0].id, "sp");

        assert!(upcoming(&all, now, Some("study"), 7).is_empty());
    }

    #[test]
    fn grid_covers_whole_weeks() {
        // February 2026 starts on a Sunday and has exactly four weeks.
        let grid = calendar_grid(2026, 2).unwrap();
        assert_eq!(grid.len(), 28);
        assert!(grid.iter().all(|d| d.in_month));

        let grid = calendar_grid(2026, 3).unwrap();
        assert_eq!(grid.len() % 7, 0);
        assert_eq!(grid.iter().filter(|d| d.in_month).count(), 31);
        assert_eq!(grid[0].date.weekday().num_days_from_sunday(), 0);
    }

    #[test]
    fn badges() {
        let now = DateTime::parse_from_rfc3339("2026-02-10T09:00:00+09:00")
            .unwrap()
            .with_timezone(&Utc);
        let today = DateTime::parse_from_rfc3339("2026-02-10T19:05:00+09:00").unwrap();
        let later = DateTime::parse_from_rfc3339("2026-02-13T08:00:00+09:00").unwrap();
        let past = DateTime::parse_from_rfc3339("2026-02-09T23:59:00+09:00").unwrap();

        assert_eq!(start_badge(now, today).to_string(), "오늘 19:05");
        assert_eq!(start_badge(now, later).to_string(), "D-3");
        assert_eq!(start_badge(now, past).to_string(), "진행/지난 일정");

        assert_eq!(deadline_badge(now, today).to_string(), "오늘 마감");
        assert_eq!(deadline_badge(now, later).to_string(), "D-3");
        assert_eq!(deadline_badge(now, past).to_string(), "마감");
    }

    #[test]
    fn rule_validation() {
        assert!(validate_rule(&rule("ok", vec![1], "19:00", 60)).is_ok());
        assert_eq!(
            validate_rule(&rule("t", vec![1], "25:00", 60)),
            Err(ScheduleError::InvalidTime("25:00".into()))
        );
        assert_eq!(
            validate_rule(&rule("w", vec![], "19:00", 60)),
            Err(ScheduleError::MissingWeekdays)
        );
        let mut inverted = rule("i", vec![1], "19:00", 60);
        inverted.start_date = "2026-03-01".into();
        inverted.end_date = "2026-02-01".into();
        assert_eq!(validate_rule(&inverted), Err(ScheduleError::InvertedRange));
        assert_eq!(
            validate_rule(&rule("long", vec![1], "19:00", 1441)),
            Err(ScheduleError::InvalidDuration(1441))
        );
        assert_eq!(
            validate_rule(&rule("neg", vec![1], "19:00", -5)),
            Err(ScheduleError::InvalidDuration(-5))
        );
        assert!(validate_rule(&rule("default", vec![1], "19:00", 0)).is_ok());
    }

    #[test]
    fn oversized_duration_falls_back_to_default() {
        let rules = vec![
            rule("huge", vec![1], "19:00", i64::MAX / 1000),
            rule("negative", vec![2], "19:00", -30),
        ];
        let occ = expand_month(&rules, 2026, 3, &ExpandOptions::default()).unwrap();
        assert_eq!(occ.len(), 5 + 5);
        assert!(occ.iter().all(|o| o.duration() == Duration::minutes(60)));
    }
}
