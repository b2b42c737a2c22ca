//! Store-backed calendar views over the occurrence expander.

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{instrument, warn};

use crate::db::{self, Pool};
use crate::schedule::{
    bucket_by_date, build_month, calendar_grid, deadline_badge, start_badge, upcoming, CalendarDay,
    ExpandOptions, Occurrence,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub grid: Vec<CalendarDay>,
    pub by_date: BTreeMap<NaiveDate, Vec<Occurrence>>,
}

#[instrument(skip_all, fields(year = year, month = month))]
pub async fn month_view(
    pool: &Pool,
    year: i32,
    month: u32,
    opts: &ExpandOptions,
) -> Result<MonthView> {
    let rules = db::list_schedule_rules(pool).await?;
    let events = db::list_schedule_events(pool).await?;
    let all = build_month(&rules, &events, year, month, opts)?;
    Ok(MonthView {
        year,
        month,
        grid: calendar_grid(year, month)?,
        by_date: bucket_by_date(&all),
    })
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Next occurrences from `now`, looking through this month and the next.
#[instrument(skip_all)]
pub async fn upcoming_from_store(
    pool: &Pool,
    now: DateTime<Utc>,
    kind: Option<&str>,
    limit: usize,
    opts: &ExpandOptions,
) -> Result<Vec<Occurrence>> {
    let rules = db::list_schedule_rules(pool).await?;
    let events = db::list_schedule_events(pool).await?;

    let local = now.with_timezone(&opts.offset);
    let this = (local.year(), local.month());
    let mut all = Vec::new();
    for (year, month) in [this, next_month(this.0, this.1)] {
        match build_month(&rules, &events, year, month, opts) {
            Ok(mut occ) => all.append(&mut occ),
            Err(err) => warn!(year, month, error = %err, "skipping month"),
        }
    }
    Ok(upcoming(&all, now, kind, limit))
}

/// Badge text shown next to an upcoming item.
pub fn badge_text(now: DateTime<Utc>, occ: &Occurrence) -> String {
    if occ.kind == "deadline" {
        deadline_badge(now, occ.start_at).to_string()
    } else {
        start_badge(now, occ.start_at).to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingItem {
    #[serde(flatten)]
    pub occurrence: Occurrence,
    pub badge: String,
}

pub fn with_badges(now: DateTime<Utc>, list: Vec<Occurrence>) -> Vec<UpcomingItem> {
    list.into_iter()
        .map(|occurrence| UpcomingItem {
            badge: badge_text(now, &occurrence),
            occurrence,
        })
        .collect()
}
