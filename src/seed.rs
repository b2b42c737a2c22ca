//! Demo catalog, schedule and accounts for local runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::db::{self, Pool};
use crate::model::{BoardKind, Category, Course, InviteCode, Lesson, ScheduleEvent, ScheduleRule};
use crate::schedule::{validate_event, validate_rule};

const DEMO_SEED: &str = include_str!("../demo/seed.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedInvite {
    pub code: String,
    #[serde(default)]
    pub max_uses: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedBoardItem {
    pub board: BoardKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub link_url: String,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub remaining: Option<i64>,
    #[serde(default)]
    pub deadline_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedData {
    pub categories: Vec<Category>,
    pub courses: Vec<Course>,
    pub lessons: Vec<Lesson>,
    pub schedule_rules: Vec<ScheduleRule>,
    pub schedule_events: Vec<ScheduleEvent>,
    pub users: Vec<SeedUser>,
    pub invite_codes: Vec<SeedInvite>,
    /// Oldest first. Only loaded into an empty board.
    pub board_items: Vec<SeedBoardItem>,
}

pub fn demo() -> Result<SeedData> {
    serde_json::from_str(DEMO_SEED).context("parse demo seed")
}

/// Upsert everything in `data`. Invite codes that already exist are skipped.
#[instrument(skip_all)]
pub async fn apply(pool: &Pool, data: &SeedData) -> Result<()> {
    for c in &data.categories {
        db::upsert_category(pool, c).await?;
    }
    for c in &data.courses {
        db::upsert_course(pool, c).await?;
    }
    for l in &data.lessons {
        db::upsert_lesson(pool, l).await?;
    }
    for r in &data.schedule_rules {
        if let Err(err) = validate_rule(r) {
            warn!(rule = %r.id, error = %err, "skipping schedule rule");
            continue;
        }
        db::upsert_schedule_rule(pool, r).await?;
    }
    for e in &data.schedule_events {
        if let Err(err) = validate_event(e) {
            warn!(event = %e.id, error = %err, "skipping schedule event");
            continue;
        }
        db::upsert_schedule_event(pool, e).await?;
    }
    for u in &data.users {
        db::upsert_user(pool, &u.id, &u.email, &u.display_name, u.is_anonymous).await?;
    }
    for i in &data.invite_codes {
        if db::get_invite_code(pool, &i.code).await?.is_some() {
            continue;
        }
        db::insert_invite_code(
            pool,
            &InviteCode {
                code: i.code.clone(),
                active: true,
                max_uses: i.max_uses,
                used_count: 0,
                expires_at: i.expires_at,
            },
        )
        .await?;
    }
    if db::recent_board_items(pool, 1).await?.is_empty() {
        for b in &data.board_items {
            db::insert_board_item(
                pool,
                b.board,
                &b.title,
                &b.body,
                &b.link_url,
                b.capacity,
                b.remaining,
                b.deadline_at,
            )
            .await?;
        }
    }
    info!(
        courses = data.courses.len(),
        rules = data.schedule_rules.len(),
        events = data.schedule_events.len(),
        "seed applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_seed_parses() {
        let data = demo().unwrap();
        assert_eq!(data.categories.len(), 5);
        assert_eq!(data.courses.len(), 3);
        assert_eq!(data.schedule_rules[0].weekdays, vec![2, 4]);
        assert!(data.schedule_events[1].teacher.is_empty());
        assert_eq!(data.invite_codes[0].max_uses, Some(100));
        assert_eq!(data.board_items.len(), 3);
        assert_eq!(data.board_items[1].board, BoardKind::Recruit);
        assert!(data.users.iter().any(|u| u.is_anonymous));
    }
}
