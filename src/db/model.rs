//! Row models returned by repository queries.
//!
//! Rows mirror table columns one-to-one. Conversion into domain entities
//! happens here so callers never see SQLite encodings (JSON text columns,
//! integer flags, legacy status strings).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::model::{
    AdminAnswer, BoardItem, BoardKind, Category, Course, Enrollment, Entitlements, InviteCode,
    Lesson, Post, PostKind, PostStatus, Pricing, ReactionKey, Room, RoomPost, RoomPostKind,
    ScheduleEvent, ScheduleRule, User,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            order: row.sort_order,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CourseRow {
    pub id: String,
    pub title: String,
    pub short_description: String,
    pub price_krw: i64,
    pub duration_days: i64,
    pub start_date: String,
    pub category_id: String,
    pub is_new: bool,
    pub is_popular: bool,
    pub published: bool,
    pub invite_free_open: bool,
    pub single30: i64,
    pub single90: i64,
    pub category30: i64,
    pub category90: i64,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Course {
            id: row.id,
            title: row.title,
            short_description: row.short_description,
            price_krw: row.price_krw,
            duration_days: row.duration_days,
            start_date: row.start_date,
            category_id: row.category_id,
            is_new: row.is_new,
            is_popular: row.is_popular,
            published: row.published,
            invite_free_open: row.invite_free_open,
            pricing: Pricing {
                single30: row.single30,
                single90: row.single90,
                category30: row.category30,
                category90: row.category90,
            },
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LessonRow {
    pub id: String,
    pub course_id: String,
    pub sort_order: i64,
    pub title: String,
    pub duration_sec: i64,
    pub is_free: bool,
    pub video_src: String,
}

impl From<LessonRow> for Lesson {
    fn from(row: LessonRow) -> Self {
        Lesson {
            id: row.id,
            course_id: row.course_id,
            order: row.sort_order,
            title: row.title,
            duration_sec: row.duration_sec,
            is_free: row.is_free,
            video_src: row.video_src,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub is_anonymous: bool,
    pub entitlements: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        let entitlements = parse_entitlements(&self.entitlements)
            .with_context(|| format!("user {} has malformed entitlements", self.id))?;
        Ok(User {
            id: self.id,
            email: self.email,
            display_name: self.display_name,
            is_anonymous: self.is_anonymous,
            entitlements,
        })
    }
}

pub fn parse_entitlements(raw: &str) -> Result<Entitlements> {
    if raw.trim().is_empty() {
        return Ok(Entitlements::default());
    }
    let doc: serde_json::Value = serde_json::from_str(raw)?;
    Ok(Entitlements::from_stored(&doc))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnrollmentRow {
    pub user_id: String,
    pub course_id: String,
    pub expires_at_ms: Option<i64>,
    pub enrolled_at: DateTime<Utc>,
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Enrollment {
            user_id: row.user_id,
            course_id: row.course_id,
            expires_at_ms: row.expires_at_ms,
            enrolled_at: row.enrolled_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InviteCodeRow {
    pub code: String,
    pub active: bool,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<InviteCodeRow> for InviteCode {
    fn from(row: InviteCodeRow) -> Self {
        InviteCode {
            code: row.code,
            active: row.active,
            max_uses: row.max_uses,
            used_count: row.used_count,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRuleRow {
    pub id: String,
    pub title: String,
    pub kind: String,
    pub weekdays: String,
    pub time_of_day: String,
    pub duration_minutes: i64,
    pub start_date: String,
    pub end_date: String,
    pub teacher: String,
    pub place: String,
}

impl From<ScheduleRuleRow> for ScheduleRule {
    fn from(row: ScheduleRuleRow) -> Self {
        // Unreadable weekday lists leave the rule inert rather than failing the month.
        let weekdays: Vec<u8> = serde_json::from_str(&row.weekdays).unwrap_or_default();
        ScheduleRule {
            id: row.id,
            title: row.title,
            kind: row.kind,
            weekdays,
            time: row.time_of_day,
            duration_minutes: row.duration_minutes,
            start_date: row.start_date,
            end_date: row.end_date,
            teacher: row.teacher,
            place: row.place,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleEventRow {
    pub id: String,
    pub title: String,
    pub kind: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub teacher: String,
    pub place: String,
}

impl From<ScheduleEventRow> for ScheduleEvent {
    fn from(row: ScheduleEventRow) -> Self {
        ScheduleEvent {
            id: row.id,
            title: row.title,
            kind: row.kind,
            start_at: row.start_at,
            end_at: row.end_at,
            teacher: row.teacher,
            place: row.place,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub kind: String,
    pub status: String,
    pub title: String,
    pub body: String,
    pub tags: String,
    pub prompt: String,
    pub image_url: String,
    pub author_id: String,
    pub answer_body: Option<String>,
    pub answer_author: Option<String>,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostRow {
    pub fn into_post(self, counts: BTreeMap<ReactionKey, i64>) -> Result<Post> {
        let kind = PostKind::parse_kind(&self.kind)
            .ok_or_else(|| anyhow!("post {} has unknown kind {}", self.id, self.kind))?;
        let status = match kind {
            PostKind::Question => Some(PostStatus::parse_status(&self.status).unwrap_or(PostStatus::Open)),
            PostKind::Mission => None,
        };
        let tags: Vec<String> = serde_json::from_str(&self.tags).unwrap_or_default();
        let admin_answer = self
            .answer_body
            .filter(|b| !b.trim().is_empty())
            .map(|body| AdminAnswer {
                body,
                author_name: self.answer_author.unwrap_or_default(),
            });
        Ok(Post {
            id: self.id,
            kind,
            status,
            title: self.title,
            body: self.body,
            tags,
            prompt: self.prompt,
            image_url: self.image_url,
            author_id: self.author_id,
            admin_answer,
            reaction_counts: counts,
            like_count: self.like_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Per-key totals with every known key present.
pub fn full_reaction_counts(partial: &[(String, i64)]) -> BTreeMap<ReactionKey, i64> {
    let mut counts: BTreeMap<ReactionKey, i64> =
        ReactionKey::ALL.into_iter().map(|k| (k, 0)).collect();
    for (key, n) in partial {
        if let Some(k) = ReactionKey::parse_key(key) {
            *counts.entry(k).or_default() += n;
        }
    }
    counts
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    pub id: i64,
    pub room_date: String,
    pub title: String,
    pub is_open: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RoomRow> for Room {
    type Error = anyhow::Error;

    fn try_from(row: RoomRow) -> Result<Self> {
        let date = NaiveDate::parse_from_str(&row.room_date, "%Y-%m-%d")
            .with_context(|| format!("room {} has bad date {}", row.id, row.room_date))?;
        Ok(Room {
            id: row.id,
            date,
            title: row.title,
            is_open: row.is_open,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomPostRow {
    pub id: i64,
    pub room_id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub nickname: String,
    pub image_url: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RoomPostRow> for RoomPost {
    type Error = anyhow::Error;

    fn try_from(row: RoomPostRow) -> Result<Self> {
        let kind = RoomPostKind::parse_kind(&row.kind)
            .ok_or_else(|| anyhow!("room post {} has unknown kind {}", row.id, row.kind))?;
        Ok(RoomPost {
            id: row.id,
            room_id: row.room_id,
            kind,
            title: row.title,
            body: row.body,
            nickname: row.nickname,
            image_url: row.image_url,
            author_id: row.author_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BoardItemRow {
    pub id: i64,
    pub board: String,
    pub title: String,
    pub body: String,
    pub link_url: String,
    pub capacity: Option<i64>,
    pub remaining: Option<i64>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BoardItemRow {
    /// `None` for rows filed under a board this build does not know.
    pub fn into_item(self) -> Option<BoardItem> {
        Some(BoardItem {
            board: BoardKind::parse_board(&self.board)?,
            id: self.id,
            title: self.title,
            body: self.body,
            link_url: self.link_url,
            capacity: self.capacity,
            remaining: self.remaining,
            deadline_at: self.deadline_at,
            created_at: self.created_at,
        })
    }
}
