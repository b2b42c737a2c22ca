//! Admin console writes: categories, courses, lessons and schedule entries.
//!
//! Every operation checks the actor first, validates the whole input, and
//! only then touches the store. Questions are answered through
//! [`crate::community::answer_question`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::community::Actor;
use crate::db::{self, Pool};
use crate::model::{Category, Course, Lesson, Pricing, ScheduleEvent, ScheduleRule};
use crate::pricing::{price_90_from_30, CATEGORY90_RATIO, SINGLE90_RATIO};
use crate::schedule::{validate_event, validate_rule, ScheduleError};

pub const DEFAULT_RULE_KIND: &str = "live";
pub const DEFAULT_EVENT_KIND: &str = "special";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("관리자만 할 수 있어요.")]
    AdminOnly,
    #[error("{0}")]
    Invalid(&'static str),
    #[error("category {0} not found")]
    CategoryNotFound(String),
    #[error("course {0} not found")]
    CourseNotFound(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn require_admin(actor: &Actor) -> Result<(), AdminError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(AdminError::AdminOnly)
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[instrument(skip_all, fields(category = %category.id))]
pub async fn save_category(
    pool: &Pool,
    actor: &Actor,
    category: &Category,
) -> Result<Category, AdminError> {
    require_admin(actor)?;
    let id = category.id.trim();
    let name = category.name.trim();
    if id.is_empty() {
        return Err(AdminError::Invalid("카테고리 ID가 필요합니다."));
    }
    if name.is_empty() {
        return Err(AdminError::Invalid("카테고리 이름이 필요합니다."));
    }
    if category.order < 1 {
        return Err(AdminError::Invalid("정렬 순서(order)는 1 이상의 숫자여야 합니다."));
    }
    let saved = Category {
        id: id.to_string(),
        name: name.to_string(),
        order: category.order,
    };
    db::upsert_category(pool, &saved).await?;
    Ok(saved)
}

/// Course editor input. Only the 30-day prices are entered; the 90-day
/// prices are derived.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseDraft {
    /// Empty for a new course.
    pub id: String,
    pub title: String,
    pub short_description: String,
    pub category_id: String,
    pub start_date: String,
    pub duration_days: i64,
    pub price30: i64,
    pub category_price30: i64,
    pub is_new: bool,
    pub is_popular: bool,
    pub published: bool,
    pub invite_free_open: bool,
}

impl CourseDraft {
    fn validate(&self) -> Result<(), AdminError> {
        let required = [
            self.title.as_str(),
            self.short_description.as_str(),
            self.category_id.as_str(),
            self.start_date.as_str(),
        ];
        if required.iter().any(|s| s.trim().is_empty()) || self.duration_days <= 0 {
            return Err(AdminError::Invalid(
                "필수 항목(제목/설명/카테고리/개강일/기간)을 입력해 주세요.",
            ));
        }
        if NaiveDate::parse_from_str(self.start_date.trim(), "%Y-%m-%d").is_err() {
            return Err(AdminError::Invalid("개강일은 YYYY-MM-DD 형식이어야 합니다."));
        }
        if self.price30 < 0 || self.category_price30 < 0 {
            return Err(AdminError::Invalid("가격은 0 이상이어야 합니다."));
        }
        Ok(())
    }

    fn into_course(self, id: String) -> Course {
        Course {
            id,
            title: self.title.trim().to_string(),
            short_description: self.short_description.trim().to_string(),
            price_krw: self.price30,
            duration_days: self.duration_days,
            start_date: self.start_date.trim().to_string(),
            category_id: self.category_id.trim().to_string(),
            is_new: self.is_new,
            is_popular: self.is_popular,
            published: self.published,
            invite_free_open: self.invite_free_open,
            pricing: Pricing {
                single30: self.price30,
                single90: price_90_from_30(self.price30, SINGLE90_RATIO),
                category30: self.category_price30,
                category90: price_90_from_30(self.category_price30, CATEGORY90_RATIO),
            },
        }
    }
}

#[instrument(skip_all)]
pub async fn save_course(
    pool: &Pool,
    actor: &Actor,
    draft: CourseDraft,
) -> Result<Course, AdminError> {
    require_admin(actor)?;
    draft.validate()?;
    let category_id = draft.category_id.trim();
    if db::get_category(pool, category_id).await?.is_none() {
        return Err(AdminError::CategoryNotFound(category_id.to_string()));
    }
    let id = match draft.id.trim() {
        "" => new_id(),
        id => id.to_string(),
    };
    let course = draft.into_course(id);
    db::upsert_course(pool, &course).await?;
    info!(course = %course.id, published = course.published, "course saved");
    Ok(course)
}

/// Soft delete: the course leaves the catalog, enrollments stay.
#[instrument(skip_all, fields(course = course_id))]
pub async fn hide_course(pool: &Pool, actor: &Actor, course_id: &str) -> Result<(), AdminError> {
    require_admin(actor)?;
    if !db::set_course_published(pool, course_id, false).await? {
        return Err(AdminError::CourseNotFound(course_id.to_string()));
    }
    Ok(())
}

#[instrument(skip_all, fields(course = %lesson.course_id))]
pub async fn save_lesson(pool: &Pool, actor: &Actor, lesson: Lesson) -> Result<Lesson, AdminError> {
    require_admin(actor)?;
    if lesson.order < 1 {
        return Err(AdminError::Invalid("순서(order)는 1 이상의 숫자여야 합니다."));
    }
    if lesson.title.trim().is_empty() {
        return Err(AdminError::Invalid("소제목(레슨 제목)을 입력해 주세요."));
    }
    if lesson.video_src.trim().is_empty() {
        return Err(AdminError::Invalid("영상 URL을 입력해 주세요."));
    }
    if lesson.duration_sec < 0 {
        return Err(AdminError::Invalid("영상 길이는 0 이상이어야 합니다."));
    }
    if db::get_course(pool, &lesson.course_id).await?.is_none() {
        return Err(AdminError::CourseNotFound(lesson.course_id));
    }
    let lesson = Lesson {
        id: match lesson.id.trim() {
            "" => new_id(),
            id => id.to_string(),
        },
        title: lesson.title.trim().to_string(),
        video_src: lesson.video_src.trim().to_string(),
        ..lesson
    };
    db::upsert_lesson(pool, &lesson).await?;
    Ok(lesson)
}

/// Returns false when there was no such lesson.
#[instrument(skip_all, fields(course = course_id, lesson = lesson_id))]
pub async fn delete_lesson(
    pool: &Pool,
    actor: &Actor,
    course_id: &str,
    lesson_id: &str,
) -> Result<bool, AdminError> {
    require_admin(actor)?;
    Ok(db::delete_lesson(pool, course_id, lesson_id).await?)
}

/// A zero duration is stored as is and expands with the configured default.
#[instrument(skip_all)]
pub async fn save_schedule_rule(
    pool: &Pool,
    actor: &Actor,
    mut rule: ScheduleRule,
) -> Result<ScheduleRule, AdminError> {
    require_admin(actor)?;
    if rule.id.trim().is_empty() {
        rule.id = new_id();
    }
    if rule.kind.trim().is_empty() {
        rule.kind = DEFAULT_RULE_KIND.to_string();
    }
    rule.weekdays.sort_unstable();
    rule.weekdays.dedup();
    validate_rule(&rule)?;
    db::upsert_schedule_rule(pool, &rule).await?;
    info!(rule = %rule.id, "schedule rule saved");
    Ok(rule)
}

/// One-off event input. A missing end means the event is a point in time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub start_at: DateTime<Utc>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub teacher: String,
    #[serde(default)]
    pub place: String,
}

#[instrument(skip_all)]
pub async fn save_schedule_event(
    pool: &Pool,
    actor: &Actor,
    draft: EventDraft,
) -> Result<ScheduleEvent, AdminError> {
    require_admin(actor)?;
    let event = ScheduleEvent {
        id: match draft.id.trim() {
            "" => new_id(),
            id => id.to_string(),
        },
        title: draft.title.trim().to_string(),
        kind: match draft.kind.trim() {
            "" => DEFAULT_EVENT_KIND.to_string(),
            kind => kind.to_string(),
        },
        start_at: draft.start_at,
        end_at: draft.end_at.unwrap_or(draft.start_at),
        teacher: draft.teacher,
        place: draft.place,
    };
    validate_event(&event)?;
    db::upsert_schedule_event(pool, &event).await?;
    info!(event = %event.id, "schedule event saved");
    Ok(event)
}

#[instrument(skip_all, fields(rule = rule_id))]
pub async fn delete_schedule_rule(
    pool: &Pool,
    actor: &Actor,
    rule_id: &str,
) -> Result<bool, AdminError> {
    require_admin(actor)?;
    Ok(db::delete_schedule_rule(pool, rule_id).await?)
}

#[instrument(skip_all, fields(event = event_id))]
pub async fn delete_schedule_event(
    pool: &Pool,
    actor: &Actor,
    event_id: &str,
) -> Result<bool, AdminError> {
    require_admin(actor)?;
    Ok(db::delete_schedule_event(pool, event_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> CourseDraft {
        CourseDraft {
            title: "엑셀 자동화".into(),
            short_description: "반복 업무 줄이기".into(),
            category_id: "ai-office".into(),
            start_date: "2026-04-01".into(),
            duration_days: 30,
            price30: 99_000,
            category_price30: 150_000,
            published: true,
            ..Default::default()
        }
    }

    #[test]
    fn draft_derives_ninety_day_prices() {
        let course = draft().into_course("c1".into());
        assert_eq!(course.price_krw, 99_000);
        assert_eq!(course.pricing.single90, 219_900);
        assert_eq!(course.pricing.category90, 299_900);
    }

    #[test]
    fn draft_requires_core_fields() {
        assert!(draft().validate().is_ok());
        for broken in [
            CourseDraft { title: " ".into(), ..draft() },
            CourseDraft { duration_days: 0, ..draft() },
            CourseDraft { start_date: "04/01/2026".into(), ..draft() },
            CourseDraft { price30: -1, ..draft() },
        ] {
            assert!(matches!(broken.validate(), Err(AdminError::Invalid(_))));
        }
    }
}
