//! Store-backed course access.
//!
//! Each access source is read independently. A failed read switches off only
//! that source and is logged; the others still count.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::db::{self, Pool};
use crate::entitlement::{lesson_access, resolve, AccessDecision, AccessSources, LessonAccess};
use crate::model::{Course, Enrollment, Entitlements, Lesson};

/// Reads the per-user records access is resolved from.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn enrollment(&self, user_id: &str, course_id: &str) -> Result<Option<Enrollment>>;

    async fn entitlements(&self, user_id: &str) -> Result<Option<Entitlements>>;
}

#[async_trait]
impl AccessStore for Pool {
    async fn enrollment(&self, user_id: &str, course_id: &str) -> Result<Option<Enrollment>> {
        db::get_enrollment(self, user_id, course_id).await
    }

    async fn entitlements(&self, user_id: &str) -> Result<Option<Entitlements>> {
        Ok(db::get_user(self, user_id).await?.map(|u| u.entitlements))
    }
}

/// Resolve course access for `user_id`. Signed-out viewers get no access.
#[instrument(skip_all, fields(course = %course.id))]
pub async fn course_access<S: AccessStore + ?Sized>(
    store: &S,
    user_id: Option<&str>,
    course: &Course,
    now: DateTime<Utc>,
) -> AccessDecision {
    let Some(user_id) = user_id.filter(|u| !u.is_empty()) else {
        return AccessDecision::default();
    };

    let enrollment = match store.enrollment(user_id, &course.id).await {
        Ok(e) => e,
        Err(err) => {
            warn!(error = %err, "enrollment read failed; treating as not enrolled");
            None
        }
    };
    let entitlements = match store.entitlements(user_id).await {
        Ok(e) => e.unwrap_or_default(),
        Err(err) => {
            warn!(error = %err, "entitlements read failed; treating as none");
            Entitlements::default()
        }
    };

    let sources = AccessSources::collect(enrollment.as_ref(), &entitlements, course, now);
    let decision = resolve(&sources);
    debug!(granted = decision.granted, label = decision.label_text(), "access resolved");
    decision
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    pub course: Course,
    pub access: AccessDecision,
    pub lessons: Vec<LessonView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    pub lesson: Lesson,
    #[serde(flatten)]
    pub gate: LessonAccess,
}

/// Course page payload: the course, its access decision and gated lessons.
pub async fn course_view(
    pool: &Pool,
    user_id: Option<&str>,
    course_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<CourseView>> {
    let Some(course) = db::get_course(pool, course_id).await? else {
        return Ok(None);
    };
    let access = course_access(pool, user_id, &course, now).await;
    let lessons = db::list_lessons(pool, course_id).await?;
    let gates = lesson_access(&access, &lessons);
    let lessons = lessons
        .into_iter()
        .zip(gates)
        .map(|(lesson, gate)| LessonView { lesson, gate })
        .collect();
    Ok(Some(CourseView {
        course,
        access,
        lessons,
    }))
}
