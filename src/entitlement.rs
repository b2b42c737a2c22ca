//! Entitlement resolution: may this viewer open this course, under which
//! label, and until when.
//!
//! Four independent sources can grant access to a course:
//! - a direct enrollment (optionally time-boxed),
//! - an invite unlock (verified invite code × course opened for invitees),
//! - a category pass for the course's category,
//! - a site-wide subscription.
//!
//! Access is the OR of all sources. The label and the displayed expiry follow
//! a fixed priority: invite unlock, subscription, category pass, enrollment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Course, Enrollment, Entitlements, Lesson};
use crate::timestamp::{is_active_until, is_active_until_millis, Timestamp};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessLabel {
    FreeOpen,
    AllAccess,
    CategoryPass,
    Enrolled,
}

impl AccessLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLabel::FreeOpen => "무료 오픈",
            AccessLabel::AllAccess => "전체 이용권",
            AccessLabel::CategoryPass => "카테고리 이용권",
            AccessLabel::Enrolled => "수강 중",
        }
    }
}

impl fmt::Display for AccessLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source flags, each already checked against its own expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSources {
    pub enrolled: bool,
    pub enrollment_expires_at_ms: Option<i64>,
    pub invite_unlocked: bool,
    pub category_pass_active: bool,
    pub category_pass_expires_at_ms: Option<i64>,
    pub subscription_active: bool,
    pub subscription_expires_at_ms: Option<i64>,
}

impl AccessSources {
    /// Build the source flags from stored records. `enrollment` is `None` when
    /// no enrollment exists or it could not be read.
    pub fn collect(
        enrollment: Option<&Enrollment>,
        entitlements: &Entitlements,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Self {
        let enrolled = enrollment.is_some_and(|e| is_active_until_millis(e.expires_at_ms, now));
        let enrollment_expires_at_ms = enrollment
            .filter(|_| enrolled)
            .and_then(|e| e.expires_at_ms)
            .filter(|ms| *ms != 0);

        // A direct enrollment shadows the invite unlock.
        let invite_unlocked = !enrolled && entitlements.invite_verified && course.invite_free_open;

        let pass = entitlements.category_pass_entry(&course.category_id);
        let category_pass_active = pass.is_some_and(|p| is_active_until(p.expires_at(), now));
        let category_pass_expires_at_ms = pass
            .filter(|_| category_pass_active)
            .and_then(|p| p.expires_at())
            .and_then(Timestamp::to_millis);

        let subscription_active = entitlements.subscription_active
            && is_active_until(entitlements.subscription_expires_at.as_ref(), now);
        let subscription_expires_at_ms = entitlements
            .subscription_expires_at
            .as_ref()
            .filter(|_| subscription_active)
            .and_then(Timestamp::to_millis);

        Self {
            enrolled,
            enrollment_expires_at_ms,
            invite_unlocked,
            category_pass_active,
            category_pass_expires_at_ms,
            subscription_active,
            subscription_expires_at_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub granted: bool,
    pub label: Option<AccessLabel>,
    pub expires_at_ms: Option<i64>,
}

impl AccessDecision {
    pub fn label_text(&self) -> &'static str {
        self.label.map(|l| l.as_str()).unwrap_or("")
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at_ms.and_then(DateTime::from_timestamp_millis)
    }
}

pub fn resolve(sources: &AccessSources) -> AccessDecision {
    let granted = sources.enrolled
        || sources.invite_unlocked
        || sources.category_pass_active
        || sources.subscription_active;

    let (label, expires_at_ms) = if sources.invite_unlocked {
        (Some(AccessLabel::FreeOpen), None)
    } else if sources.subscription_active {
        (Some(AccessLabel::AllAccess), sources.subscription_expires_at_ms)
    } else if sources.category_pass_active {
        (
            Some(AccessLabel::CategoryPass),
            sources.category_pass_expires_at_ms,
        )
    } else if sources.enrolled {
        (Some(AccessLabel::Enrolled), sources.enrollment_expires_at_ms)
    } else {
        (None, None)
    };

    AccessDecision {
        granted,
        label,
        expires_at_ms,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LessonAccess {
    pub lesson_id: String,
    pub locked: bool,
    /// Free lesson shown unlocked to a viewer without course access.
    pub free_unlocked: bool,
}

pub fn can_view_lesson(decision: &AccessDecision, lesson: &Lesson) -> bool {
    decision.granted || lesson.is_free
}

pub fn lesson_access(decision: &AccessDecision, lessons: &[Lesson]) -> Vec<LessonAccess> {
    lessons
        .iter()
        .map(|l| LessonAccess {
            lesson_id: l.id.clone(),
            locked: !can_view_lesson(decision, l),
            free_unlocked: l.is_free && !decision.granted,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryPassEntry, Pricing};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn course(invite_free_open: bool) -> Course {
        Course {
            id: "ai-mba-001".into(),
            title: "AI경영 입문".into(),
            short_description: String::new(),
            price_krw: 99_000,
            duration_days: 30,
            start_date: "2026-03-01".into(),
            category_id: "ai-office".into(),
            is_new: true,
            is_popular: false,
            published: true,
            invite_free_open,
            pricing: Pricing::default(),
        }
    }

    fn enrollment(expires_at_ms: Option<i64>) -> Enrollment {
        Enrollment {
            user_id: "u1".into(),
            course_id: "ai-mba-001".into(),
            expires_at_ms,
            enrolled_at: now() - Duration::days(3),
        }
    }

    fn ms(dt: DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    #[test]
    fn no_sources_no_access() {
        let sources =
            AccessSources::collect(None, &Entitlements::default(), &course(true), now());
        assert_eq!(resolve(&sources), AccessDecision::default());
    }

    #[test]
    fn access_is_or_of_sources() {
        let cases = [
            AccessSources {
                enrolled: true,
                ..Default::default()
            },
            AccessSources {
                invite_unlocked: true,
                ..Default::default()
            },
            AccessSources {
                category_pass_active: true,
                ..Default::default()
            },
            AccessSources {
                subscription_active: true,
                ..Default::default()
            },
        ];
        for sources in cases {
            assert!(resolve(&sources).granted, "{sources:?}");
        }
        assert!(!resolve(&AccessSources::default()).granted);
    }

    #[test]
    fn label_priority_is_fixed() {
        let all = AccessSources {
            enrolled: true,
            invite_unlocked: true,
            category_pass_active: true,
            subscription_active: true,
            subscription_expires_at_ms: Some(42),
            ..Default::default()
        };
        let d = resolve(&all);
        assert_eq!(d.label, Some(AccessLabel::FreeOpen));
        assert_eq!(d.expires_at_ms, None);

        let no_invite = AccessSources {
            invite_unlocked: false,
            ..all.clone()
        };
        let d = resolve(&no_invite);
        assert_eq!(d.label, Some(AccessLabel::AllAccess));
        assert_eq!(d.expires_at_ms, Some(42));

        let pass_and_enroll = AccessSources {
            enrolled: true,
            enrollment_expires_at_ms: Some(7),
            category_pass_active: true,
            category_pass_expires_at_ms: Some(9),
            ..Default::default()
        };
        let d = resolve(&pass_and_enroll);
        assert_eq!(d.label, Some(AccessLabel::CategoryPass));
        assert_eq!(d.expires_at_ms, Some(9));

        let enroll_only = AccessSources {
            enrolled: true,
            enrollment_expires_at_ms: Some(7),
            ..Default::default()
        };
        let d = resolve(&enroll_only);
        assert_eq!(d.label_text(), "수강 중");
        assert_eq!(d.expires_at_ms, Some(7));
    }

    #[test]
    fn expired_enrollment_is_inactive() {
        let past = enrollment(Some(ms(now() - Duration::days(1))));
        let sources = AccessSources::collect(Some(&past), &Entitlements::default(), &course(false), now());
        assert!(!sources.enrolled);
        assert!(!resolve(&sources).granted);

        let legacy = enrollment(None);
        let sources =
            AccessSources::collect(Some(&legacy), &Entitlements::default(), &course(false), now());
        assert!(sources.enrolled);
        assert_eq!(resolve(&sources).expires_at_ms, None);
    }

    #[test]
    fn invite_unlock_needs_both_flags_and_yields_to_enrollment() {
        let ent = Entitlements {
            invite_verified: true,
            ..Default::default()
        };
        let sources = AccessSources::collect(None, &ent, &course(false), now());
        assert!(!sources.invite_unlocked);

        let sources = AccessSources::collect(None, &ent, &course(true), now());
        assert!(sources.invite_unlocked);
        assert_eq!(resolve(&sources).label, Some(AccessLabel::FreeOpen));

        let active = enrollment(Some(ms(now() + Duration::days(10))));
        let sources = AccessSources::collect(Some(&active), &ent, &course(true), now());
        assert!(!sources.invite_unlocked);
        let d = resolve(&sources);
        assert_eq!(d.label, Some(AccessLabel::Enrolled));
        assert_eq!(d.expires_at_ms, Some(ms(now() + Duration::days(10))));
    }

    #[test]
    fn category_pass_is_keyed_by_course_category() {
        let expiry = now() + Duration::days(90);
        let mut ent = Entitlements::default();
        ent.category_pass.insert(
            "ai-office".into(),
            CategoryPassEntry::Wrapped {
                expires_at: Some(Timestamp::from(expiry)),
            },
        );
        ent.category_pass.insert(
            "ai-basic".into(),
            CategoryPassEntry::Bare(Timestamp::from(now() - Duration::days(1))),
        );

        let sources = AccessSources::collect(None, &ent, &course(false), now());
        let d = resolve(&sources);
        assert!(d.granted);
        assert_eq!(d.label, Some(AccessLabel::CategoryPass));
        assert_eq!(d.expires_at_ms, Some(ms(expiry)));

        let mut other = course(false);
        other.category_id = "ai-basic".into();
        let sources = AccessSources::collect(None, &ent, &other, now());
        assert!(!sources.category_pass_active);
    }

    #[test]
    fn subscription_checks_flag_and_expiry() {
        let expired = Entitlements {
            subscription_active: true,
            subscription_expires_at: Some(Timestamp::from(now() - Duration::days(1))),
            ..Default::default()
        };
        let sources = AccessSources::collect(None, &expired, &course(false), now());
        assert!(!sources.subscription_active);

        let open_ended = Entitlements {
            subscription_active: true,
            ..Default::default()
        };
        let d = resolve(&AccessSources::collect(None, &open_ended, &course(false), now()));
        assert_eq!(d.label, Some(AccessLabel::AllAccess));
        assert_eq!(d.expires_at_ms, None);

        let flag_off = Entitlements {
            subscription_active: false,
            subscription_expires_at: Some(Timestamp::from(now() + Duration::days(1))),
            ..Default::default()
        };
        let sources = AccessSources::collect(None, &flag_off, &course(false), now());
        assert!(!sources.subscription_active);
    }

    #[test]
    fn lessons_gate_on_course_access_or_free_flag() {
        let lessons = vec![
            Lesson {
                id: "l1".into(),
                course_id: "ai-mba-001".into(),
                order: 1,
                title: "오리엔테이션".into(),
                duration_sec: 300,
                is_free: true,
                video_src: String::new(),
            },
            Lesson {
                id: "l2".into(),
                course_id: "ai-mba-001".into(),
                order: 2,
                title: "프롬프트 구조".into(),
                duration_sec: 900,
                is_free: false,
                video_src: String::new(),
            },
        ];

        let denied = AccessDecision::default();
        let flags = lesson_access(&denied, &lessons);
        assert!(!flags[0].locked && flags[0].free_unlocked);
        assert!(flags[1].locked && !flags[1].free_unlocked);

        let granted = AccessDecision {
            granted: true,
            label: Some(AccessLabel::Enrolled),
            expires_at_ms: None,
        };
        let flags = lesson_access(&granted, &lessons);
        assert!(flags.iter().all(|f| !f.locked && !f.free_unlocked));
    }
}
