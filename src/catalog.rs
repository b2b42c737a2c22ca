//! Published catalog: courses grouped under their categories, plus the
//! featured picks on the home page.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::access::course_access;
use crate::db::{self, Pool};
use crate::entitlement::AccessDecision;
use crate::model::{Category, Course};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureFlag {
    New,
    Popular,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    pub category: Category,
    pub courses: Vec<Course>,
}

/// Group courses by category in category order. Courses whose category is
/// unknown are dropped; empty categories are kept.
pub fn group_by_category(categories: &[Category], courses: &[Course]) -> Vec<CategoryGroup> {
    let mut ordered = categories.to_vec();
    ordered.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    ordered
        .into_iter()
        .map(|category| {
            let courses = courses
                .iter()
                .filter(|c| c.published && c.category_id == category.id)
                .cloned()
                .collect();
            CategoryGroup { category, courses }
        })
        .collect()
}

/// Among courses carrying `flag`, the one starting latest. `exclude` skips a
/// course already featured elsewhere on the page.
pub fn pick_featured<'a>(
    courses: &'a [Course],
    flag: FeatureFlag,
    exclude: Option<&str>,
) -> Option<&'a Course> {
    courses
        .iter()
        .filter(|c| c.published)
        .filter(|c| match flag {
            FeatureFlag::New => c.is_new,
            FeatureFlag::Popular => c.is_popular,
        })
        .filter(|c| exclude != Some(c.id.as_str()))
        // ISO dates compare lexically; ties keep the first listed course.
        .fold(None, |best: Option<&Course>, c| match best {
            Some(b) if b.start_date >= c.start_date => Some(b),
            _ => Some(c),
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeFeatured {
    pub new: Option<Course>,
    pub popular: Option<Course>,
}

#[instrument(skip_all)]
pub async fn published_catalog(pool: &Pool) -> Result<Vec<CategoryGroup>> {
    let categories = db::list_categories(pool).await?;
    let courses = db::list_published_courses(pool).await?;
    Ok(group_by_category(&categories, &courses))
}

/// A catalog course as one viewer sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseCard {
    #[serde(flatten)]
    pub course: Course,
    pub access: AccessDecision,
    /// Badge text, empty when locked.
    pub access_label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryListing {
    pub category: Category,
    pub courses: Vec<CourseCard>,
}

/// The published catalog with each course's access for `user_id`. Without a
/// user every course comes back locked.
#[instrument(skip_all, fields(user = user_id.unwrap_or("")))]
pub async fn catalog_for_user(
    pool: &Pool,
    user_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<CategoryListing>> {
    let groups = published_catalog(pool).await?;
    let mut listings = Vec::with_capacity(groups.len());
    for group in groups {
        let mut courses = Vec::with_capacity(group.courses.len());
        for course in group.courses {
            let access = course_access(pool, user_id, &course, now).await;
            courses.push(CourseCard {
                access_label: access.label_text(),
                access,
                course,
            });
        }
        listings.push(CategoryListing {
            category: group.category,
            courses,
        });
    }
    Ok(listings)
}

#[instrument(skip_all)]
pub async fn home_featured(pool: &Pool) -> Result<HomeFeatured> {
    let courses = db::list_published_courses(pool).await?;
    let new = pick_featured(&courses, FeatureFlag::New, None).cloned();
    let popular = pick_featured(
        &courses,
        FeatureFlag::Popular,
        new.as_ref().map(|c| c.id.as_str()),
    )
    .cloned();
    Ok(HomeFeatured { new, popular })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pricing;

    fn course(id: &str, category: &str, start: &str, is_new: bool, is_popular: bool) -> Course {
        Course {
            id: id.into(),
            title: id.to_uppercase(),
            short_description: String::new(),
            price_krw: 0,
            duration_days: 30,
            start_date: start.into(),
            category_id: category.into(),
            is_new,
            is_popular,
            published: true,
            invite_free_open: false,
            pricing: Pricing::default(),
        }
    }

    fn category(id: &str, order: i64) -> Category {
        Category {
            id: id.into(),
            name: id.into(),
            order,
        }
    }

    #[test]
    fn groups_follow_category_order() {
        let cats = vec![category("b", 2), category("a", 1), category("empty", 3)];
        let mut hidden = course("x", "a", "2026-01-01", false, false);
        hidden.published = false;
        let courses = vec![
            course("c1", "b", "2026-01-01", false, false),
            course("c2", "a", "2026-01-01", false, false),
            course("c3", "zzz", "2026-01-01", false, false),
            hidden,
        ];
        let groups = group_by_category(&cats, &courses);
        let ids: Vec<_> = groups.iter().map(|g| g.category.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "empty"]);
        assert_eq!(groups[0].courses.len(), 1);
        assert_eq!(groups[0].courses[0].id, "c2");
        assert!(groups[2].courses.is_empty());
    }

    #[test]
    fn featured_is_latest_start_among_flagged() {
        let courses = vec![
            course("old", "a", "2025-05-01", true, true),
            course("newest", "a", "2026-04-01", true, false),
            course("unflagged", "a", "2027-01-01", false, false),
            course("pop", "a", "2026-02-01", false, true),
        ];
        assert_eq!(
            pick_featured(&courses, FeatureFlag::New, None).map(|c| c.id.as_str()),
            Some("newest")
        );
        assert_eq!(
            pick_featured(&courses, FeatureFlag::Popular, None).map(|c| c.id.as_str()),
            Some("pop")
        );
        assert_eq!(
            pick_featured(&courses, FeatureFlag::Popular, Some("pop")).map(|c| c.id.as_str()),
            Some("old")
        );
        assert!(pick_featured(&[], FeatureFlag::New, None).is_none());
    }
}
