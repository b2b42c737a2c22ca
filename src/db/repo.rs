use super::model::{
    full_reaction_counts, BoardItemRow, CategoryRow, CourseRow, EnrollmentRow, InviteCodeRow,
    LessonRow, PostRow, RoomPostRow, RoomRow, ScheduleEventRow, ScheduleRuleRow, UserRow,
};
use crate::model::{
    BoardItem, BoardKind, Category, Course, Enrollment, Entitlements, InviteCode, Lesson, Post,
    PostKind, PostStatus, ReactionKey, Room, RoomPost, RoomPostKind, ScheduleEvent, ScheduleRule,
    User,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::{BTreeMap, HashMap};
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

/// Open the database. File-backed URLs get their directory created and
/// `mode=rwc` so a fresh data dir works.
pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let url = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&url)
        .await
        .with_context(|| format!("open sqlite database {url}"))?;
    for pragma in ["PRAGMA journal_mode=WAL;", "PRAGMA synchronous=FULL;"] {
        sqlx::query(pragma).execute(&pool).await?;
    }
    Ok(pool)
}

/// Normalize a `sqlite:` URL: `~/` is expanded against `HOME`, the parent
/// directory is created, and `mode=rwc` is added unless a mode is given.
/// Other URLs and in-memory databases come back unchanged.
pub fn prepare_sqlite_url(url: &str) -> String {
    let Some(target) = url
        .strip_prefix("sqlite:")
        .filter(|t| !t.starts_with(":memory"))
    else {
        return url.to_string();
    };
    let target = target.strip_prefix("//").unwrap_or(target);
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path.is_empty() {
        return url.to_string();
    }

    let path = expand_home(path);
    ensure_parent_dir(std::path::Path::new(&path));

    let mut params: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    if !params.iter().any(|p| p.starts_with("mode=")) {
        params.push("mode=rwc");
    }
    format!("sqlite://{path}?{}", params.join("&"))
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{rest}", home.trim_end_matches('/')),
        _ => path.to_string(),
    }
}

// Failure is left for the connect call to report with its own error.
fn ensure_parent_dir(db_path: &std::path::Path) {
    let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return;
    };
    if let Err(err) = std::fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), error = %err, "could not create database directory");
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---- catalog ----

#[instrument(skip_all)]
pub async fn upsert_category(pool: &Pool, category: &Category) -> Result<()> {
    sqlx::query(
        "INSERT INTO categories (id, name, sort_order) VALUES (?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, sort_order = excluded.sort_order",
    )
    .bind(&category.id)
    .bind(&category.name)
    .bind(category.order)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_categories(pool: &Pool) -> Result<Vec<Category>> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, sort_order FROM categories ORDER BY sort_order, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Category::from).collect())
}

const COURSE_COLUMNS: &str = "id, title, short_description, price_krw, duration_days, start_date, \
     category_id, is_new, is_popular, published, invite_free_open, \
     single30, single90, category30, category90";

#[instrument(skip_all)]
pub async fn upsert_course(pool: &Pool, course: &Course) -> Result<()> {
    sqlx::query(
        "INSERT INTO courses (id, title, short_description, price_krw, duration_days, start_date, \
             category_id, is_new, is_popular, published, invite_free_open, \
             single30, single90, category30, category90, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET title = excluded.title, \
             short_description = excluded.short_description, price_krw = excluded.price_krw, \
             duration_days = excluded.duration_days, start_date = excluded.start_date, \
             category_id = excluded.category_id, is_new = excluded.is_new, \
             is_popular = excluded.is_popular, published = excluded.published, \
             invite_free_open = excluded.invite_free_open, single30 = excluded.single30, \
             single90 = excluded.single90, category30 = excluded.category30, \
             category90 = excluded.category90",
    )
    .bind(&course.id)
    .bind(&course.title)
    .bind(&course.short_description)
    .bind(course.price_krw)
    .bind(course.duration_days)
    .bind(&course.start_date)
    .bind(&course.category_id)
    .bind(course.is_new)
    .bind(course.is_popular)
    .bind(course.published)
    .bind(course.invite_free_open)
    .bind(course.pricing.single30)
    .bind(course.pricing.single90)
    .bind(course.pricing.category30)
    .bind(course.pricing.category90)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_course(pool: &Pool, course_id: &str) -> Result<Option<Course>> {
    let row = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"
    ))
    .bind(course_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Course::from))
}

pub async fn get_course_tx(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: &str,
) -> Result<Option<Course>> {
    let row = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"
    ))
    .bind(course_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(Course::from))
}

#[instrument(skip_all)]
pub async fn list_published_courses(pool: &Pool) -> Result<Vec<Course>> {
    let rows = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE published = 1 ORDER BY start_date DESC, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Course::from).collect())
}

#[instrument(skip_all)]
pub async fn upsert_lesson(pool: &Pool, lesson: &Lesson) -> Result<()> {
    sqlx::query(
        "INSERT INTO lessons (id, course_id, sort_order, title, duration_sec, is_free, video_src) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(course_id, id) DO UPDATE SET sort_order = excluded.sort_order, \
             title = excluded.title, duration_sec = excluded.duration_sec, \
             is_free = excluded.is_free, video_src = excluded.video_src",
    )
    .bind(&lesson.id)
    .bind(&lesson.course_id)
    .bind(lesson.order)
    .bind(&lesson.title)
    .bind(lesson.duration_sec)
    .bind(lesson.is_free)
    .bind(&lesson.video_src)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_lessons(pool: &Pool, course_id: &str) -> Result<Vec<Lesson>> {
    let rows = sqlx::query_as::<_, LessonRow>(
        "SELECT id, course_id, sort_order, title, duration_sec, is_free, video_src \
         FROM lessons WHERE course_id = ? ORDER BY sort_order, id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Lesson::from).collect())
}

#[instrument(skip_all)]
pub async fn get_category(pool: &Pool, category_id: &str) -> Result<Option<Category>> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, sort_order FROM categories WHERE id = ?",
    )
    .bind(category_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Category::from))
}

/// Returns false when the course does not exist.
#[instrument(skip_all)]
pub async fn set_course_published(pool: &Pool, course_id: &str, published: bool) -> Result<bool> {
    let done = sqlx::query("UPDATE courses SET published = ? WHERE id = ?")
        .bind(published)
        .bind(course_id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn delete_lesson(pool: &Pool, course_id: &str, lesson_id: &str) -> Result<bool> {
    let done = sqlx::query("DELETE FROM lessons WHERE course_id = ? AND id = ?")
        .bind(course_id)
        .bind(lesson_id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

// ---- users & entitlements ----

#[instrument(skip_all)]
pub async fn upsert_user(
    pool: &Pool,
    user_id: &str,
    email: &str,
    display_name: &str,
    is_anonymous: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, email, display_name, is_anonymous, entitlements, created_at) \
         VALUES (?, ?, ?, ?, '{}', ?) \
         ON CONFLICT(id) DO UPDATE SET email = excluded.email, \
             display_name = excluded.display_name, is_anonymous = excluded.is_anonymous",
    )
    .bind(user_id)
    .bind(email)
    .bind(display_name)
    .bind(is_anonymous)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_user(pool: &Pool, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, display_name, is_anonymous, entitlements FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.map(UserRow::into_user).transpose()
}

pub async fn get_user_tx(tx: &mut Transaction<'_, Sqlite>, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, display_name, is_anonymous, entitlements FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;
    row.map(UserRow::into_user).transpose()
}

#[instrument(skip_all)]
pub async fn save_entitlements(
    pool: &Pool,
    user_id: &str,
    entitlements: &Entitlements,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    save_entitlements_tx(&mut tx, user_id, entitlements).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn save_entitlements_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    entitlements: &Entitlements,
) -> Result<()> {
    let doc = serde_json::to_string(entitlements).context("serialize entitlements")?;
    let updated = sqlx::query("UPDATE users SET entitlements = ? WHERE id = ?")
        .bind(doc)
        .bind(user_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(anyhow!("user {} not found", user_id));
    }
    Ok(())
}

// ---- enrollments ----

#[instrument(skip_all)]
pub async fn get_enrollment(
    pool: &Pool,
    user_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>> {
    let row = sqlx::query_as::<_, EnrollmentRow>(
        "SELECT user_id, course_id, expires_at_ms, enrolled_at \
         FROM enrollments WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Enrollment::from))
}

pub async fn get_enrollment_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>> {
    let row = sqlx::query_as::<_, EnrollmentRow>(
        "SELECT user_id, course_id, expires_at_ms, enrolled_at \
         FROM enrollments WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(Enrollment::from))
}

#[instrument(skip_all)]
pub async fn upsert_enrollment(
    pool: &Pool,
    user_id: &str,
    course_id: &str,
    expires_at_ms: Option<i64>,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    upsert_enrollment_tx(&mut tx, user_id, course_id, expires_at_ms).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn upsert_enrollment_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    course_id: &str,
    expires_at_ms: Option<i64>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO enrollments (user_id, course_id, expires_at_ms, enrolled_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT(user_id, course_id) DO UPDATE SET expires_at_ms = excluded.expires_at_ms",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(expires_at_ms)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ---- invite codes ----

#[instrument(skip_all)]
pub async fn insert_invite_code(pool: &Pool, code: &InviteCode) -> Result<()> {
    sqlx::query(
        "INSERT INTO invite_codes (code, active, max_uses, used_count, expires_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&code.code)
    .bind(code.active)
    .bind(code.max_uses)
    .bind(code.used_count)
    .bind(code.expires_at)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_invite_code(pool: &Pool, code: &str) -> Result<Option<InviteCode>> {
    let row = sqlx::query_as::<_, InviteCodeRow>(
        "SELECT code, active, max_uses, used_count, expires_at FROM invite_codes WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(InviteCode::from))
}

pub async fn get_invite_code_tx(
    tx: &mut Transaction<'_, Sqlite>,
    code: &str,
) -> Result<Option<InviteCode>> {
    let row = sqlx::query_as::<_, InviteCodeRow>(
        "SELECT code, active, max_uses, used_count, expires_at FROM invite_codes WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(InviteCode::from))
}

/// Bump the use count and log the redemption.
pub async fn record_redemption_tx(
    tx: &mut Transaction<'_, Sqlite>,
    code: &str,
    user_id: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE invite_codes SET used_count = used_count + 1 WHERE code = ?")
        .bind(code)
        .execute(&mut **tx)
        .await?;
    sqlx::query("INSERT INTO invite_redemptions (code, user_id, redeemed_at) VALUES (?, ?, ?)")
        .bind(code)
        .bind(user_id)
        .bind(at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count_redemptions(pool: &Pool, code: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invite_redemptions WHERE code = ?")
        .bind(code)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

// ---- payments ----

pub async fn payment_exists_tx(
    tx: &mut Transaction<'_, Sqlite>,
    provider: &str,
    provider_ref: &str,
) -> Result<bool> {
    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM payments WHERE provider = ? AND provider_ref = ?")
            .bind(provider)
            .bind(provider_ref)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(id.is_some())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_payment_tx(
    tx: &mut Transaction<'_, Sqlite>,
    provider: &str,
    provider_ref: &str,
    user_id: &str,
    course_id: Option<&str>,
    plan: &str,
    amount_krw: i64,
    captured_at: DateTime<Utc>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO payments (provider, provider_ref, user_id, course_id, plan, amount_krw, captured_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(provider)
    .bind(provider_ref)
    .bind(user_id)
    .bind(course_id)
    .bind(plan)
    .bind(amount_krw)
    .bind(captured_at)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn count_payments(pool: &Pool, user_id: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

// ---- schedule ----

#[instrument(skip_all)]
pub async fn upsert_schedule_rule(pool: &Pool, rule: &ScheduleRule) -> Result<()> {
    let weekdays = serde_json::to_string(&rule.weekdays)?;
    sqlx::query(
        "INSERT INTO schedule_rules (id, title, kind, weekdays, time_of_day, duration_minutes, \
             start_date, end_date, teacher, place) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET title = excluded.title, kind = excluded.kind, \
             weekdays = excluded.weekdays, time_of_day = excluded.time_of_day, \
             duration_minutes = excluded.duration_minutes, start_date = excluded.start_date, \
             end_date = excluded.end_date, teacher = excluded.teacher, place = excluded.place",
    )
    .bind(&rule.id)
    .bind(&rule.title)
    .bind(&rule.kind)
    .bind(weekdays)
    .bind(&rule.time)
    .bind(rule.duration_minutes)
    .bind(&rule.start_date)
    .bind(&rule.end_date)
    .bind(&rule.teacher)
    .bind(&rule.place)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_schedule_rules(pool: &Pool) -> Result<Vec<ScheduleRule>> {
    let rows = sqlx::query_as::<_, ScheduleRuleRow>(
        "SELECT id, title, kind, weekdays, time_of_day, duration_minutes, start_date, end_date, \
             teacher, place FROM schedule_rules ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ScheduleRule::from).collect())
}

#[instrument(skip_all)]
pub async fn upsert_schedule_event(pool: &Pool, event: &ScheduleEvent) -> Result<()> {
    sqlx::query(
        "INSERT INTO schedule_events (id, title, kind, start_at, end_at, teacher, place) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET title = excluded.title, kind = excluded.kind, \
             start_at = excluded.start_at, end_at = excluded.end_at, \
             teacher = excluded.teacher, place = excluded.place",
    )
    .bind(&event.id)
    .bind(&event.title)
    .bind(&event.kind)
    .bind(event.start_at)
    .bind(event.end_at)
    .bind(&event.teacher)
    .bind(&event.place)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_schedule_events(pool: &Pool) -> Result<Vec<ScheduleEvent>> {
    let rows = sqlx::query_as::<_, ScheduleEventRow>(
        "SELECT id, title, kind, start_at, end_at, teacher, place \
         FROM schedule_events ORDER BY start_at, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ScheduleEvent::from).collect())
}

#[instrument(skip_all)]
pub async fn delete_schedule_rule(pool: &Pool, rule_id: &str) -> Result<bool> {
    let done = sqlx::query("DELETE FROM schedule_rules WHERE id = ?")
        .bind(rule_id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn delete_schedule_event(pool: &Pool, event_id: &str) -> Result<bool> {
    let done = sqlx::query("DELETE FROM schedule_events WHERE id = ?")
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

// ---- community ----

const POST_COLUMNS: &str = "id, kind, status, title, body, tags, prompt, image_url, author_id, \
     answer_body, answer_author, like_count, created_at, updated_at";

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all)]
pub async fn insert_post(
    pool: &Pool,
    kind: PostKind,
    status: Option<PostStatus>,
    title: &str,
    body: &str,
    tags: &[String],
    prompt: &str,
    image_url: &str,
    author_id: &str,
) -> Result<i64> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO posts (kind, status, title, body, tags, prompt, image_url, author_id, \
             created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(kind.as_str())
    .bind(status.map(|s| s.as_str()).unwrap_or(""))
    .bind(title)
    .bind(body)
    .bind(serde_json::to_string(tags)?)
    .bind(prompt)
    .bind(image_url)
    .bind(author_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn get_post(pool: &Pool, post_id: i64) -> Result<Option<Post>> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = ?"
    ))
    .bind(post_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let counts = reaction_counts(pool, post_id).await?;
    row.into_post(counts).map(Some)
}

/// Newest first. `status` only narrows questions.
#[instrument(skip_all)]
pub async fn list_posts(
    pool: &Pool,
    kind: PostKind,
    status: Option<PostStatus>,
) -> Result<Vec<Post>> {
    let status = status.map(|s| s.as_str());
    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts \
         WHERE kind = ? AND (? IS NULL OR status = ?) \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(kind.as_str())
    .bind(status)
    .bind(status)
    .fetch_all(pool)
    .await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut counts = reaction_counts_for(pool, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let partial = counts.remove(&row.id).unwrap_or_default();
            row.into_post(full_reaction_counts(&partial))
        })
        .collect()
}

#[instrument(skip_all)]
pub async fn update_post_content(
    pool: &Pool,
    post_id: i64,
    title: &str,
    body: &str,
    tags: &[String],
) -> Result<()> {
    sqlx::query("UPDATE posts SET title = ?, body = ?, tags = ?, updated_at = ? WHERE id = ?")
        .bind(title)
        .bind(body)
        .bind(serde_json::to_string(tags)?)
        .bind(Utc::now())
        .bind(post_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_admin_answer(
    pool: &Pool,
    post_id: i64,
    body: &str,
    author_name: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE posts SET answer_body = ?, answer_author = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(body)
    .bind(author_name)
    .bind(PostStatus::Solved.as_str())
    .bind(Utc::now())
    .bind(post_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn post_kind_tx(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: i64,
) -> Result<Option<PostKind>> {
    let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(kind.and_then(|k| PostKind::parse_kind(&k)))
}

pub async fn user_reaction_count_tx(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: i64,
    key: ReactionKey,
    user_id: &str,
) -> Result<Option<i64>> {
    let n: Option<i64> = sqlx::query_scalar(
        "SELECT count FROM post_reactions WHERE post_id = ? AND reaction_key = ? AND user_id = ?",
    )
    .bind(post_id)
    .bind(key.as_str())
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(n)
}

/// Insert a first reaction or add one to an existing row. Returns the new count.
pub async fn bump_reaction_tx(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: i64,
    key: ReactionKey,
    user_id: &str,
) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(
        "INSERT INTO post_reactions (post_id, reaction_key, user_id, count, updated_at) \
         VALUES (?, ?, ?, 1, ?) \
         ON CONFLICT(post_id, reaction_key, user_id) DO UPDATE SET \
             count = post_reactions.count + 1, updated_at = excluded.updated_at \
         RETURNING count",
    )
    .bind(post_id)
    .bind(key.as_str())
    .bind(user_id)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await?;
    Ok(n)
}

#[instrument(skip_all)]
pub async fn reaction_counts(pool: &Pool, post_id: i64) -> Result<BTreeMap<ReactionKey, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT reaction_key, COALESCE(SUM(count), 0) FROM post_reactions \
         WHERE post_id = ? GROUP BY reaction_key",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(full_reaction_counts(&rows))
}

/// Per-key sums for many posts in one grouped query. Posts without any
/// reaction are absent from the map.
#[instrument(skip_all, fields(posts = post_ids.len()))]
pub async fn reaction_counts_for(
    pool: &Pool,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<(String, i64)>>> {
    let mut grouped: HashMap<i64, Vec<(String, i64)>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(grouped);
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT post_id, reaction_key, COALESCE(SUM(count), 0) FROM post_reactions \
         WHERE post_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in post_ids {
        ids.push_bind(*id);
    }
    qb.push(") GROUP BY post_id, reaction_key");
    let rows: Vec<(i64, String, i64)> = qb.build_query_as().fetch_all(pool).await?;
    for (post_id, key, n) in rows {
        grouped.entry(post_id).or_default().push((key, n));
    }
    Ok(grouped)
}

/// Record a like. Returns false when this user already liked the post.
pub async fn insert_like_tx(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: i64,
    user_id: &str,
) -> Result<bool> {
    let done = sqlx::query(
        "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?) \
         ON CONFLICT(post_id, user_id) DO NOTHING",
    )
    .bind(post_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(done.rows_affected() > 0)
}

pub async fn add_like_count_tx(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: i64,
    delta: i64,
) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(
        "UPDATE posts SET like_count = like_count + ?, updated_at = ? WHERE id = ? \
         RETURNING like_count",
    )
    .bind(delta)
    .bind(Utc::now())
    .bind(post_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(n)
}

// ---- live rooms ----

const ROOM_COLUMNS: &str = "id, room_date, title, is_open, created_by, created_at";
const ROOM_POST_COLUMNS: &str =
    "id, room_id, kind, title, body, nickname, image_url, author_id, created_at, updated_at";

#[instrument(skip_all)]
pub async fn insert_room(pool: &Pool, date: NaiveDate, title: &str, created_by: &str) -> Result<i64> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO realtime_rooms (room_date, title, is_open, created_by, created_at, updated_at) \
         VALUES (?, ?, 1, ?, ?, ?) RETURNING id",
    )
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(title)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn get_room(pool: &Pool, room_id: i64) -> Result<Option<Room>> {
    let row = sqlx::query_as::<_, RoomRow>(&format!(
        "SELECT {ROOM_COLUMNS} FROM realtime_rooms WHERE id = ?"
    ))
    .bind(room_id)
    .fetch_optional(pool)
    .await?;
    row.map(Room::try_from).transpose()
}

/// Newest date first, at most `limit` rooms.
#[instrument(skip_all)]
pub async fn list_rooms(pool: &Pool, date: Option<NaiveDate>, limit: i64) -> Result<Vec<Room>> {
    let date = date.map(|d| d.format("%Y-%m-%d").to_string());
    let rows = sqlx::query_as::<_, RoomRow>(&format!(
        "SELECT {ROOM_COLUMNS} FROM realtime_rooms \
         WHERE (? IS NULL OR room_date = ?) \
         ORDER BY room_date DESC, id DESC LIMIT ?"
    ))
    .bind(date.as_deref())
    .bind(date.as_deref())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Room::try_from).collect()
}

#[instrument(skip_all)]
pub async fn update_room(pool: &Pool, room_id: i64, title: &str, is_open: bool) -> Result<bool> {
    let done = sqlx::query(
        "UPDATE realtime_rooms SET title = ?, is_open = ?, updated_at = ? WHERE id = ?",
    )
    .bind(title)
    .bind(is_open)
    .bind(Utc::now())
    .bind(room_id)
    .execute(pool)
    .await?;
    Ok(done.rows_affected() > 0)
}

/// Removes the room and everything posted in it.
#[instrument(skip_all)]
pub async fn delete_room(pool: &Pool, room_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM room_posts WHERE room_id = ?")
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    let done = sqlx::query("DELETE FROM realtime_rooms WHERE id = ?")
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(done.rows_affected() > 0)
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all)]
pub async fn insert_room_post(
    pool: &Pool,
    room_id: i64,
    kind: RoomPostKind,
    title: &str,
    body: &str,
    nickname: &str,
    image_url: &str,
    author_id: &str,
) -> Result<i64> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO room_posts (room_id, kind, title, body, nickname, image_url, author_id, \
             created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(room_id)
    .bind(kind.as_str())
    .bind(title)
    .bind(body)
    .bind(nickname)
    .bind(image_url)
    .bind(author_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn get_room_post(pool: &Pool, room_id: i64, post_id: i64) -> Result<Option<RoomPost>> {
    let row = sqlx::query_as::<_, RoomPostRow>(&format!(
        "SELECT {ROOM_POST_COLUMNS} FROM room_posts WHERE room_id = ? AND id = ?"
    ))
    .bind(room_id)
    .bind(post_id)
    .fetch_optional(pool)
    .await?;
    row.map(RoomPost::try_from).transpose()
}

/// Newest first, at most `limit` posts.
#[instrument(skip_all)]
pub async fn list_room_posts(pool: &Pool, room_id: i64, limit: i64) -> Result<Vec<RoomPost>> {
    let rows = sqlx::query_as::<_, RoomPostRow>(&format!(
        "SELECT {ROOM_POST_COLUMNS} FROM room_posts WHERE room_id = ? \
         ORDER BY created_at DESC, id DESC LIMIT ?"
    ))
    .bind(room_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(RoomPost::try_from).collect()
}

#[instrument(skip_all)]
pub async fn update_room_post(
    pool: &Pool,
    post_id: i64,
    title: &str,
    body: &str,
    nickname: &str,
    image_url: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE room_posts SET title = ?, body = ?, nickname = ?, \
             image_url = COALESCE(?, image_url), updated_at = ? WHERE id = ?",
    )
    .bind(title)
    .bind(body)
    .bind(nickname)
    .bind(image_url)
    .bind(Utc::now())
    .bind(post_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_room_post(pool: &Pool, post_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM room_posts WHERE id = ?")
        .bind(post_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---- home board ----

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all)]
pub async fn insert_board_item(
    pool: &Pool,
    board: BoardKind,
    title: &str,
    body: &str,
    link_url: &str,
    capacity: Option<i64>,
    remaining: Option<i64>,
    deadline_at: Option<DateTime<Utc>>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO board_items (board, title, body, link_url, capacity, remaining, \
             deadline_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(board.as_str())
    .bind(title)
    .bind(body)
    .bind(link_url)
    .bind(capacity)
    .bind(remaining)
    .bind(deadline_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn delete_board_item(pool: &Pool, item_id: i64) -> Result<bool> {
    let done = sqlx::query("DELETE FROM board_items WHERE id = ?")
        .bind(item_id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

/// Newest first across all boards. Rows on unknown boards are skipped.
#[instrument(skip_all)]
pub async fn recent_board_items(pool: &Pool, limit: i64) -> Result<Vec<BoardItem>> {
    let rows = sqlx::query_as::<_, BoardItemRow>(
        "SELECT id, board, title, body, link_url, capacity, remaining, deadline_at, created_at \
         FROM board_items ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter_map(BoardItemRow::into_item).collect())
}
