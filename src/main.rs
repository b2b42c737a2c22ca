use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use coursehub::access;
use coursehub::admin::{self, CourseDraft, EventDraft};
use coursehub::calendar;
use coursehub::catalog;
use coursehub::community::{self, Actor, NewPost, QuestionFilter};
use coursehub::config;
use coursehub::db;
use coursehub::home_board::{self, NewBoardItem};
use coursehub::invite::{self, NewInviteCode};
use coursehub::model::{
    BoardKind, Category, Lesson, PaymentProvider, PostKind, ReactionKey, RoomPostKind,
    ScheduleRule,
};
use coursehub::payments::{self, CapturedPayment};
use coursehub::pricing::{format_krw, select_plan, Plan, PurchaseMode};
use coursehub::rooms::{self, RoomPostInput};

#[derive(Debug, Parser)]
#[command(author, version, about = "Course marketplace core: access, calendar, invites, payments, community")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Evaluate as of this instant (RFC 3339) instead of now.
    #[arg(long, global = true)]
    at: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Published courses grouped by category, plus home page picks. With
    /// --user each course carries that user's access.
    Catalog {
        #[arg(long)]
        user: Option<String>,
    },
    /// Access decision for one course.
    Access {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        course: String,
    },
    /// Course page with per-lesson lock state.
    Lessons {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        course: String,
    },
    /// Plan and price the checkout page offers for a course.
    Checkout {
        #[arg(long)]
        course: String,
        /// single | category
        #[arg(long, default_value = "single")]
        mode: String,
        #[arg(long, default_value_t = 30)]
        term: i64,
    },
    /// Month calendar grid with occurrences bucketed by date.
    Calendar {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    /// Next occurrences from now.
    Upcoming {
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Redeem an invite code.
    Redeem {
        #[arg(long)]
        user: String,
        #[arg(long)]
        code: String,
    },
    /// Create an invite code (random when --code is omitted).
    InviteCreate {
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        max_uses: Option<i64>,
        /// RFC 3339 expiry
        #[arg(long)]
        expires_at: Option<String>,
    },
    /// Record a provider-confirmed payment and grant its plan.
    Capture {
        #[arg(long)]
        provider: String,
        #[arg(long = "ref")]
        provider_ref: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        plan: String,
        #[arg(long)]
        amount: i64,
    },
    /// Community board listing.
    Board {
        #[arg(long, default_value = "all")]
        filter: String,
    },
    /// Create a mission or question post.
    Post {
        #[arg(long)]
        user: String,
        #[arg(long)]
        kind: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long, default_value = "")]
        prompt: String,
    },
    /// Admin answer to a question.
    Answer {
        #[arg(long)]
        user: String,
        #[arg(long)]
        post: i64,
        #[arg(long)]
        body: String,
    },
    /// React to a mission post.
    React {
        #[arg(long)]
        user: String,
        #[arg(long)]
        post: i64,
        #[arg(long)]
        key: String,
    },
    /// Like a community post.
    Like {
        #[arg(long)]
        user: String,
        #[arg(long)]
        post: i64,
    },
    /// Home page notice, recruit and review boards.
    Home,
    /// Post a home board item (admin).
    HomePost {
        #[arg(long)]
        user: String,
        /// notice | recruit | review
        #[arg(long)]
        board: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long, default_value = "")]
        link: String,
        #[arg(long)]
        capacity: Option<i64>,
        #[arg(long)]
        remaining: Option<i64>,
        /// RFC 3339 deadline
        #[arg(long)]
        deadline: Option<String>,
    },
    /// Live rooms.
    Room {
        #[command(subcommand)]
        action: RoomCommand,
    },
    /// Admin catalog and schedule edits. Inputs are JSON documents.
    Admin {
        #[arg(long)]
        user: String,
        #[command(subcommand)]
        action: AdminCommand,
    },
}

#[derive(Debug, Subcommand)]
enum RoomCommand {
    /// Rooms newest first.
    List {
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// One room with its missions and submissions.
    Show {
        #[arg(long)]
        room: i64,
    },
    Create {
        #[arg(long)]
        user: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        title: String,
    },
    /// Open a room with --open, close it without.
    SetOpen {
        #[arg(long)]
        user: String,
        #[arg(long)]
        room: i64,
        #[arg(long)]
        open: bool,
    },
    Delete {
        #[arg(long)]
        user: String,
        #[arg(long)]
        room: i64,
    },
    /// Submit (or, as admin, post a mission).
    Post {
        #[arg(long)]
        user: String,
        #[arg(long)]
        room: i64,
        /// submit | mission
        #[arg(long, default_value = "submit")]
        kind: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value = "")]
        nickname: String,
    },
    DeletePost {
        #[arg(long)]
        user: String,
        #[arg(long)]
        room: i64,
        #[arg(long)]
        post: i64,
    },
}

#[derive(Debug, Subcommand)]
enum AdminCommand {
    Category {
        #[arg(long)]
        json: String,
    },
    Course {
        #[arg(long)]
        json: String,
    },
    HideCourse {
        #[arg(long)]
        course: String,
    },
    Lesson {
        #[arg(long)]
        json: String,
    },
    DeleteLesson {
        #[arg(long)]
        course: String,
        #[arg(long)]
        lesson: String,
    },
    Rule {
        #[arg(long)]
        json: String,
    },
    Event {
        #[arg(long)]
        json: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid RFC 3339 instant: {s}"))?
        .with_timezone(&Utc))
}

async fn actor(pool: &db::Pool, cfg: &config::Config, user_id: &str) -> Result<Actor> {
    let user = db::get_user(pool, user_id)
        .await?
        .ok_or_else(|| anyhow!("unknown user: {user_id}"))?;
    Ok(Actor::from_user(&user, cfg.is_admin_email(&user.email))?)
}

/// Like [`actor`] but lets anonymous sessions through.
async fn participant(pool: &db::Pool, cfg: &config::Config, user_id: &str) -> Result<Actor> {
    let user = db::get_user(pool, user_id)
        .await?
        .ok_or_else(|| anyhow!("unknown user: {user_id}"))?;
    Ok(Actor::participant(&user, cfg.is_admin_email(&user.email)))
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, json: &str) -> Result<T> {
    serde_json::from_str(json).with_context(|| format!("invalid {what} JSON"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let now = match args.at.as_deref() {
        Some(s) => parse_instant(s)?,
        None => Utc::now(),
    };
    let opts = cfg.expand_options();

    match args.command {
        Command::Catalog { user } => {
            #[derive(Serialize)]
            struct CatalogOut {
                categories: Vec<catalog::CategoryListing>,
                featured: catalog::HomeFeatured,
            }
            print_json(&CatalogOut {
                categories: catalog::catalog_for_user(&pool, user.as_deref(), now).await?,
                featured: catalog::home_featured(&pool).await?,
            })?;
        }
        Command::Access { user, course } => {
            let course = db::get_course(&pool, &course)
                .await?
                .ok_or_else(|| anyhow!("unknown course: {course}"))?;
            let decision = access::course_access(&pool, user.as_deref(), &course, now).await;
            print_json(&decision)?;
        }
        Command::Lessons { user, course } => {
            let view = access::course_view(&pool, user.as_deref(), &course, now)
                .await?
                .ok_or_else(|| anyhow!("unknown course: {course}"))?;
            print_json(&view)?;
        }
        Command::Checkout { course, mode, term } => {
            let course = db::get_course(&pool, &course)
                .await?
                .ok_or_else(|| anyhow!("unknown course: {course}"))?;
            let mode = match mode.as_str() {
                "single" => PurchaseMode::Single,
                "category" => PurchaseMode::Category,
                other => return Err(anyhow!("unknown purchase mode: {other}")),
            };
            let selection = select_plan(&course.effective_pricing(), mode, term);
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct CheckoutOut {
                #[serde(flatten)]
                selection: coursehub::pricing::PlanSelection,
                price_label: String,
            }
            print_json(&CheckoutOut {
                price_label: format_krw(selection.price),
                selection,
            })?;
        }
        Command::Calendar { year, month } => {
            let local = now.with_timezone(&opts.offset);
            let year = year.unwrap_or(local.year());
            let month = month.unwrap_or(local.month());
            print_json(&calendar::month_view(&pool, year, month, &opts).await?)?;
        }
        Command::Upcoming { kind, limit } => {
            let limit = limit.unwrap_or(cfg.schedule.upcoming_limit);
            let list =
                calendar::upcoming_from_store(&pool, now, kind.as_deref(), limit, &opts).await?;
            print_json(&calendar::with_badges(now, list))?;
        }
        Command::Redeem { user, code } => {
            let outcome = invite::redeem(&pool, &user, &code, now).await?;
            print_json(&outcome)?;
        }
        Command::InviteCreate {
            code,
            max_uses,
            expires_at,
        } => {
            let expires_at = expires_at.as_deref().map(parse_instant).transpose()?;
            let created = invite::create_invite_code(
                &pool,
                NewInviteCode {
                    code,
                    max_uses,
                    expires_at,
                },
                cfg.invite.code_length,
            )
            .await?;
            print_json(&created)?;
        }
        Command::Capture {
            provider,
            provider_ref,
            user,
            course,
            plan,
            amount,
        } => {
            let payment = CapturedPayment {
                provider: PaymentProvider::parse_provider(&provider)
                    .ok_or_else(|| anyhow!("unknown provider: {provider}"))?,
                provider_ref,
                user_id: user,
                course_id: course,
                plan: Plan::parse_plan(&plan).ok_or_else(|| anyhow!("unknown plan: {plan}"))?,
                amount_krw: amount,
            };
            let grant =
                payments::capture(&pool, &payment, &cfg.subscription_prices(), now).await?;
            print_json(&grant)?;
        }
        Command::Board { filter } => {
            let filter = QuestionFilter::parse_filter(&filter)
                .ok_or_else(|| anyhow!("filter must be all, open or solved"))?;
            print_json(&community::board(&pool, filter).await?)?;
        }
        Command::Post {
            user,
            kind,
            title,
            body,
            tags,
            prompt,
        } => {
            let kind = PostKind::parse_kind(&kind)
                .ok_or_else(|| anyhow!("kind must be mission or question"))?;
            let actor = actor(&pool, &cfg, &user).await?;
            let new = NewPost {
                title,
                body,
                tags,
                prompt,
                image_url: String::new(),
            };
            let id = community::create_post(&pool, &actor, kind, &new).await?;
            info!(post_id = id, "post created");
            print_json(&db::get_post(&pool, id).await?)?;
        }
        Command::Answer { user, post, body } => {
            let actor = actor(&pool, &cfg, &user).await?;
            community::answer_question(&pool, &actor, post, &body).await?;
            print_json(&db::get_post(&pool, post).await?)?;
        }
        Command::React { user, post, key } => {
            let key =
                ReactionKey::parse_key(&key).ok_or_else(|| anyhow!("unknown reaction: {key}"))?;
            let actor = actor(&pool, &cfg, &user).await?;
            community::react(&pool, &actor, post, key).await?;
            #[derive(Serialize)]
            struct ReactionOut {
                key: &'static str,
                emoji: &'static str,
                count: i64,
            }
            let counts: Vec<ReactionOut> = db::reaction_counts(&pool, post)
                .await?
                .into_iter()
                .map(|(k, count)| ReactionOut {
                    key: k.as_str(),
                    emoji: k.emoji(),
                    count,
                })
                .collect();
            print_json(&counts)?;
        }
        Command::Like { user, post } => {
            let actor = actor(&pool, &cfg, &user).await?;
            let total = community::like_post(&pool, &actor, post).await?;
            info!(post_id = post, likes = total, "post liked");
            print_json(&db::get_post(&pool, post).await?)?;
        }
        Command::Home => {
            print_json(&home_board::home_board(&pool, now, opts.offset).await?)?;
        }
        Command::HomePost {
            user,
            board,
            title,
            body,
            link,
            capacity,
            remaining,
            deadline,
        } => {
            let actor = actor(&pool, &cfg, &user).await?;
            let new = NewBoardItem {
                board: BoardKind::parse_board(&board)
                    .ok_or_else(|| anyhow!("board must be notice, recruit or review"))?,
                title,
                body,
                link_url: link,
                capacity,
                remaining,
                deadline_at: deadline.as_deref().map(parse_instant).transpose()?,
            };
            let id = home_board::post_board_item(&pool, &actor, &new).await?;
            info!(item_id = id, "board item posted");
            print_json(&home_board::home_board(&pool, now, opts.offset).await?)?;
        }
        Command::Room { action } => run_room(&pool, &cfg, action).await?,
        Command::Admin { user, action } => {
            let actor = actor(&pool, &cfg, &user).await?;
            run_admin(&pool, &actor, action).await?;
        }
    }

    Ok(())
}

async fn run_room(pool: &db::Pool, cfg: &config::Config, action: RoomCommand) -> Result<()> {
    match action {
        RoomCommand::List { date } => print_json(&rooms::list_rooms(pool, date).await?),
        RoomCommand::Show { room } => print_json(&rooms::room_view(pool, room).await?),
        RoomCommand::Create { user, date, title } => {
            let actor = actor(pool, cfg, &user).await?;
            let id = rooms::create_room(pool, &actor, date, &title).await?;
            print_json(&rooms::room_view(pool, id).await?)
        }
        RoomCommand::SetOpen { user, room, open } => {
            let actor = actor(pool, cfg, &user).await?;
            rooms::set_room_open(pool, &actor, room, open).await?;
            print_json(&rooms::room_view(pool, room).await?)
        }
        RoomCommand::Delete { user, room } => {
            let actor = actor(pool, cfg, &user).await?;
            rooms::delete_room(pool, &actor, room).await?;
            info!(room_id = room, "room deleted");
            Ok(())
        }
        RoomCommand::Post {
            user,
            room,
            kind,
            title,
            body,
            nickname,
        } => {
            let kind = RoomPostKind::parse_kind(&kind)
                .ok_or_else(|| anyhow!("kind must be submit or mission"))?;
            let actor = participant(pool, cfg, &user).await?;
            let input = RoomPostInput {
                title,
                body,
                nickname,
                image_url: String::new(),
            };
            rooms::post_in_room(pool, &actor, room, kind, &input).await?;
            print_json(&rooms::room_view(pool, room).await?)
        }
        RoomCommand::DeletePost { user, room, post } => {
            let actor = participant(pool, cfg, &user).await?;
            rooms::delete_room_post(pool, &actor, room, post).await?;
            print_json(&rooms::room_view(pool, room).await?)
        }
    }
}

async fn run_admin(pool: &db::Pool, actor: &Actor, action: AdminCommand) -> Result<()> {
    match action {
        AdminCommand::Category { json } => {
            let category: Category = parse_json("category", &json)?;
            print_json(&admin::save_category(pool, actor, &category).await?)
        }
        AdminCommand::Course { json } => {
            let draft: CourseDraft = parse_json("course", &json)?;
            print_json(&admin::save_course(pool, actor, draft).await?)
        }
        AdminCommand::HideCourse { course } => {
            admin::hide_course(pool, actor, &course).await?;
            print_json(&db::get_course(pool, &course).await?)
        }
        AdminCommand::Lesson { json } => {
            let lesson: Lesson = parse_json("lesson", &json)?;
            print_json(&admin::save_lesson(pool, actor, lesson).await?)
        }
        AdminCommand::DeleteLesson { course, lesson } => {
            let removed = admin::delete_lesson(pool, actor, &course, &lesson).await?;
            info!(removed, "lesson delete");
            print_json(&db::list_lessons(pool, &course).await?)
        }
        AdminCommand::Rule { json } => {
            let rule: ScheduleRule = parse_json("schedule rule", &json)?;
            print_json(&admin::save_schedule_rule(pool, actor, rule).await?)
        }
        AdminCommand::Event { json } => {
            let draft: EventDraft = parse_json("schedule event", &json)?;
            print_json(&admin::save_schedule_event(pool, actor, draft).await?)
        }
    }
}
