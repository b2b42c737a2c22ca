use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub order: i64,
}

/// Checkout prices in KRW. Zero means the plan is not offered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pricing {
    pub single30: i64,
    pub single90: i64,
    pub category30: i64,
    pub category90: i64,
}

impl Pricing {
    pub fn category_available(&self) -> bool {
        self.category30 > 0 || self.category90 > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
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
    pub pricing: Pricing,
}

impl Course {
    /// Single 30-day price, falling back to the list price for older courses.
    pub fn single30_price(&self) -> i64 {
        if self.pricing.single30 > 0 {
            self.pricing.single30
        } else {
            self.price_krw
        }
    }

    pub fn effective_pricing(&self) -> Pricing {
        Pricing {
            single30: self.single30_price(),
            ..self.pricing
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub course_id: String,
    pub order: i64,
    pub title: String,
    pub duration_sec: i64,
    pub is_free: bool,
    pub video_src: String,
}

/// Category pass entry. Older documents store the bare expiry, so that
/// shape is tried first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryPassEntry {
    Bare(Timestamp),
    Wrapped {
        #[serde(rename = "expiresAt", default)]
        expires_at: Option<Timestamp>,
    },
}

impl CategoryPassEntry {
    /// Decode one stored entry. Empty values (`false`, `null`, `0`, `""`) mean
    /// no pass; any other value whose expiry cannot be read is a pass without
    /// expiry.
    pub fn from_stored(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Bool(false) => None,
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            Value::String(s) if s.is_empty() => None,
            Value::Object(doc) if doc.contains_key("expiresAt") => Some(CategoryPassEntry::Wrapped {
                expires_at: doc.get("expiresAt").and_then(Timestamp::from_value),
            }),
            other => Some(match Timestamp::from_value(other) {
                Some(ts) => CategoryPassEntry::Bare(ts),
                None => CategoryPassEntry::Wrapped { expires_at: None },
            }),
        }
    }

    pub fn expires_at(&self) -> Option<&Timestamp> {
        match self {
            CategoryPassEntry::Bare(ts) => Some(ts),
            CategoryPassEntry::Wrapped { expires_at } => expires_at.as_ref(),
        }
    }
}

/// Entitlements embedded in the user document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Entitlements {
    pub invite_verified: bool,
    pub category_pass: BTreeMap<String, CategoryPassEntry>,
    pub subscription_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_expires_at: Option<Timestamp>,
}

impl Entitlements {
    /// Field-by-field decode of a stored document. A malformed field only
    /// affects its own source; the rest of the document still counts.
    pub fn from_stored(value: &Value) -> Self {
        let Some(doc) = value.as_object() else {
            return Self::default();
        };
        let flag = |key: &str| doc.get(key).and_then(Value::as_bool).unwrap_or(false);
        let category_pass = doc
            .get("categoryPass")
            .and_then(Value::as_object)
            .map(|passes| {
                passes
                    .iter()
                    .filter_map(|(id, v)| CategoryPassEntry::from_stored(v).map(|e| (id.clone(), e)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            invite_verified: flag("inviteVerified"),
            category_pass,
            subscription_active: flag("subscriptionActive"),
            subscription_expires_at: doc
                .get("subscriptionExpiresAt")
                .and_then(Timestamp::from_value),
        }
    }

    pub fn category_pass_entry(&self, category_id: &str) -> Option<&CategoryPassEntry> {
        if category_id.is_empty() {
            return None;
        }
        self.category_pass.get(category_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub is_anonymous: bool,
    pub entitlements: Entitlements,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Enrollment {
    pub user_id: String,
    pub course_id: String,
    pub expires_at_ms: Option<i64>,
    pub enrolled_at: DateTime<Utc>,
}

/// Recurring weekly template. Weekdays use 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub weekdays: Vec<u8>,
    pub time: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub teacher: String,
    #[serde(default)]
    pub place: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvent {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub teacher: String,
    #[serde(default)]
    pub place: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Mission,
    Question,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Mission => "mission",
            PostKind::Question => "question",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "mission" => Some(PostKind::Mission),
            "question" => Some(PostKind::Question),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Open,
    Solved,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Open => "open",
            PostStatus::Solved => "solved",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PostStatus::Open),
            "solved" => Some(PostStatus::Solved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKey {
    Thumb,
    Heart,
    Fire,
    Party,
    Clap,
    Spark,
}

impl ReactionKey {
    pub const ALL: [ReactionKey; 6] = [
        ReactionKey::Thumb,
        ReactionKey::Heart,
        ReactionKey::Fire,
        ReactionKey::Party,
        ReactionKey::Clap,
        ReactionKey::Spark,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKey::Thumb => "thumb",
            ReactionKey::Heart => "heart",
            ReactionKey::Fire => "fire",
            ReactionKey::Party => "party",
            ReactionKey::Clap => "clap",
            ReactionKey::Spark => "spark",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            ReactionKey::Thumb => "👍",
            ReactionKey::Heart => "❤️",
            ReactionKey::Fire => "🔥",
            ReactionKey::Party => "🎉",
            ReactionKey::Clap => "👏",
            ReactionKey::Spark => "✨",
        }
    }

    pub fn parse_key(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminAnswer {
    pub body: String,
    pub author_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub kind: PostKind,
    pub status: Option<PostStatus>,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub prompt: String,
    pub image_url: String,
    pub author_id: String,
    pub admin_answer: Option<AdminAnswer>,
    pub reaction_counts: BTreeMap<ReactionKey, i64>,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Posts inside a live room: member submissions and admin missions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomPostKind {
    Submit,
    Mission,
}

impl RoomPostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomPostKind::Submit => "submit",
            RoomPostKind::Mission => "mission",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "submit" => Some(RoomPostKind::Submit),
            "mission" => Some(RoomPostKind::Mission),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: i64,
    pub date: NaiveDate,
    pub title: String,
    pub is_open: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomPost {
    pub id: i64,
    pub room_id: i64,
    #[serde(rename = "type")]
    pub kind: RoomPostKind,
    pub title: String,
    pub body: String,
    pub nickname: String,
    pub image_url: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    Notice,
    Recruit,
    Review,
}

impl BoardKind {
    pub const ALL: [BoardKind; 3] = [BoardKind::Notice, BoardKind::Recruit, BoardKind::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            BoardKind::Notice => "notice",
            BoardKind::Recruit => "recruit",
            BoardKind::Review => "review",
        }
    }

    pub fn parse_board(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == s)
    }
}

/// Home page board entry. Capacity and deadline only mean something on
/// recruit items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoardItem {
    pub id: i64,
    pub board: BoardKind,
    pub title: String,
    pub body: String,
    pub link_url: String,
    pub capacity: Option<i64>,
    pub remaining: Option<i64>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InviteCode {
    pub code: String,
    pub active: bool,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl InviteCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.used_count >= max)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    PayPal,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::PayPal => "paypal",
        }
    }

    pub fn parse_provider(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Some(PaymentProvider::Stripe),
            "paypal" => Some(PaymentProvider::PayPal),
            _ => None,
        }
    }
}
