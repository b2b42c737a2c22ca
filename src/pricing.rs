//! Checkout plans and the price a checkout page offers for them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Course, Pricing};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseMode {
    Single,
    Category,
}

/// What a plan unlocks once paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanScope {
    Course,
    Category,
    Site,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Plan {
    #[serde(rename = "single30")]
    Single30,
    #[serde(rename = "single90")]
    Single90,
    #[serde(rename = "category30")]
    Category30,
    #[serde(rename = "category90")]
    Category90,
    #[serde(rename = "subscriptionMonthly")]
    SubscriptionMonthly,
    #[serde(rename = "subscriptionYearly")]
    SubscriptionYearly,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Single30 => "single30",
            Plan::Single90 => "single90",
            Plan::Category30 => "category30",
            Plan::Category90 => "category90",
            Plan::SubscriptionMonthly => "subscriptionMonthly",
            Plan::SubscriptionYearly => "subscriptionYearly",
        }
    }

    pub fn parse_plan(s: &str) -> Option<Self> {
        match s {
            "single30" => Some(Plan::Single30),
            "single90" => Some(Plan::Single90),
            "category30" => Some(Plan::Category30),
            "category90" => Some(Plan::Category90),
            "subscriptionMonthly" => Some(Plan::SubscriptionMonthly),
            "subscriptionYearly" => Some(Plan::SubscriptionYearly),
            _ => None,
        }
    }

    pub fn term_days(&self) -> i64 {
        match self {
            Plan::Single30 | Plan::Category30 | Plan::SubscriptionMonthly => 30,
            Plan::Single90 | Plan::Category90 => 90,
            Plan::SubscriptionYearly => 365,
        }
    }

    pub fn scope(&self) -> PlanScope {
        match self {
            Plan::Single30 | Plan::Single90 => PlanScope::Course,
            Plan::Category30 | Plan::Category90 => PlanScope::Category,
            Plan::SubscriptionMonthly | Plan::SubscriptionYearly => PlanScope::Site,
        }
    }
}

/// Fixed site-wide subscription prices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionPrices {
    pub monthly: i64,
    pub yearly: i64,
}

impl Default for SubscriptionPrices {
    fn default() -> Self {
        Self {
            monthly: 99_000,
            yearly: 890_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanSelection {
    pub mode: PurchaseMode,
    pub term_days: i64,
    pub plan: Plan,
    pub price: i64,
}

/// Resolve the plan a checkout page would offer.
///
/// Category mode falls back to single when the course has no category price.
/// A requested term without a price falls back to 90 days if priced, else 30.
pub fn select_plan(pricing: &Pricing, mode: PurchaseMode, requested_term: i64) -> PlanSelection {
    let mode = match mode {
        PurchaseMode::Category if pricing.category_available() => PurchaseMode::Category,
        _ => PurchaseMode::Single,
    };
    let (price30, price90) = match mode {
        PurchaseMode::Category => (pricing.category30, pricing.category90),
        PurchaseMode::Single => (pricing.single30, pricing.single90),
    };
    let term_days = if requested_term == 30 && price30 > 0 {
        30
    } else if requested_term == 90 && price90 > 0 {
        90
    } else if price90 > 0 {
        90
    } else {
        30
    };
    let plan = match (mode, term_days) {
        (PurchaseMode::Category, 90) => Plan::Category90,
        (PurchaseMode::Category, _) => Plan::Category30,
        (PurchaseMode::Single, 90) => Plan::Single90,
        (PurchaseMode::Single, _) => Plan::Single30,
    };
    PlanSelection {
        mode,
        term_days,
        plan,
        price: if term_days == 90 { price90 } else { price30 },
    }
}

/// Price charged for `plan`. Zero means the plan is not sold for this course.
pub fn plan_price(course: Option<&Course>, plan: Plan, subs: &SubscriptionPrices) -> i64 {
    match plan {
        Plan::SubscriptionMonthly => subs.monthly,
        Plan::SubscriptionYearly => subs.yearly,
        _ => {
            let Some(course) = course else {
                return 0;
            };
            let p = course.effective_pricing();
            match plan {
                Plan::Single30 => p.single30,
                Plan::Single90 => p.single90,
                Plan::Category30 => p.category30,
                Plan::Category90 => p.category90,
                Plan::SubscriptionMonthly | Plan::SubscriptionYearly => 0,
            }
        }
    }
}

/// `99000` → `"99,000원"`.
pub fn format_krw(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}{grouped}원")
}

/// Multipliers used when the 90-day prices are derived from the 30-day ones.
pub const SINGLE90_RATIO: f64 = 2.2;
pub const CATEGORY90_RATIO: f64 = 2.0;

/// Round up to the next `..9,900` price point, never below 9,900.
/// Nothing to price gives 0 (plan not offered).
pub fn marketing_price(amount: f64) -> i64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    let rounded = (amount / 10_000.0).ceil() as i64 * 10_000 - 100;
    rounded.max(9_900)
}

pub fn price_90_from_30(price30: i64, ratio: f64) -> i64 {
    marketing_price(price30 as f64 * ratio)
}

pub fn term_deadline(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now + Duration::days(days)
}
