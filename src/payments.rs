//! Captured payments turned into entitlements.
//!
//! Provider checkout happens elsewhere; this module takes a capture that the
//! provider already confirmed, checks it against our prices and grants the
//! plan. The duplicate check, the grant and the payment row share one
//! transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::{self, Pool};
use crate::model::{CategoryPassEntry, PaymentProvider};
use crate::pricing::{plan_price, term_deadline, Plan, PlanScope, SubscriptionPrices};
use crate::timestamp::{is_active_until_millis, Timestamp};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment {provider}:{provider_ref} was already captured")]
    AlreadyCaptured {
        provider: &'static str,
        provider_ref: String,
    },
    #[error("provider reference is required")]
    MissingReference,
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("plan {0} requires a course")]
    MissingCourse(&'static str),
    #[error("unknown course: {0}")]
    UnknownCourse(String),
    #[error("course {0} has no category")]
    MissingCategory(String),
    #[error("plan {0} is not offered for this course")]
    PlanNotOffered(&'static str),
    #[error("amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: i64, actual: i64 },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedPayment {
    pub provider: PaymentProvider,
    pub provider_ref: String,
    pub user_id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    pub plan: Plan,
    pub amount_krw: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub payment_id: i64,
    pub plan: Plan,
    /// `None` when existing perpetual access was kept.
    pub expires_at: Option<DateTime<Utc>>,
}

/// New expiry for a term bought on top of `current_ms`. A still-running term
/// is extended; a lapsed or absent one restarts from `now`.
pub fn extend_from(current_ms: Option<i64>, now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    let base = current_ms
        .filter(|ms| *ms > now.timestamp_millis())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(now);
    term_deadline(base, days)
}

/// Expiry after buying `days` on top of an existing grant. A grant without a
/// readable expiry never lapses and stays that way.
fn renew(current: Option<&Timestamp>, now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    let current_ms = current.and_then(Timestamp::to_millis)?;
    Some(extend_from(Some(current_ms), now, days))
}

#[instrument(skip_all, fields(provider = payment.provider.as_str(), plan = payment.plan.as_str()))]
pub async fn capture(
    pool: &Pool,
    payment: &CapturedPayment,
    subs: &SubscriptionPrices,
    now: DateTime<Utc>,
) -> Result<Grant, PaymentError> {
    let provider_ref = payment.provider_ref.trim();
    if provider_ref.is_empty() {
        return Err(PaymentError::MissingReference);
    }
    let plan = payment.plan;

    let mut tx = pool.begin().await?;
    if db::payment_exists_tx(&mut tx, payment.provider.as_str(), provider_ref).await? {
        return Err(PaymentError::AlreadyCaptured {
            provider: payment.provider.as_str(),
            provider_ref: provider_ref.to_string(),
        });
    }

    let user = db::get_user_tx(&mut tx, &payment.user_id)
        .await?
        .ok_or_else(|| PaymentError::UnknownUser(payment.user_id.clone()))?;

    let course = match plan.scope() {
        PlanScope::Site => None,
        PlanScope::Course | PlanScope::Category => {
            let course_id = payment
                .course_id
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or(PaymentError::MissingCourse(plan.as_str()))?;
            let course = db::get_course_tx(&mut tx, course_id)
                .await?
                .ok_or_else(|| PaymentError::UnknownCourse(course_id.to_string()))?;
            Some(course)
        }
    };

    let expected = plan_price(course.as_ref(), plan, subs);
    if expected <= 0 {
        return Err(PaymentError::PlanNotOffered(plan.as_str()));
    }
    if payment.amount_krw != expected {
        warn!(expected, actual = payment.amount_krw, "captured amount does not match price");
        return Err(PaymentError::AmountMismatch {
            expected,
            actual: payment.amount_krw,
        });
    }

    let days = plan.term_days();
    let expires_at = match (plan.scope(), course.as_ref()) {
        (PlanScope::Course, Some(course)) => {
            let existing = db::get_enrollment_tx(&mut tx, &user.id, &course.id).await?;
            match existing {
                // Perpetual enrollments stay perpetual.
                Some(e) if e.expires_at_ms.filter(|ms| *ms != 0).is_none() => None,
                Some(e) if is_active_until_millis(e.expires_at_ms, now) => {
                    Some(extend_from(e.expires_at_ms, now, days))
                }
                _ => Some(term_deadline(now, days)),
            }
        }
        (PlanScope::Category, Some(course)) => {
            if course.category_id.is_empty() {
                return Err(PaymentError::MissingCategory(course.id.clone()));
            }
            match user.entitlements.category_pass_entry(&course.category_id) {
                Some(pass) => renew(pass.expires_at(), now, days),
                None => Some(term_deadline(now, days)),
            }
        }
        _ if user.entitlements.subscription_active => {
            renew(user.entitlements.subscription_expires_at.as_ref(), now, days)
        }
        _ => Some(term_deadline(now, days)),
    };

    match (plan.scope(), course.as_ref()) {
        (PlanScope::Course, Some(course)) => {
            let ms = expires_at.map(|at| at.timestamp_millis());
            db::upsert_enrollment_tx(&mut tx, &user.id, &course.id, ms).await?;
        }
        (PlanScope::Category, Some(course)) => {
            let mut ent = user.entitlements.clone();
            ent.category_pass.insert(
                course.category_id.clone(),
                CategoryPassEntry::Wrapped {
                    expires_at: expires_at.map(Timestamp::from),
                },
            );
            db::save_entitlements_tx(&mut tx, &user.id, &ent).await?;
        }
        _ => {
            let mut ent = user.entitlements.clone();
            ent.subscription_active = true;
            ent.subscription_expires_at = expires_at.map(Timestamp::from);
            db::save_entitlements_tx(&mut tx, &user.id, &ent).await?;
        }
    }

    let payment_id = db::insert_payment_tx(
        &mut tx,
        payment.provider.as_str(),
        provider_ref,
        &user.id,
        course.as_ref().map(|c| c.id.as_str()),
        plan.as_str(),
        payment.amount_krw,
        now,
    )
    .await?;
    tx.commit().await?;

    info!(payment_id, user = %user.id, "payment captured");
    Ok(Grant {
        payment_id,
        plan,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn running_terms_extend_lapsed_terms_restart() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let later = now + Duration::days(10);
        assert_eq!(
            extend_from(Some(later.timestamp_millis()), now, 30),
            later + Duration::days(30)
        );
        let earlier = now - Duration::days(10);
        assert_eq!(
            extend_from(Some(earlier.timestamp_millis()), now, 30),
            now + Duration::days(30)
        );
        assert_eq!(extend_from(None, now, 90), now + Duration::days(90));
    }
}
