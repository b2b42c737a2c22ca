//! Invite codes: a signed-in member redeems a code once to become
//! invite-verified, which opens every course flagged free for invitees.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{self, Pool};
use crate::model::InviteCode;

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("초대코드를 입력해 주세요.")]
    EmptyCode,
    #[error("초대코드 등록은 로그인 후 가능합니다.")]
    SignInRequired,
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("유효하지 않은 초대코드입니다.")]
    UnknownCode,
    #[error("사용이 중지된 초대코드입니다.")]
    Inactive,
    #[error("만료된 초대코드입니다.")]
    Expired,
    #[error("사용 가능 횟수를 초과한 초대코드입니다.")]
    Exhausted,
    #[error("invite code already exists: {0}")]
    Duplicate(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Redemption {
    Redeemed,
    AlreadyVerified,
}

/// Trim, uppercase and drop inner whitespace.
pub fn normalize_code(raw: &str) -> Result<String, InviteError> {
    let code: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    if code.is_empty() {
        return Err(InviteError::EmptyCode);
    }
    Ok(code)
}

fn check_usable(code: &InviteCode, now: DateTime<Utc>) -> Result<(), InviteError> {
    if !code.active {
        return Err(InviteError::Inactive);
    }
    if code.is_expired(now) {
        return Err(InviteError::Expired);
    }
    if code.is_exhausted() {
        return Err(InviteError::Exhausted);
    }
    Ok(())
}

/// Redeem `raw_code` for `user_id`. Verified members are told so and the code
/// is left untouched.
#[instrument(skip_all, fields(user = user_id))]
pub async fn redeem(
    pool: &Pool,
    user_id: &str,
    raw_code: &str,
    now: DateTime<Utc>,
) -> Result<Redemption, InviteError> {
    let code = normalize_code(raw_code)?;

    let mut tx = pool.begin().await?;
    let user = db::get_user_tx(&mut tx, user_id)
        .await?
        .ok_or_else(|| InviteError::UnknownUser(user_id.to_string()))?;
    if user.is_anonymous {
        return Err(InviteError::SignInRequired);
    }
    if user.entitlements.invite_verified {
        return Ok(Redemption::AlreadyVerified);
    }

    let invite = db::get_invite_code_tx(&mut tx, &code)
        .await?
        .ok_or(InviteError::UnknownCode)?;
    check_usable(&invite, now)?;

    db::record_redemption_tx(&mut tx, &invite.code, user_id, now).await?;
    let mut entitlements = user.entitlements;
    entitlements.invite_verified = true;
    db::save_entitlements_tx(&mut tx, user_id, &entitlements).await?;
    tx.commit().await?;

    info!(code = %invite.code, "invite code redeemed");
    Ok(Redemption::Redeemed)
}

/// Random uppercase hex code of `len` characters (at most 32).
pub fn generate_code(len: usize) -> String {
    let mut code = Uuid::new_v4().simple().to_string().to_uppercase();
    code.truncate(len.clamp(1, 32));
    code
}

#[derive(Debug, Clone, Default)]
pub struct NewInviteCode {
    pub code: Option<String>,
    pub max_uses: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[instrument(skip_all)]
pub async fn create_invite_code(
    pool: &Pool,
    req: NewInviteCode,
    code_length: usize,
) -> Result<InviteCode, InviteError> {
    let code = match req.code.as_deref() {
        Some(raw) => normalize_code(raw)?,
        None => generate_code(code_length),
    };
    if db::get_invite_code(pool, &code).await?.is_some() {
        return Err(InviteError::Duplicate(code));
    }
    let invite = InviteCode {
        code,
        active: true,
        max_uses: req.max_uses.filter(|n| *n > 0),
        used_count: 0,
        expires_at: req.expires_at,
    };
    db::insert_invite_code(pool, &invite).await?;
    info!(code = %invite.code, "invite code created");
    Ok(invite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn normalizes_codes() {
        assert_eq!(normalize_code("  ab c-12 ").unwrap(), "ABC-12");
        assert!(matches!(normalize_code(" \t "), Err(InviteError::EmptyCode)));
    }

    #[test]
    fn generated_codes_have_requested_length() {
        let code = generate_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(generate_code(64).len(), 32);
    }

    #[test]
    fn usability_checks_in_order() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut code = InviteCode {
            code: "WELCOME".into(),
            active: true,
            max_uses: Some(2),
            used_count: 0,
            expires_at: Some(now + Duration::days(1)),
        };
        assert!(check_usable(&code, now).is_ok());

        code.used_count = 2;
        assert!(matches!(check_usable(&code, now), Err(InviteError::Exhausted)));

        code.expires_at = Some(now);
        assert!(matches!(check_usable(&code, now), Err(InviteError::Expired)));

        code.active = false;
        assert!(matches!(check_usable(&code, now), Err(InviteError::Inactive)));
    }
}
