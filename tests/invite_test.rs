use chrono::{DateTime, Duration, TimeZone, Utc};
use coursehub::db;
use coursehub::invite::{create_invite_code, redeem, InviteError, NewInviteCode, Redemption};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    db::upsert_user(&pool, "alice", "alice@example.com", "Alice", false)
        .await
        .unwrap();
    db::upsert_user(&pool, "bob", "bob@example.com", "Bob", false)
        .await
        .unwrap();
    db::upsert_user(&pool, "guest", "", "", true).await.unwrap();
    pool
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

async fn make_code(pool: &sqlx::SqlitePool, code: &str, max_uses: Option<i64>) {
    create_invite_code(
        pool,
        NewInviteCode {
            code: Some(code.to_string()),
            max_uses,
            expires_at: None,
        },
        8,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn redeem_marks_user_verified_and_counts_use() {
    let pool = setup_pool().await;
    make_code(&pool, "WELCOME", Some(5)).await;

    let outcome = redeem(&pool, "alice", "  welcome ", now()).await.unwrap();
    assert_eq!(outcome, Redemption::Redeemed);

    let user = db::get_user(&pool, "alice").await.unwrap().unwrap();
    assert!(user.entitlements.invite_verified);
    let code = db::get_invite_code(&pool, "WELCOME").await.unwrap().unwrap();
    assert_eq!(code.used_count, 1);
    assert_eq!(db::count_redemptions(&pool, "WELCOME").await.unwrap(), 1);
}

#[tokio::test]
async fn already_verified_does_not_consume_code() {
    let pool = setup_pool().await;
    make_code(&pool, "ONCE", Some(1)).await;
    redeem(&pool, "alice", "ONCE", now()).await.unwrap();

    let again = redeem(&pool, "alice", "ONCE", now()).await.unwrap();
    assert_eq!(again, Redemption::AlreadyVerified);
    let code = db::get_invite_code(&pool, "ONCE").await.unwrap().unwrap();
    assert_eq!(code.used_count, 1);

    let err = redeem(&pool, "bob", "ONCE", now()).await.unwrap_err();
    assert!(matches!(err, InviteError::Exhausted));
    let bob = db::get_user(&pool, "bob").await.unwrap().unwrap();
    assert!(!bob.entitlements.invite_verified);
}

#[tokio::test]
async fn rejects_anonymous_unknown_and_bad_codes() {
    let pool = setup_pool().await;
    make_code(&pool, "VALID", None).await;

    assert!(matches!(
        redeem(&pool, "guest", "VALID", now()).await,
        Err(InviteError::SignInRequired)
    ));
    assert!(matches!(
        redeem(&pool, "nobody", "VALID", now()).await,
        Err(InviteError::UnknownUser(_))
    ));
    assert!(matches!(
        redeem(&pool, "alice", "NOPE", now()).await,
        Err(InviteError::UnknownCode)
    ));
    assert!(matches!(
        redeem(&pool, "alice", "   ", now()).await,
        Err(InviteError::EmptyCode)
    ));
}

#[tokio::test]
async fn expired_code_is_rejected() {
    let pool = setup_pool().await;
    create_invite_code(
        &pool,
        NewInviteCode {
            code: Some("SPRING".into()),
            max_uses: None,
            expires_at: Some(now() - Duration::hours(1)),
        },
        8,
    )
    .await
    .unwrap();

    let err = redeem(&pool, "alice", "spring", now()).await.unwrap_err();
    assert!(matches!(err, InviteError::Expired));
    let code = db::get_invite_code(&pool, "SPRING").await.unwrap().unwrap();
    assert_eq!(code.used_count, 0);
}

#[tokio::test]
async fn generated_codes_are_unique_and_sized() {
    let pool = setup_pool().await;
    let a = create_invite_code(&pool, NewInviteCode::default(), 10)
        .await
        .unwrap();
    let b = create_invite_code(&pool, NewInviteCode::default(), 10)
        .await
        .unwrap();
    assert_eq!(a.code.len(), 10);
    assert_ne!(a.code, b.code);
    assert_eq!(a.max_uses, None);

    let dup = create_invite_code(
        &pool,
        NewInviteCode {
            code: Some(a.code.to_lowercase()),
            ..Default::default()
        },
        10,
    )
    .await;
    assert!(matches!(dup, Err(InviteError::Duplicate(_))));
}
