use chrono::{FixedOffset, TimeZone, Utc};
use coursehub::community::Actor;
use coursehub::home_board::{
    delete_board_item, home_board, post_board_item, BoardError, NewBoardItem,
};
use coursehub::model::BoardKind;
use coursehub::seed;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed::apply(&pool, &seed::demo().unwrap()).await.unwrap();
    pool
}

fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

fn admin() -> Actor {
    Actor {
        user_id: "admin".into(),
        display_name: "관리자".into(),
        email: "admin@example.com".into(),
        is_admin: true,
    }
}

#[tokio::test]
async fn seeded_boards_show_recruit_dday() {
    let pool = setup_pool().await;
    // 2026-02-17 10:00 KST, three days before the seeded deadline.
    let now = Utc.with_ymd_and_hms(2026, 2, 17, 1, 0, 0).unwrap();
    let home = home_board(&pool, now, kst()).await.unwrap();
    assert_eq!(home.notice.len(), 1);
    assert_eq!(home.review.len(), 1);
    assert_eq!(home.recruit[0].item.capacity, Some(20));
    assert_eq!(home.recruit[0].dday.as_deref(), Some("D-3"));
    assert_eq!(home.notice[0].dday, None);

    let after = Utc.with_ymd_and_hms(2026, 2, 21, 1, 0, 0).unwrap();
    let home = home_board(&pool, after, kst()).await.unwrap();
    assert_eq!(home.recruit[0].dday.as_deref(), Some("마감"));

    // Seeding again leaves the board alone.
    seed::apply(&pool, &seed::demo().unwrap()).await.unwrap();
    assert_eq!(home_board(&pool, now, kst()).await.unwrap().notice.len(), 1);
}

#[tokio::test]
async fn admins_post_and_delete_items() {
    let pool = setup_pool().await;
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let mut new = NewBoardItem {
        board: BoardKind::Notice,
        title: "공지: 휴강 안내".into(),
        body: "3월 첫 주 휴강".into(),
        link_url: String::new(),
        capacity: Some(10),
        remaining: None,
        deadline_at: Some(now),
    };

    let member = Actor {
        is_admin: false,
        ..admin()
    };
    assert!(matches!(
        post_board_item(&pool, &member, &new).await,
        Err(BoardError::AdminOnly)
    ));

    let id = post_board_item(&pool, &admin(), &new).await.unwrap();
    let home = home_board(&pool, now, kst()).await.unwrap();
    assert_eq!(home.notice[0].item.id, id);
    // Recruit-only fields are dropped from notices.
    assert_eq!(home.notice[0].item.capacity, None);
    assert_eq!(home.notice[0].item.deadline_at, None);

    new.title = " ".into();
    assert!(matches!(
        post_board_item(&pool, &admin(), &new).await,
        Err(BoardError::MissingTitle)
    ));
    new.title = "모집".into();
    new.board = BoardKind::Recruit;
    new.remaining = Some(11);
    assert!(matches!(
        post_board_item(&pool, &admin(), &new).await,
        Err(BoardError::InvalidCapacity)
    ));

    delete_board_item(&pool, &admin(), id).await.unwrap();
    assert!(matches!(
        delete_board_item(&pool, &admin(), id).await,
        Err(BoardError::ItemNotFound(_))
    ));
}
