use coursehub::community::{
    answer_question, board, create_post, edit_question, like_post, react, Actor, CommunityError,
    NewPost, QuestionFilter,
};
use coursehub::db;
use coursehub::model::{PostKind, PostStatus, ReactionKey};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    for (id, email) in [
        ("admin", "admin@example.com"),
        ("alice", "alice@example.com"),
        ("bob", "bob@example.com"),
    ] {
        db::upsert_user(&pool, id, email, "", false).await.unwrap();
    }
    pool
}

fn actor(id: &str, is_admin: bool) -> Actor {
    Actor {
        user_id: id.into(),
        display_name: String::new(),
        email: format!("{id}@example.com"),
        is_admin,
    }
}

fn question(title: &str, tags: &str) -> NewPost {
    NewPost {
        title: title.into(),
        body: "어떻게 하나요?".into(),
        tags: tags.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn question_lifecycle() {
    let pool = setup_pool().await;
    let alice = actor("alice", false);
    let id = create_post(&pool, &alice, PostKind::Question, &question("프롬프트 질문", "ai, prompt ,"))
        .await
        .unwrap();

    let post = db::get_post(&pool, id).await.unwrap().unwrap();
    assert_eq!(post.status, Some(PostStatus::Open));
    assert_eq!(post.tags, ["ai", "prompt"]);
    assert!(post.admin_answer.is_none());

    let err = edit_question(&pool, &actor("bob", false), id, "t", "b", "").await;
    assert!(matches!(err, Err(CommunityError::NotAuthor)));
    edit_question(&pool, &alice, id, "수정된 질문", "본문", "x")
        .await
        .unwrap();

    let err = answer_question(&pool, &alice, id, "답변").await;
    assert!(matches!(err, Err(CommunityError::AdminOnly)));
    answer_question(&pool, &actor("admin", true), id, "  이렇게 하세요  ")
        .await
        .unwrap();

    let post = db::get_post(&pool, id).await.unwrap().unwrap();
    assert_eq!(post.title, "수정된 질문");
    assert_eq!(post.status, Some(PostStatus::Solved));
    let answer = post.admin_answer.unwrap();
    assert_eq!(answer.body, "이렇게 하세요");
    assert_eq!(answer.author_name, "admin@example.com");
}

#[tokio::test]
async fn empty_title_or_body_is_rejected() {
    let pool = setup_pool().await;
    let err = create_post(&pool, &actor("alice", false), PostKind::Question, &question("  ", ""))
        .await;
    assert!(matches!(err, Err(CommunityError::MissingContent)));
}

#[tokio::test]
async fn missions_cannot_be_edited_as_questions() {
    let pool = setup_pool().await;
    let alice = actor("alice", false);
    let mission = NewPost {
        title: "1주차 인증".into(),
        body: "완료!".into(),
        prompt: "오늘의 미션".into(),
        tags: "ignored".into(),
        ..Default::default()
    };
    let id = create_post(&pool, &alice, PostKind::Mission, &mission).await.unwrap();
    let post = db::get_post(&pool, id).await.unwrap().unwrap();
    assert_eq!(post.status, None);
    assert!(post.tags.is_empty());
    assert_eq!(post.prompt, "오늘의 미션");

    let err = edit_question(&pool, &alice, id, "t", "b", "").await;
    assert!(matches!(err, Err(CommunityError::NotAQuestion)));
}

#[tokio::test]
async fn members_react_once_admins_stack() {
    let pool = setup_pool().await;
    let alice = actor("alice", false);
    let admin = actor("admin", true);
    let mission = NewPost {
        title: "인증".into(),
        body: "done".into(),
        ..Default::default()
    };
    let id = create_post(&pool, &alice, PostKind::Mission, &mission).await.unwrap();

    assert_eq!(react(&pool, &alice, id, ReactionKey::Heart).await.unwrap(), 1);
    let again = react(&pool, &alice, id, ReactionKey::Heart).await;
    assert!(matches!(again, Err(CommunityError::AlreadyReacted)));
    assert_eq!(react(&pool, &alice, id, ReactionKey::Fire).await.unwrap(), 1);

    assert_eq!(react(&pool, &admin, id, ReactionKey::Heart).await.unwrap(), 1);
    assert_eq!(react(&pool, &admin, id, ReactionKey::Heart).await.unwrap(), 2);

    let counts = db::reaction_counts(&pool, id).await.unwrap();
    assert_eq!(counts.len(), ReactionKey::ALL.len());
    assert_eq!(counts[&ReactionKey::Heart], 3);
    assert_eq!(counts[&ReactionKey::Fire], 1);
    assert_eq!(counts[&ReactionKey::Spark], 0);

    assert!(matches!(
        react(&pool, &alice, 9_999, ReactionKey::Clap).await,
        Err(CommunityError::PostNotFound(9_999))
    ));
}

#[tokio::test]
async fn board_filters_questions_by_status() {
    let pool = setup_pool().await;
    let alice = actor("alice", false);
    let admin = actor("admin", true);
    let open = create_post(&pool, &alice, PostKind::Question, &question("open", ""))
        .await
        .unwrap();
    let solved = create_post(&pool, &alice, PostKind::Question, &question("solved", ""))
        .await
        .unwrap();
    answer_question(&pool, &admin, solved, "ok").await.unwrap();
    let mission = NewPost {
        title: "m".into(),
        body: "b".into(),
        ..Default::default()
    };
    create_post(&pool, &alice, PostKind::Mission, &mission).await.unwrap();

    let ids = |posts: &[coursehub::model::Post]| posts.iter().map(|p| p.id).collect::<Vec<_>>();

    let all = board(&pool, QuestionFilter::All).await.unwrap();
    assert_eq!(all.missions.len(), 1);
    assert_eq!(all.questions.len(), 2);

    let only_open = board(&pool, QuestionFilter::Open).await.unwrap();
    assert_eq!(ids(&only_open.questions), vec![open]);

    let only_solved = board(&pool, QuestionFilter::Solved).await.unwrap();
    assert_eq!(ids(&only_solved.questions), vec![solved]);
}

#[tokio::test]
async fn anonymous_users_cannot_act() {
    let pool = setup_pool().await;
    db::upsert_user(&pool, "anon", "", "", true).await.unwrap();
    let user = db::get_user(&pool, "anon").await.unwrap().unwrap();
    assert!(matches!(
        Actor::from_user(&user, false),
        Err(CommunityError::SignInRequired)
    ));
}

#[tokio::test]
async fn likes_count_once_per_member() {
    let pool = setup_pool().await;
    let id = create_post(&pool, &actor("alice", false), PostKind::Question, &question("좋아요", ""))
        .await
        .unwrap();

    assert_eq!(like_post(&pool, &actor("alice", false), id).await.unwrap(), 1);
    assert_eq!(like_post(&pool, &actor("bob", false), id).await.unwrap(), 2);
    let again = like_post(&pool, &actor("bob", false), id).await;
    assert!(matches!(again, Err(CommunityError::AlreadyLiked)));
    // Admins get no extra likes either.
    like_post(&pool, &actor("admin", true), id).await.unwrap();
    assert!(matches!(
        like_post(&pool, &actor("admin", true), id).await,
        Err(CommunityError::AlreadyLiked)
    ));

    let post = db::get_post(&pool, id).await.unwrap().unwrap();
    assert_eq!(post.like_count, 3);
    assert!(matches!(
        like_post(&pool, &actor("bob", false), 9_999).await,
        Err(CommunityError::PostNotFound(9_999))
    ));
}
