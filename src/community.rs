//! Community board: mission posts with emoji reactions and questions that an
//! admin answers.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::db::{self, Pool};
use crate::model::{Post, PostKind, PostStatus, ReactionKey, User};

pub const MAX_TAGS: usize = 10;
pub const DEFAULT_ANSWER_AUTHOR: &str = "관리자";

#[derive(Debug, Error)]
pub enum CommunityError {
    #[error("로그인이 필요해요.")]
    SignInRequired,
    #[error("제목/내용을 입력해 주세요.")]
    MissingContent,
    #[error("post {0} not found")]
    PostNotFound(i64),
    #[error("질문 글만 수정할 수 있어요.")]
    NotAQuestion,
    #[error("본인 글만 수정할 수 있어요.")]
    NotAuthor,
    #[error("관리자만 답변을 저장할 수 있어요.")]
    AdminOnly,
    #[error("미션 글에만 리액션할 수 있어요.")]
    NotAMission,
    #[error("이미 이 리액션을 눌렀어요.")]
    AlreadyReacted,
    #[error("이미 좋아요를 눌렀어요.")]
    AlreadyLiked,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Who is acting on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub is_admin: bool,
}

impl Actor {
    /// Signed-in actor for `user`; anonymous sessions cannot post or react.
    pub fn from_user(user: &User, is_admin: bool) -> Result<Self, CommunityError> {
        if user.is_anonymous {
            return Err(CommunityError::SignInRequired);
        }
        Ok(Self {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            is_admin,
        })
    }

    /// Live rooms also take submissions from anonymous sessions.
    pub fn participant(user: &User, is_admin: bool) -> Self {
        Self {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            is_admin,
        }
    }

    fn answer_author(&self) -> &str {
        [self.display_name.as_str(), self.email.as_str()]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_ANSWER_AUTHOR)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionFilter {
    #[default]
    All,
    Open,
    Solved,
}

impl QuestionFilter {
    pub fn parse_filter(s: &str) -> Option<Self> {
        match s {
            "all" => Some(QuestionFilter::All),
            "open" => Some(QuestionFilter::Open),
            "solved" => Some(QuestionFilter::Solved),
            _ => None,
        }
    }

    fn status(self) -> Option<PostStatus> {
        match self {
            QuestionFilter::All => None,
            QuestionFilter::Open => Some(PostStatus::Open),
            QuestionFilter::Solved => Some(PostStatus::Solved),
        }
    }
}

/// Comma-separated tags, trimmed, empties dropped, at most ten.
pub fn parse_tags(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(MAX_TAGS)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub tags: String,
    pub prompt: String,
    pub image_url: String,
}

#[instrument(skip_all, fields(kind = kind.as_str()))]
pub async fn create_post(
    pool: &Pool,
    actor: &Actor,
    kind: PostKind,
    new: &NewPost,
) -> Result<i64, CommunityError> {
    let title = new.title.trim();
    let body = new.body.trim();
    if title.is_empty() || body.is_empty() {
        return Err(CommunityError::MissingContent);
    }
    let id = match kind {
        PostKind::Question => {
            db::insert_post(
                pool,
                kind,
                Some(PostStatus::Open),
                title,
                body,
                &parse_tags(&new.tags),
                "",
                "",
                &actor.user_id,
            )
            .await?
        }
        PostKind::Mission => {
            db::insert_post(
                pool,
                kind,
                None,
                title,
                body,
                &[],
                new.prompt.trim(),
                new.image_url.trim(),
                &actor.user_id,
            )
            .await?
        }
    };
    debug!(post_id = id, "post created");
    Ok(id)
}

async fn load_post(pool: &Pool, post_id: i64) -> Result<Post, CommunityError> {
    db::get_post(pool, post_id)
        .await?
        .ok_or(CommunityError::PostNotFound(post_id))
}

/// Authors may edit their own questions.
#[instrument(skip_all, fields(post_id = post_id))]
pub async fn edit_question(
    pool: &Pool,
    actor: &Actor,
    post_id: i64,
    title: &str,
    body: &str,
    tags: &str,
) -> Result<(), CommunityError> {
    let post = load_post(pool, post_id).await?;
    if post.kind != PostKind::Question {
        return Err(CommunityError::NotAQuestion);
    }
    if post.author_id != actor.user_id {
        return Err(CommunityError::NotAuthor);
    }
    let (title, body) = (title.trim(), body.trim());
    if title.is_empty() || body.is_empty() {
        return Err(CommunityError::MissingContent);
    }
    db::update_post_content(pool, post_id, title, body, &parse_tags(tags)).await?;
    Ok(())
}

/// Store the admin answer and mark the question solved.
#[instrument(skip_all, fields(post_id = post_id))]
pub async fn answer_question(
    pool: &Pool,
    actor: &Actor,
    post_id: i64,
    body: &str,
) -> Result<(), CommunityError> {
    if !actor.is_admin {
        return Err(CommunityError::AdminOnly);
    }
    let post = load_post(pool, post_id).await?;
    if post.kind != PostKind::Question {
        return Err(CommunityError::NotAQuestion);
    }
    let body = body.trim();
    if body.is_empty() {
        return Err(CommunityError::MissingContent);
    }
    db::set_admin_answer(pool, post_id, body, actor.answer_author()).await?;
    Ok(())
}

/// React to a mission post. Members react once per key; admins may stack.
/// Returns the actor's count for that key.
#[instrument(skip_all, fields(post_id = post_id, key = key.as_str()))]
pub async fn react(
    pool: &Pool,
    actor: &Actor,
    post_id: i64,
    key: ReactionKey,
) -> Result<i64, CommunityError> {
    let mut tx = pool.begin().await?;
    match db::post_kind_tx(&mut tx, post_id).await? {
        None => return Err(CommunityError::PostNotFound(post_id)),
        Some(PostKind::Question) => return Err(CommunityError::NotAMission),
        Some(PostKind::Mission) => {}
    }
    let existing = db::user_reaction_count_tx(&mut tx, post_id, key, &actor.user_id).await?;
    if existing.is_some() && !actor.is_admin {
        return Err(CommunityError::AlreadyReacted);
    }
    let count = db::bump_reaction_tx(&mut tx, post_id, key, &actor.user_id).await?;
    tx.commit().await?;
    Ok(count)
}

/// One like per member per post. Returns the post's new like total.
#[instrument(skip_all, fields(post_id = post_id))]
pub async fn like_post(pool: &Pool, actor: &Actor, post_id: i64) -> Result<i64, CommunityError> {
    let mut tx = pool.begin().await?;
    if db::post_kind_tx(&mut tx, post_id).await?.is_none() {
        return Err(CommunityError::PostNotFound(post_id));
    }
    if !db::insert_like_tx(&mut tx, post_id, &actor.user_id).await? {
        return Err(CommunityError::AlreadyLiked);
    }
    let total = db::add_like_count_tx(&mut tx, post_id, 1).await?;
    tx.commit().await?;
    Ok(total)
}

#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub missions: Vec<Post>,
    pub questions: Vec<Post>,
}

#[instrument(skip_all)]
pub async fn board(pool: &Pool, filter: QuestionFilter) -> Result<Board, CommunityError> {
    let missions = db::list_posts(pool, PostKind::Mission, None).await?;
    let questions = db::list_posts(pool, PostKind::Question, filter.status()).await?;
    Ok(Board {
        missions,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_capped() {
        assert_eq!(parse_tags(" rust, ,ai ,,llm "), ["rust", "ai", "llm"]);
        let many = (0..15).map(|i| format!("t{i}")).collect::<Vec<_>>().join(",");
        assert_eq!(parse_tags(&many).len(), MAX_TAGS);
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn answer_author_falls_back() {
        let mut actor = Actor {
            user_id: "u".into(),
            display_name: String::new(),
            email: "admin@example.com".into(),
            is_admin: true,
        };
        assert_eq!(actor.answer_author(), "admin@example.com");
        actor.email.clear();
        assert_eq!(actor.answer_author(), DEFAULT_ANSWER_AUTHOR);
        actor.display_name = "멘토".into();
        assert_eq!(actor.answer_author(), "멘토");
    }

    #[test]
    fn filter_names() {
        assert_eq!(QuestionFilter::parse_filter("open"), Some(QuestionFilter::Open));
        assert_eq!(QuestionFilter::parse_filter("closed"), None);
        assert_eq!(QuestionFilter::default(), QuestionFilter::All);
    }
}
