//! Live rooms: dated rooms where members drop submissions while a class
//! runs, and admins pin missions.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::community::Actor;
use crate::db::{self, Pool};
use crate::model::{Room, RoomPost, RoomPostKind};

pub const ROOM_LIST_LIMIT: i64 = 200;
pub const ROOM_POST_LIMIT: i64 = 200;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("관리자만 할 수 있어요.")]
    AdminOnly,
    #[error("room {0} not found")]
    RoomNotFound(i64),
    #[error("room post {0} not found")]
    PostNotFound(i64),
    #[error("마감된 방이에요.")]
    RoomClosed,
    #[error("제목/내용이 필요합니다.")]
    MissingContent,
    #[error("별명을 입력해 주세요.")]
    MissingNickname,
    #[error("본인 제출글만 수정할 수 있어요.")]
    NotOwner,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn require_admin(actor: &Actor) -> Result<(), RoomError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(RoomError::AdminOnly)
    }
}

#[instrument(skip_all, fields(date = %date))]
pub async fn create_room(
    pool: &Pool,
    actor: &Actor,
    date: NaiveDate,
    title: &str,
) -> Result<i64, RoomError> {
    require_admin(actor)?;
    let title = title.trim();
    if title.is_empty() {
        return Err(RoomError::MissingContent);
    }
    let id = db::insert_room(pool, date, title, &actor.user_id).await?;
    debug!(room_id = id, "room created");
    Ok(id)
}

/// Rooms newest date first, optionally only those on `date`.
#[instrument(skip_all)]
pub async fn list_rooms(pool: &Pool, date: Option<NaiveDate>) -> Result<Vec<Room>, RoomError> {
    Ok(db::list_rooms(pool, date, ROOM_LIST_LIMIT).await?)
}

async fn load_room(pool: &Pool, room_id: i64) -> Result<Room, RoomError> {
    db::get_room(pool, room_id)
        .await?
        .ok_or(RoomError::RoomNotFound(room_id))
}

/// Open or close a room. Closed rooms stop taking submissions.
#[instrument(skip_all, fields(room_id = room_id, open = open))]
pub async fn set_room_open(
    pool: &Pool,
    actor: &Actor,
    room_id: i64,
    open: bool,
) -> Result<(), RoomError> {
    require_admin(actor)?;
    let room = load_room(pool, room_id).await?;
    db::update_room(pool, room_id, &room.title, open).await?;
    Ok(())
}

#[instrument(skip_all, fields(room_id = room_id))]
pub async fn rename_room(
    pool: &Pool,
    actor: &Actor,
    room_id: i64,
    title: &str,
) -> Result<(), RoomError> {
    require_admin(actor)?;
    let title = title.trim();
    if title.is_empty() {
        return Err(RoomError::MissingContent);
    }
    let room = load_room(pool, room_id).await?;
    db::update_room(pool, room_id, title, room.is_open).await?;
    Ok(())
}

#[instrument(skip_all, fields(room_id = room_id))]
pub async fn delete_room(pool: &Pool, actor: &Actor, room_id: i64) -> Result<(), RoomError> {
    require_admin(actor)?;
    if !db::delete_room(pool, room_id).await? {
        return Err(RoomError::RoomNotFound(room_id));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct RoomPostInput {
    pub title: String,
    pub body: String,
    pub nickname: String,
    pub image_url: String,
}

impl RoomPostInput {
    fn trimmed(&self) -> Result<(&str, &str), RoomError> {
        let (title, body) = (self.title.trim(), self.body.trim());
        if title.is_empty() || body.is_empty() {
            return Err(RoomError::MissingContent);
        }
        Ok((title, body))
    }

    fn nickname(&self) -> Result<&str, RoomError> {
        match self.nickname.trim() {
            "" => Err(RoomError::MissingNickname),
            nick => Ok(nick),
        }
    }
}

/// Post into a room. Missions are admin-only and carry no nickname;
/// submissions need a nickname and an open room.
#[instrument(skip_all, fields(room_id = room_id, kind = kind.as_str()))]
pub async fn post_in_room(
    pool: &Pool,
    actor: &Actor,
    room_id: i64,
    kind: RoomPostKind,
    input: &RoomPostInput,
) -> Result<i64, RoomError> {
    let room = load_room(pool, room_id).await?;
    let (title, body) = input.trimmed()?;
    let nickname = match kind {
        RoomPostKind::Mission => {
            require_admin(actor)?;
            ""
        }
        RoomPostKind::Submit => {
            if !room.is_open {
                return Err(RoomError::RoomClosed);
            }
            input.nickname()?
        }
    };
    let id = db::insert_room_post(
        pool,
        room_id,
        kind,
        title,
        body,
        nickname,
        input.image_url.trim(),
        &actor.user_id,
    )
    .await?;
    Ok(id)
}

async fn load_post(pool: &Pool, room_id: i64, post_id: i64) -> Result<RoomPost, RoomError> {
    db::get_room_post(pool, room_id, post_id)
        .await?
        .ok_or(RoomError::PostNotFound(post_id))
}

/// Authors may edit their own submissions. An empty image URL keeps the
/// current image.
#[instrument(skip_all, fields(room_id = room_id, post_id = post_id))]
pub async fn edit_room_post(
    pool: &Pool,
    actor: &Actor,
    room_id: i64,
    post_id: i64,
    input: &RoomPostInput,
) -> Result<(), RoomError> {
    let post = load_post(pool, room_id, post_id).await?;
    if post.kind != RoomPostKind::Submit || post.author_id != actor.user_id {
        return Err(RoomError::NotOwner);
    }
    let (title, body) = input.trimmed()?;
    let nickname = input.nickname()?;
    let image_url = Some(input.image_url.trim()).filter(|u| !u.is_empty());
    db::update_room_post(pool, post_id, title, body, nickname, image_url).await?;
    Ok(())
}

/// Authors delete their own submissions; admins delete anything.
#[instrument(skip_all, fields(room_id = room_id, post_id = post_id))]
pub async fn delete_room_post(
    pool: &Pool,
    actor: &Actor,
    room_id: i64,
    post_id: i64,
) -> Result<(), RoomError> {
    let post = load_post(pool, room_id, post_id).await?;
    let own_submission = post.kind == RoomPostKind::Submit && post.author_id == actor.user_id;
    if !own_submission && !actor.is_admin {
        return Err(RoomError::NotOwner);
    }
    db::delete_room_post(pool, post_id).await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    pub room: Room,
    pub missions: Vec<RoomPost>,
    pub submissions: Vec<RoomPost>,
}

/// The room with its posts, newest first, split by kind.
#[instrument(skip_all, fields(room_id = room_id))]
pub async fn room_view(pool: &Pool, room_id: i64) -> Result<RoomView, RoomError> {
    let room = load_room(pool, room_id).await?;
    let (missions, submissions): (Vec<_>, Vec<_>) =
        db::list_room_posts(pool, room_id, ROOM_POST_LIMIT)
            .await?
            .into_iter()
            .partition(|p| p.kind == RoomPostKind::Mission);
    Ok(RoomView {
        room,
        missions,
        submissions,
    })
}
