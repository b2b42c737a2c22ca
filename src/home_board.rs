//! Home page notice, recruit and review boards.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::community::Actor;
use crate::db::{self, Pool};
use crate::model::{BoardItem, BoardKind};
use crate::schedule::{deadline_badge, DeadlineBadge};

/// Items fetched across all boards, then split.
pub const BOARD_FETCH_LIMIT: i64 = 30;
pub const ITEMS_PER_BOARD: usize = 5;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("관리자만 할 수 있어요.")]
    AdminOnly,
    #[error("제목을 입력해 주세요.")]
    MissingTitle,
    #[error("정원/남은 자리는 0 이상이고 남은 자리는 정원보다 클 수 없어요.")]
    InvalidCapacity,
    #[error("board item {0} not found")]
    ItemNotFound(i64),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct NewBoardItem {
    pub board: BoardKind,
    pub title: String,
    pub body: String,
    pub link_url: String,
    pub capacity: Option<i64>,
    pub remaining: Option<i64>,
    pub deadline_at: Option<DateTime<Utc>>,
}

impl NewBoardItem {
    fn check_capacity(&self) -> Result<(), BoardError> {
        let negative = [self.capacity, self.remaining].into_iter().flatten().any(|n| n < 0);
        let overfull = matches!((self.capacity, self.remaining), (Some(c), Some(r)) if r > c);
        if negative || overfull {
            return Err(BoardError::InvalidCapacity);
        }
        Ok(())
    }
}

/// Capacity and deadline are kept only on recruit items.
#[instrument(skip_all, fields(board = new.board.as_str()))]
pub async fn post_board_item(
    pool: &Pool,
    actor: &Actor,
    new: &NewBoardItem,
) -> Result<i64, BoardError> {
    if !actor.is_admin {
        return Err(BoardError::AdminOnly);
    }
    let title = new.title.trim();
    if title.is_empty() {
        return Err(BoardError::MissingTitle);
    }
    let recruit = new.board == BoardKind::Recruit;
    if recruit {
        new.check_capacity()?;
    }
    let id = db::insert_board_item(
        pool,
        new.board,
        title,
        new.body.trim(),
        new.link_url.trim(),
        new.capacity.filter(|_| recruit),
        new.remaining.filter(|_| recruit),
        new.deadline_at.filter(|_| recruit),
    )
    .await?;
    debug!(item_id = id, "board item posted");
    Ok(id)
}

#[instrument(skip_all, fields(item_id = item_id))]
pub async fn delete_board_item(pool: &Pool, actor: &Actor, item_id: i64) -> Result<(), BoardError> {
    if !actor.is_admin {
        return Err(BoardError::AdminOnly);
    }
    if !db::delete_board_item(pool, item_id).await? {
        return Err(BoardError::ItemNotFound(item_id));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCard {
    #[serde(flatten)]
    pub item: BoardItem,
    /// `D-3`, `오늘 마감` or `마감`, on recruit items with a deadline.
    pub dday: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HomeBoard {
    pub notice: Vec<BoardCard>,
    pub recruit: Vec<BoardCard>,
    pub review: Vec<BoardCard>,
}

pub fn recruit_deadline(
    item: &BoardItem,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<DeadlineBadge> {
    if item.board != BoardKind::Recruit {
        return None;
    }
    let deadline = item.deadline_at?;
    Some(deadline_badge(now, deadline.with_timezone(&offset)))
}

/// Split newest-first items into boards, keeping the first few of each.
pub fn arrange(items: Vec<BoardItem>, now: DateTime<Utc>, offset: FixedOffset) -> HomeBoard {
    let mut home = HomeBoard::default();
    for item in items {
        let dday = recruit_deadline(&item, now, offset).map(|b| b.to_string());
        let slot = match item.board {
            BoardKind::Notice => &mut home.notice,
            BoardKind::Recruit => &mut home.recruit,
            BoardKind::Review => &mut home.review,
        };
        if slot.len() < ITEMS_PER_BOARD {
            slot.push(BoardCard { item, dday });
        }
    }
    home
}

#[instrument(skip_all)]
pub async fn home_board(
    pool: &Pool,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<HomeBoard, BoardError> {
    let items = db::recent_board_items(pool, BOARD_FETCH_LIMIT).await?;
    Ok(arrange(items, now, offset))
}
